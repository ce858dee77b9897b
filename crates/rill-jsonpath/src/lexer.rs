// Tokenizer for the filter-query grammar. Operates on the text between the
// '$[?(' prefix and the ')]' suffix; `offset` shifts reported positions back
// into the original query string.
use crate::ast::{Decimal, Segment};
use crate::errors::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
    AnyOf,
    NoneOf,
    Regex,
    Null,
    Path(Vec<Segment>),
    Str(String),
    Num(Decimal),
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

pub(crate) struct Lexer<'a> {
    input: &'a str,
    idx: usize,
    offset: usize,
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-'
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, offset: usize) -> Self {
        Self {
            input,
            idx: 0,
            offset,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn bytes(&self) -> &[u8] {
        self.input.as_bytes()
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes().get(self.idx + ahead).copied()
    }

    fn error(&self, pos: usize, reason: impl Into<String>) -> ParseError {
        ParseError::new(self.offset + pos, reason)
    }

    fn token(&self, pos: usize, kind: TokenKind) -> Token {
        Token {
            kind,
            pos: self.offset + pos,
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        while matches!(self.peek(0), Some(b) if b.is_ascii_whitespace()) {
            self.idx += 1;
        }
        let Some(byte) = self.peek(0) else {
            return Ok(None);
        };
        let pos = self.idx;

        let kind = match byte {
            b'(' => {
                self.idx += 1;
                TokenKind::LeftParen
            }
            b')' => {
                self.idx += 1;
                TokenKind::RightParen
            }
            b'[' => {
                self.idx += 1;
                TokenKind::LeftBracket
            }
            b']' => {
                self.idx += 1;
                TokenKind::RightBracket
            }
            b',' => {
                self.idx += 1;
                TokenKind::Comma
            }
            b'=' => match self.peek(1) {
                Some(b'=') => {
                    self.idx += 2;
                    TokenKind::Eq
                }
                Some(b'~') => {
                    self.idx += 2;
                    TokenKind::Regex
                }
                _ => return Err(self.error(pos, "expected '==' or '=~'")),
            },
            b'!' => match self.peek(1) {
                Some(b'=') => {
                    self.idx += 2;
                    TokenKind::Neq
                }
                _ => return Err(self.error(pos, "expected '!='")),
            },
            b'<' => {
                if self.peek(1) == Some(b'=') {
                    self.idx += 2;
                    TokenKind::Lte
                } else {
                    self.idx += 1;
                    TokenKind::Lt
                }
            }
            b'>' => {
                if self.peek(1) == Some(b'=') {
                    self.idx += 2;
                    TokenKind::Gte
                } else {
                    self.idx += 1;
                    TokenKind::Gt
                }
            }
            b'@' => self.lex_path(pos)?,
            b'\'' | b'"' => self.lex_string(pos, byte)?,
            b'-' | b'0'..=b'9' => self.lex_number(pos)?,
            b if is_word_byte(b) => self.lex_word(pos)?,
            _ => {
                let ch = self.input[pos..].chars().next().unwrap_or('?');
                return Err(self.error(pos, format!("unexpected character '{ch}'")));
            }
        };

        Ok(Some(self.token(pos, kind)))
    }

    fn lex_path(&mut self, pos: usize) -> Result<TokenKind, ParseError> {
        self.idx += 1;
        let mut segments = Vec::new();
        while self.peek(0) == Some(b'.') {
            self.idx += 1;
            let deep = self.peek(0) == Some(b'.');
            if deep {
                self.idx += 1;
            }
            let start = self.idx;
            while matches!(self.peek(0), Some(b) if is_word_byte(b)) {
                self.idx += 1;
            }
            if self.idx == start {
                return Err(self.error(start, "expected an attribute name after '.'"));
            }
            segments.push(Segment {
                name: self.input[start..self.idx].to_string(),
                deep,
            });
        }
        if segments.is_empty() {
            return Err(self.error(pos, "expected an attribute path such as @.attr"));
        }
        Ok(TokenKind::Path(segments))
    }

    fn lex_string(&mut self, pos: usize, quote: u8) -> Result<TokenKind, ParseError> {
        self.idx += 1;
        let start = self.idx;
        while let Some(byte) = self.peek(0) {
            if byte == quote {
                let value = self.input[start..self.idx].to_string();
                self.idx += 1;
                return Ok(TokenKind::Str(value));
            }
            self.idx += 1;
        }
        Err(self.error(pos, "unterminated string"))
    }

    fn lex_number(&mut self, pos: usize) -> Result<TokenKind, ParseError> {
        if self.peek(0) == Some(b'-') {
            self.idx += 1;
        }
        let digits_start = self.idx;
        while matches!(self.peek(0), Some(b) if b.is_ascii_digit()) {
            self.idx += 1;
        }
        if self.idx == digits_start {
            return Err(self.error(pos, "expected a digit after '-'"));
        }
        if self.peek(0) == Some(b'.') && matches!(self.peek(1), Some(b) if b.is_ascii_digit()) {
            self.idx += 2;
            while matches!(self.peek(0), Some(b) if b.is_ascii_digit()) {
                self.idx += 1;
            }
        }
        if matches!(self.peek(0), Some(b'e' | b'E')) {
            self.idx += 1;
            if matches!(self.peek(0), Some(b'+' | b'-')) {
                self.idx += 1;
            }
            let exp_start = self.idx;
            while matches!(self.peek(0), Some(b) if b.is_ascii_digit()) {
                self.idx += 1;
            }
            if self.idx == exp_start {
                return Err(self.error(pos, "expected a digit in the exponent"));
            }
        }
        let literal = &self.input[pos..self.idx];
        let value = Decimal::parse(literal)
            .ok_or_else(|| self.error(pos, format!("invalid number literal '{literal}'")))?;
        Ok(TokenKind::Num(value))
    }

    fn lex_word(&mut self, pos: usize) -> Result<TokenKind, ParseError> {
        let start = self.idx;
        while matches!(self.peek(0), Some(b) if is_word_byte(b)) {
            self.idx += 1;
        }
        let word = &self.input[start..self.idx];
        match word {
            "and" => Ok(TokenKind::And),
            "or" => Ok(TokenKind::Or),
            "in" => Ok(TokenKind::In),
            "nin" => Ok(TokenKind::Nin),
            "anyof" => Ok(TokenKind::AnyOf),
            "noneof" => Ok(TokenKind::NoneOf),
            "null" => Ok(TokenKind::Null),
            _ => Err(self.error(pos, format!("unrecognized token '{word}'"))),
        }
    }
}
