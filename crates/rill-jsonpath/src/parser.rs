// Recursive-descent parser turning the token stream into a predicate tree.
use crate::ast::{
    ComparisonOp, ComposedPredicate, Expression, Logical, Operand, PathName, Predicate,
    PredicateNode, Query,
};
use crate::errors::ParseError;
use crate::lexer::{Lexer, Token, TokenKind};

/// Parse a complete query: the match-all form `@.*`, or a bracketed filter
/// including the `$[?(` / `[?(` prefix and the `)]` suffix.
pub(crate) fn parse_query(query: &str) -> Result<Query, ParseError> {
    let start = query.len() - query.trim_start().len();
    let trimmed = query.trim();

    // `@.*` selects everything; there is no predicate to evaluate.
    if trimmed == "@.*" {
        return Ok(Query::MatchAll);
    }

    let (prefix_len, inner) = if let Some(rest) = trimmed.strip_prefix("$[?(") {
        (4, rest)
    } else if let Some(rest) = trimmed.strip_prefix("[?(") {
        (3, rest)
    } else {
        return Err(ParseError::new(
            start,
            "query must be '@.*' or start with '$[?(' or '[?('",
        ));
    };

    let offset = start + prefix_len;
    let tokens = Lexer::new(inner, offset).tokenize()?;
    let mut parser = Parser {
        tokens,
        idx: 0,
        end_pos: offset + inner.len(),
    };

    let composed = parser.parse_composed()?;
    parser.expect_closing(TokenKind::RightParen)?;
    parser.expect_closing(TokenKind::RightBracket)?;
    if let Some(extra) = parser.peek() {
        return Err(ParseError::new(extra.pos, "unexpected input after ')]'"));
    }
    Ok(Query::Filter(composed))
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    end_pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.idx)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.idx).cloned();
        if token.is_some() {
            self.idx += 1;
        }
        token
    }

    fn expect_closing(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        match self.next() {
            Some(token) if token.kind == kind => Ok(()),
            Some(token) => Err(ParseError::new(
                token.pos,
                "expected ')]' closing the filter",
            )),
            None => Err(ParseError::new(
                self.end_pos,
                "expected ')]' closing the filter",
            )),
        }
    }

    fn parse_composed(&mut self) -> Result<ComposedPredicate, ParseError> {
        let mut expressions = vec![Expression {
            connector: None,
            node: self.parse_expression()?,
        }];
        while let Some(token) = self.peek() {
            let connector = match token.kind {
                TokenKind::And => Logical::And,
                TokenKind::Or => Logical::Or,
                _ => break,
            };
            self.idx += 1;
            expressions.push(Expression {
                connector: Some(connector),
                node: self.parse_expression()?,
            });
        }
        Ok(ComposedPredicate { expressions })
    }

    fn parse_expression(&mut self) -> Result<PredicateNode, ParseError> {
        if matches!(self.peek(), Some(token) if token.kind == TokenKind::LeftParen) {
            self.idx += 1;
            let inner = self.parse_composed()?;
            match self.next() {
                Some(token) if token.kind == TokenKind::RightParen => {}
                Some(token) => {
                    return Err(ParseError::new(token.pos, "expected ')' closing the group"));
                }
                None => {
                    return Err(ParseError::new(
                        self.end_pos,
                        "expected ')' closing the group",
                    ));
                }
            }
            return Ok(PredicateNode::Composed(inner));
        }

        let lval = self.parse_operand("expected a value or attribute path")?;
        let op = self.parse_operator()?;
        let rval = self.parse_operand("expected a value or attribute path after the operator")?;
        Ok(PredicateNode::Leaf(Predicate { lval, op, rval }))
    }

    fn parse_operator(&mut self) -> Result<ComparisonOp, ParseError> {
        let Some(token) = self.next() else {
            return Err(ParseError::new(
                self.end_pos,
                "expected a comparison operator",
            ));
        };
        match token.kind {
            TokenKind::Eq => Ok(ComparisonOp::Eq),
            TokenKind::Neq => Ok(ComparisonOp::Neq),
            TokenKind::Lt => Ok(ComparisonOp::Lt),
            TokenKind::Lte => Ok(ComparisonOp::Lte),
            TokenKind::Gt => Ok(ComparisonOp::Gt),
            TokenKind::Gte => Ok(ComparisonOp::Gte),
            TokenKind::In => Ok(ComparisonOp::In),
            TokenKind::Nin => Ok(ComparisonOp::Nin),
            TokenKind::AnyOf => Ok(ComparisonOp::AnyOf),
            TokenKind::NoneOf => Ok(ComparisonOp::NoneOf),
            TokenKind::Regex => Ok(ComparisonOp::Regex),
            _ => Err(ParseError::new(token.pos, "expected a comparison operator")),
        }
    }

    fn parse_operand(&mut self, reason: &str) -> Result<Operand, ParseError> {
        let Some(token) = self.next() else {
            return Err(ParseError::new(self.end_pos, reason));
        };
        match token.kind {
            TokenKind::Path(segments) => Ok(Operand::Path(PathName { segments })),
            TokenKind::Str(value) => Ok(Operand::Str(value)),
            TokenKind::Num(value) => Ok(Operand::Num(value)),
            TokenKind::Null => Ok(Operand::Null),
            TokenKind::LeftBracket => self.parse_list(),
            _ => Err(ParseError::new(token.pos, reason)),
        }
    }

    fn parse_list(&mut self) -> Result<Operand, ParseError> {
        let mut elements = vec![self.parse_list_element()?];
        loop {
            match self.next() {
                Some(token) if token.kind == TokenKind::Comma => {
                    elements.push(self.parse_list_element()?);
                }
                Some(token) if token.kind == TokenKind::RightBracket => {
                    return Ok(Operand::List(elements));
                }
                Some(token) => {
                    return Err(ParseError::new(token.pos, "expected ',' or ']' in a list"));
                }
                None => return Err(ParseError::new(self.end_pos, "unterminated list")),
            }
        }
    }

    fn parse_list_element(&mut self) -> Result<Operand, ParseError> {
        let Some(token) = self.next() else {
            return Err(ParseError::new(self.end_pos, "expected a list element"));
        };
        match token.kind {
            TokenKind::Str(value) => Ok(Operand::Str(value)),
            TokenKind::Num(value) => Ok(Operand::Num(value)),
            TokenKind::Null => Ok(Operand::Null),
            _ => Err(ParseError::new(
                token.pos,
                "list elements must be strings, numbers or null",
            )),
        }
    }
}
