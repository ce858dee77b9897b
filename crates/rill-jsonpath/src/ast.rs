// Predicate tree produced by the parser and consumed by the matcher.
use std::fmt;

/// A parsed top-level query: either the degenerate `@.*` form, which matches
/// every document, or a bracketed filter predicate.
#[derive(Debug, Clone)]
pub(crate) enum Query {
    MatchAll,
    Filter(ComposedPredicate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Logical {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub(crate) struct ComposedPredicate {
    pub expressions: Vec<Expression>,
}

/// One element of a composed predicate. The connector binds this element to
/// the running result of the elements before it; the first element carries
/// no connector.
#[derive(Debug, Clone)]
pub(crate) struct Expression {
    pub connector: Option<Logical>,
    pub node: PredicateNode,
}

#[derive(Debug, Clone)]
pub(crate) enum PredicateNode {
    Composed(ComposedPredicate),
    Leaf(Predicate),
}

#[derive(Debug, Clone)]
pub(crate) struct Predicate {
    pub lval: Operand,
    pub op: ComparisonOp,
    pub rval: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ComparisonOp {
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
}

impl ComparisonOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Neq => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::In => "in",
            ComparisonOp::Nin => "nin",
            ComparisonOp::AnyOf => "anyof",
            ComparisonOp::NoneOf => "noneof",
            ComparisonOp::Regex => "=~",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Operand {
    Path(PathName),
    Str(String),
    Num(Decimal),
    Null,
    List(Vec<Operand>),
}

#[derive(Debug, Clone)]
pub(crate) struct PathName {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pub name: String,
    pub deep: bool,
}

/// Arbitrary-precision decimal literal.
///
/// Stored in a normalized scientific form so that equality is
/// scale-insensitive: `1`, `1.0` and `0.1e1` are all equal. The original
/// literal text is kept for ordered comparison (which narrows to f64) and
/// display.
#[derive(Debug, Clone)]
pub(crate) struct Decimal {
    literal: String,
    negative: bool,
    // Significant digits without leading or trailing zeros; empty means zero.
    digits: String,
    // Power of ten of the most significant digit.
    exponent: i64,
}

impl Decimal {
    pub fn parse(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        let mut idx = 0;

        let negative = matches!(bytes.first(), Some(b'-'));
        if negative {
            idx += 1;
        }

        let int_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        let int_digits = &text[int_start..idx];

        let mut frac_digits = "";
        if idx < bytes.len() && bytes[idx] == b'.' {
            let frac_start = idx + 1;
            idx = frac_start;
            while idx < bytes.len() && bytes[idx].is_ascii_digit() {
                idx += 1;
            }
            frac_digits = &text[frac_start..idx];
            if frac_digits.is_empty() {
                return None;
            }
        }
        if int_digits.is_empty() && frac_digits.is_empty() {
            return None;
        }

        let mut exp: i64 = 0;
        if idx < bytes.len() && (bytes[idx] == b'e' || bytes[idx] == b'E') {
            idx += 1;
            let exp_negative = matches!(bytes.get(idx), Some(b'-'));
            if matches!(bytes.get(idx), Some(b'-' | b'+')) {
                idx += 1;
            }
            let exp_start = idx;
            while idx < bytes.len() && bytes[idx].is_ascii_digit() {
                idx += 1;
            }
            let exp_digits = &text[exp_start..idx];
            if exp_digits.is_empty() {
                return None;
            }
            exp = exp_digits.parse::<i64>().ok()?;
            if exp_negative {
                exp = -exp;
            }
        }
        if idx != bytes.len() {
            return None;
        }

        // Normalize: strip leading zeros (adjusting the exponent of the most
        // significant digit) and trailing zeros.
        let combined: String = format!("{int_digits}{frac_digits}");
        let leading = combined.bytes().take_while(|b| *b == b'0').count();
        let trimmed = combined[leading..].trim_end_matches('0');
        let exponent = int_digits.len() as i64 - 1 - leading as i64 + exp;

        Some(Self {
            literal: text.to_string(),
            negative,
            digits: trimmed.to_string(),
            exponent,
        })
    }

    pub fn to_f64(&self) -> f64 {
        self.literal.parse().unwrap_or(f64::NAN)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        if self.digits.is_empty() && other.digits.is_empty() {
            // All zeros compare equal, including -0 and 0.00.
            return true;
        }
        self.negative == other.negative
            && self.digits == other.digits
            && self.exponent == other.exponent
    }
}

impl Eq for Decimal {}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}

impl fmt::Display for PathName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("@")?;
        for segment in &self.segments {
            if segment.deep {
                write!(f, "..{}", segment.name)?;
            } else {
                write!(f, ".{}", segment.name)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Path(path) => path.fmt(f),
            Operand::Str(value) => write!(f, "'{value}'"),
            Operand::Num(value) => value.fmt(f),
            Operand::Null => f.write_str("null"),
            Operand::List(elements) => {
                f.write_str("[")?;
                for (idx, element) in elements.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    element.fmt(f)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lval, self.op.symbol(), self.rval)
    }
}
