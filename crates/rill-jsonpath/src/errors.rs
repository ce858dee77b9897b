use thiserror::Error;

/// Error produced while parsing a filter query.
///
/// `position` is a byte offset into the original query string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid filter query at position {position}: {reason}")]
pub struct ParseError {
    pub position: usize,
    pub reason: String,
}

impl ParseError {
    pub(crate) fn new(position: usize, reason: impl Into<String>) -> Self {
        Self {
            position,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_includes_position() {
        let err = ParseError::new(7, "expected a comparison operator");
        let rendered = err.to_string();
        assert!(rendered.contains("position 7"));
        assert!(rendered.contains("expected a comparison operator"));
    }
}
