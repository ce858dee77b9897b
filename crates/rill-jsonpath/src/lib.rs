//! JSONPath filter queries used to validate bearer-token claims during
//! authentication.
//!
//! A query is a boolean predicate over a JSON document, written in the
//! bracketed filter form of JSONPath:
//!
//! ```text
//! $[?(@.iss == 'https://sso.example.com/' and @.typ == 'Bearer')]
//! [?('rill' in @.aud)]
//! [?(@.roles anyof ['publisher', 'admin'])]
//! ```
//!
//! Supported operators are `==`, `!=`, `<`, `<=`, `>`, `>=`, `in`, `nin`,
//! `anyof` and `noneof`, combined with `and` / `or` and parentheses.
//! Attribute paths descend shallow segments only (`@.realm_access.roles`);
//! `=~` is accepted by the parser but not implemented. The degenerate query
//! `@.*` selects everything and matches every document.
//!
//! # Example
//! ```rust
//! use rill_jsonpath::JsonPathFilterQuery;
//! use serde_json::json;
//!
//! let query = JsonPathFilterQuery::parse("$[?(@.iss == 'https://sso/')]").expect("query");
//! assert!(query.matches(&json!({"iss": "https://sso/"})));
//! assert!(!query.matches(&json!({"iss": "other"})));
//! ```
//!
//! Parsed queries are immutable and safe to share across threads; a predicate
//! that cannot be evaluated against a particular document counts as false.

mod ast;
mod errors;
mod lexer;
mod matcher;
mod parser;

use std::fmt;

use serde_json::Value;

pub use errors::ParseError;

use matcher::Matcher;

/// A parsed filter query, ready for repeated thread-safe matching.
#[derive(Debug)]
pub struct JsonPathFilterQuery {
    query: String,
    matcher: Matcher,
}

impl JsonPathFilterQuery {
    /// Parse a filter query.
    ///
    /// # Errors
    /// [`ParseError`] carries the byte position and the reason for the first
    /// violation found.
    pub fn parse(query: &str) -> Result<Self, ParseError> {
        let root = parser::parse_query(query)?;
        Ok(Self {
            query: query.trim().to_string(),
            matcher: Matcher::new(root),
        })
    }

    /// Match a JSON document against this query.
    pub fn matches(&self, json: &Value) -> bool {
        self.matcher.matches(json)
    }
}

impl fmt::Display for JsonPathFilterQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query)
    }
}
