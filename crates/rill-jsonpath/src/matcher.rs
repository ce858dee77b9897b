//! Evaluates a parsed filter query against a JSON document.
//!
//! The matcher is immutable and can be shared freely across threads;
//! evaluation state lives on the stack. A predicate that cannot be evaluated
//! (unsupported comparison, deep-scan segment, missing required operand)
//! counts as false under its enclosing connector instead of failing the whole
//! query, so a malformed or partially-present token cannot short-circuit an
//! authorization decision into a match.
use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::ast::{
    ComparisonOp, ComposedPredicate, Decimal, Logical, Operand, PathName, Predicate, PredicateNode,
    Query,
};

#[derive(Debug)]
pub(crate) struct Matcher {
    root: Query,
}

struct EvalError(String);

impl EvalError {
    fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Matcher {
    pub fn new(root: Query) -> Self {
        Self { root }
    }

    pub fn matches(&self, json: &Value) -> bool {
        match &self.root {
            Query::MatchAll => true,
            Query::Filter(composed) => eval_composed(json, composed),
        }
    }
}

fn eval_composed(json: &Value, composed: &ComposedPredicate) -> bool {
    let mut current = false;
    for expression in &composed.expressions {
        // Short-circuit before evaluating the next expression.
        match expression.connector {
            Some(Logical::And) if !current => return false,
            Some(Logical::Or) if current => return true,
            _ => {}
        }
        let value = match &expression.node {
            PredicateNode::Composed(inner) => eval_composed(json, inner),
            PredicateNode::Leaf(predicate) => eval_leaf(json, predicate),
        };
        current = match expression.connector {
            None => value,
            Some(Logical::And) => current && value,
            Some(Logical::Or) => current || value,
        };
    }
    current
}

fn eval_leaf(json: &Value, predicate: &Predicate) -> bool {
    match eval_predicate(json, predicate) {
        Ok(value) => value,
        Err(err) => {
            debug!(predicate = %predicate, reason = %err, "failed to evaluate filter predicate");
            false
        }
    }
}

fn eval_predicate(json: &Value, predicate: &Predicate) -> Result<bool, EvalError> {
    match predicate.op {
        ComparisonOp::Eq => eval_equals(json, predicate),
        ComparisonOp::Neq => eval_equals(json, predicate).map(|value| !value),
        ComparisonOp::Lt => eval_compare(json, predicate).map(|ord| ord == Ordering::Less),
        ComparisonOp::Gte => eval_compare(json, predicate).map(|ord| ord != Ordering::Less),
        ComparisonOp::Gt => eval_compare(json, predicate).map(|ord| ord == Ordering::Greater),
        ComparisonOp::Lte => eval_compare(json, predicate).map(|ord| ord != Ordering::Greater),
        ComparisonOp::In => eval_contained_in(json, predicate),
        ComparisonOp::Nin => eval_contained_in(json, predicate).map(|value| !value),
        ComparisonOp::AnyOf => eval_any_of(json, predicate, "anyof"),
        ComparisonOp::NoneOf => eval_any_of(json, predicate, "noneof").map(|value| !value),
        ComparisonOp::Regex => Err(EvalError::new("the '=~' operator is not implemented")),
    }
}

/// Walk shallow segments down the document. `None` means the attribute is
/// absent, which is distinct from an explicit JSON null.
fn resolve<'a>(json: &'a Value, path: &PathName) -> Result<Option<&'a Value>, EvalError> {
    let mut current = Some(json);
    for segment in &path.segments {
        if segment.deep {
            return Err(EvalError::new(format!(
                "deep scan segment '..{}' is not supported",
                segment.name
            )));
        }
        current = current.and_then(|value| value.get(&segment.name));
    }
    Ok(current)
}

fn eval_equals(json: &Value, predicate: &Predicate) -> Result<bool, EvalError> {
    let Operand::Path(path) = &predicate.lval else {
        return Err(EvalError::new(
            "value left of '==' must be an attribute path such as @.attr",
        ));
    };
    let left = resolve(json, path)?;

    match &predicate.rval {
        Operand::Path(rpath) => {
            let right = resolve(json, rpath)?;
            Ok(match (left, right) {
                // Two absent attributes are unequal.
                (None, None) => false,
                (None, Some(Value::Null)) | (Some(Value::Null), None) => true,
                (None, _) | (_, None) => false,
                (Some(lvalue), Some(rvalue)) => lvalue == rvalue,
            })
        }
        Operand::Str(value) => Ok(matches!(left, Some(Value::String(s)) if s == value)),
        Operand::Num(value) => Ok(match left {
            Some(Value::Number(number)) => number_equals(number, value),
            _ => false,
        }),
        Operand::Null => Ok(matches!(left, None | Some(Value::Null))),
        Operand::List(_) => Err(EvalError::new(
            "cannot compare an attribute to a list with '==' (try 'in')",
        )),
    }
}

fn eval_compare(json: &Value, predicate: &Predicate) -> Result<Ordering, EvalError> {
    let Operand::Path(path) = &predicate.lval else {
        return Err(EvalError::new(
            "value left of the operator must be an attribute path such as @.attr",
        ));
    };
    let left = resolve(json, path)?;

    match &predicate.rval {
        Operand::Str(value) => match left {
            Some(Value::String(s)) => Ok(s.as_str().cmp(value.as_str())),
            _ => Err(unsupported_comparison(left, &predicate.rval)),
        },
        Operand::Num(value) => match left {
            Some(Value::Number(number)) => compare_doubles(
                number.as_f64().unwrap_or(f64::NAN),
                value.to_f64(),
                left,
                &predicate.rval,
            ),
            _ => Err(unsupported_comparison(left, &predicate.rval)),
        },
        Operand::Path(rpath) => {
            let right = resolve(json, rpath)?;
            match (left, right) {
                (Some(Value::String(lvalue)), Some(Value::String(rvalue))) => {
                    Ok(lvalue.as_str().cmp(rvalue.as_str()))
                }
                (Some(Value::Number(lvalue)), Some(Value::Number(rvalue))) => compare_doubles(
                    lvalue.as_f64().unwrap_or(f64::NAN),
                    rvalue.as_f64().unwrap_or(f64::NAN),
                    left,
                    &predicate.rval,
                ),
                _ => Err(unsupported_comparison(left, &predicate.rval)),
            }
        }
        Operand::Null | Operand::List(_) => Err(unsupported_comparison(left, &predicate.rval)),
    }
}

fn compare_doubles(
    left: f64,
    right: f64,
    lvalue: Option<&Value>,
    rval: &Operand,
) -> Result<Ordering, EvalError> {
    left.partial_cmp(&right)
        .ok_or_else(|| unsupported_comparison(lvalue, rval))
}

fn unsupported_comparison(left: Option<&Value>, rval: &Operand) -> EvalError {
    let left = match left {
        Some(value) => value.to_string(),
        None => "null".to_string(),
    };
    EvalError::new(format!("unsupported comparison ({left} vs. {rval})"))
}

fn eval_contained_in(json: &Value, predicate: &Predicate) -> Result<bool, EvalError> {
    match &predicate.rval {
        Operand::Null => Err(EvalError::new(
            "cannot have 'null' to the right of 'in' (try 'in [null]' or '== null')",
        )),
        Operand::Str(_) | Operand::Num(_) => Err(EvalError::new(
            "value right of 'in' must be an attribute path or a list",
        )),
        Operand::Path(rpath) => {
            let right = resolve(json, rpath)?;
            // A right side that is absent or not an array contains nothing.
            let Some(Value::Array(items)) = right else {
                return Ok(false);
            };
            match &predicate.lval {
                Operand::Path(lpath) => {
                    let left = resolve(json, lpath)?;
                    Ok(match left {
                        Some(value) => items.iter().any(|item| item == value),
                        None => false,
                    })
                }
                Operand::Str(value) => {
                    Ok(items
                        .iter()
                        .any(|item| matches!(item, Value::String(s) if s == value)))
                }
                Operand::Num(value) => Ok(items.iter().any(|item| match item {
                    Value::Number(number) => number_equals(number, value),
                    _ => false,
                })),
                Operand::Null => Ok(items.iter().any(Value::is_null)),
                Operand::List(_) => Err(EvalError::new(
                    "value left of 'in' must be an attribute path, a string, a number or null",
                )),
            }
        }
        Operand::List(list) => match &predicate.lval {
            Operand::Path(lpath) => {
                let left = resolve(json, lpath)?;
                Ok(match left {
                    // An absent attribute behaves like null for containment.
                    None | Some(Value::Null) => list_contains_null(list),
                    Some(Value::String(value)) => list_contains_str(list, value),
                    Some(Value::Number(number)) => list_contains_number(list, number),
                    Some(_) => false,
                })
            }
            Operand::Str(value) => Ok(list_contains_str(list, value)),
            Operand::Num(value) => Ok(list.iter().any(
                |element| matches!(element, Operand::Num(candidate) if candidate == value),
            )),
            Operand::Null => Ok(list_contains_null(list)),
            Operand::List(_) => Err(EvalError::new(
                "value left of 'in' must be an attribute path, a string, a number or null",
            )),
        },
    }
}

fn eval_any_of(json: &Value, predicate: &Predicate, opname: &str) -> Result<bool, EvalError> {
    let Operand::List(list) = &predicate.rval else {
        return Err(EvalError::new(format!(
            "value right of '{opname}' must be a list such as ['a', 'b']"
        )));
    };
    let Operand::Path(path) = &predicate.lval else {
        return Err(EvalError::new(format!(
            "value left of '{opname}' must be an attribute path such as @.attr"
        )));
    };

    let Some(Value::Array(items)) = resolve(json, path)? else {
        return Ok(false);
    };
    Ok(items.iter().any(|item| match item {
        Value::String(value) => list_contains_str(list, value),
        Value::Number(number) => list_contains_number(list, number),
        Value::Null => list_contains_null(list),
        _ => false,
    }))
}

fn number_equals(number: &serde_json::Number, value: &Decimal) -> bool {
    Decimal::parse(&number.to_string()).is_some_and(|parsed| parsed == *value)
}

fn list_contains_str(list: &[Operand], value: &str) -> bool {
    list.iter()
        .any(|element| matches!(element, Operand::Str(s) if s == value))
}

fn list_contains_number(list: &[Operand], number: &serde_json::Number) -> bool {
    let Some(parsed) = Decimal::parse(&number.to_string()) else {
        return false;
    };
    list.iter()
        .any(|element| matches!(element, Operand::Num(candidate) if *candidate == parsed))
}

fn list_contains_null(list: &[Operand]) -> bool {
    list.iter().any(|element| matches!(element, Operand::Null))
}

#[cfg(test)]
mod tests {
    use crate::JsonPathFilterQuery;
    use serde_json::json;

    fn matches(query: &str, json: &serde_json::Value) -> bool {
        JsonPathFilterQuery::parse(query)
            .expect("parse query")
            .matches(json)
    }

    #[test]
    fn match_all_query_accepts_any_document() {
        assert!(matches("@.*", &json!({})));
        assert!(matches("@.*", &json!({"iss": "https://sso/"})));
        assert!(matches("@.*", &json!(null)));
        assert!(matches("  @.*  ", &json!(42)));
    }

    #[test]
    fn equality_against_string() {
        let query = "$[?(@.iss == 'http://host/')]";
        assert!(matches(query, &json!({"iss": "http://host/"})));
        assert!(!matches(query, &json!({"iss": "other"})));
        assert!(!matches(query, &json!({})));
        assert!(!matches(query, &json!({"iss": 42})));
    }

    #[test]
    fn equality_against_number_is_scale_insensitive() {
        let query = "[?(@.n == 1.0)]";
        assert!(matches(query, &json!({"n": 1})));
        assert!(matches(query, &json!({"n": 1.0})));
        assert!(!matches(query, &json!({"n": "1"})));
        assert!(!matches(query, &json!({"n": 2})));
    }

    #[test]
    fn equality_against_null() {
        let query = "[?(@.a == null)]";
        assert!(matches(query, &json!({})));
        assert!(matches(query, &json!({"a": null})));
        assert!(!matches(query, &json!({"a": 1})));
    }

    #[test]
    fn equality_between_paths() {
        let query = "[?(@.a == @.b)]";
        assert!(matches(query, &json!({"a": "x", "b": "x"})));
        assert!(matches(query, &json!({"a": [1, 2], "b": [1, 2]})));
        assert!(!matches(query, &json!({"a": "x", "b": "y"})));
        // Two absent attributes are unequal.
        assert!(!matches(query, &json!({})));
        // An absent attribute equals an explicit null.
        assert!(matches(query, &json!({"a": null})));
        assert!(matches(query, &json!({"b": null})));
        assert!(matches(query, &json!({"a": null, "b": null})));
        assert!(!matches(query, &json!({"a": 1})));
    }

    #[test]
    fn inequality_negates_equality() {
        let query = "[?(@.iss != 'http://host/')]";
        assert!(!matches(query, &json!({"iss": "http://host/"})));
        assert!(matches(query, &json!({"iss": "other"})));
        assert!(matches(query, &json!({})));
    }

    #[test]
    fn nested_paths_descend_objects() {
        let query = "[?(@.resource_access.client.id == 'c1')]";
        assert!(matches(
            query,
            &json!({"resource_access": {"client": {"id": "c1"}}})
        ));
        assert!(!matches(query, &json!({"resource_access": {}})));
        assert!(!matches(query, &json!({"resource_access": "scalar"})));
    }

    #[test]
    fn ordered_comparison_on_numbers() {
        assert!(matches("[?(@.exp > 10)]", &json!({"exp": 11})));
        assert!(!matches("[?(@.exp > 10)]", &json!({"exp": 10})));
        assert!(matches("[?(@.exp >= 10)]", &json!({"exp": 10})));
        assert!(matches("[?(@.exp < 10.5)]", &json!({"exp": 10})));
        assert!(matches("[?(@.exp <= 10)]", &json!({"exp": 10})));
    }

    #[test]
    fn ordered_comparison_on_strings_is_lexicographic() {
        assert!(matches("[?(@.name < 'bob')]", &json!({"name": "alice"})));
        assert!(!matches("[?(@.name < 'alice')]", &json!({"name": "bob"})));
        assert!(matches("[?(@.a < @.b)]", &json!({"a": "x", "b": "y"})));
        assert!(matches("[?(@.a < @.b)]", &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn ordered_comparison_across_types_is_false_both_ways() {
        // Errors inside a predicate count as false, including through the
        // negated operators.
        let doc = json!({"exp": "not-a-number"});
        assert!(!matches("[?(@.exp > 10)]", &doc));
        assert!(!matches("[?(@.exp <= 10)]", &doc));
        assert!(!matches("[?(@.missing < 10)]", &json!({})));
        assert!(!matches("[?(@.a < @.b)]", &json!({"a": 1, "b": "x"})));
    }

    #[test]
    fn containment_in_attribute_array() {
        let query = "[?('admin' in @.roles)]";
        assert!(matches(query, &json!({"roles": ["user", "admin"]})));
        assert!(!matches(query, &json!({"roles": "admin"})));
        assert!(!matches(query, &json!({})));
    }

    #[test]
    fn containment_of_path_in_list() {
        let query = "[?(@.role in ['admin', 'operator'])]";
        assert!(matches(query, &json!({"role": "admin"})));
        assert!(!matches(query, &json!({"role": "user"})));
    }

    #[test]
    fn containment_of_numbers_and_null() {
        assert!(matches("[?(@.level in [1, 2, 3])]", &json!({"level": 2.0})));
        assert!(matches("[?(null in @.values)]", &json!({"values": [1, null]})));
        assert!(!matches("[?(null in @.values)]", &json!({"values": [1, 2]})));
        // An absent attribute is contained only in a list holding null.
        assert!(matches("[?(@.missing in [null])]", &json!({})));
        assert!(!matches("[?(@.missing in ['x'])]", &json!({})));
    }

    #[test]
    fn containment_of_path_in_path() {
        let query = "[?(@.client in @.allowed)]";
        assert!(matches(
            query,
            &json!({"client": "c1", "allowed": ["c1", "c2"]})
        ));
        assert!(!matches(query, &json!({"client": "c3", "allowed": ["c1"]})));
        // A right side that is not an array contains nothing.
        assert!(!matches(query, &json!({"client": "c1", "allowed": "c1"})));
        assert!(!matches(query, &json!({"client": "c1"})));
    }

    #[test]
    fn nin_negates_in() {
        let query = "[?(@.role nin ['admin'])]";
        assert!(!matches(query, &json!({"role": "admin"})));
        assert!(matches(query, &json!({"role": "user"})));
    }

    #[test]
    fn null_right_of_in_is_false() {
        assert!(!matches("[?(@.a in null)]", &json!({"a": 1})));
        // The negation does not turn the evaluation error into a match.
        assert!(!matches("[?(@.a nin null)]", &json!({"a": 1})));
    }

    #[test]
    fn anyof_over_attribute_array() {
        let query = "[?(@.roles anyof ['admin', 'operator'])]";
        assert!(matches(query, &json!({"roles": ["user", "admin"]})));
        assert!(!matches(query, &json!({"roles": ["user"]})));
        assert!(!matches(query, &json!({"roles": "admin"})));
        assert!(!matches(query, &json!({})));
        assert!(matches(
            "[?(@.levels anyof [1, 2])]",
            &json!({"levels": [2.0, 9]})
        ));
        assert!(matches(
            "[?(@.values anyof [null])]",
            &json!({"values": [null]})
        ));
    }

    #[test]
    fn noneof_negates_anyof() {
        let query = "[?(@.roles noneof ['admin'])]";
        assert!(!matches(query, &json!({"roles": ["admin"]})));
        assert!(matches(query, &json!({"roles": ["user"]})));
    }

    #[test]
    fn anyof_requires_list_and_path() {
        // Structural misuse is an evaluation error, which counts as false
        // even for noneof.
        assert!(!matches("[?(@.roles anyof @.other)]", &json!({"roles": ["a"]})));
        assert!(!matches("[?(@.roles noneof @.other)]", &json!({"roles": ["a"]})));
    }

    #[test]
    fn connectors_short_circuit_left_to_right() {
        let query = "[?(@.a == 1 and (@.b == 2 or @.c == 3))]";
        assert!(matches(query, &json!({"a": 1, "c": 3})));
        assert!(!matches(query, &json!({"a": 1, "b": 5, "c": 5})));
        assert!(!matches(query, &json!({"a": 2, "b": 2})));
    }

    #[test]
    fn or_short_circuits_the_rest_of_the_group() {
        // Evaluation is strictly left to right; a true running value followed
        // by 'or' decides the whole group, even with a later 'and'.
        let query = "[?(@.a == 1 or @.b == 2 and @.c == 3)]";
        assert!(matches(query, &json!({"a": 1})));
        assert!(matches(query, &json!({"b": 2, "c": 3})));
        assert!(!matches(query, &json!({"b": 2, "c": 4})));
    }

    #[test]
    fn deep_scan_fails_the_predicate() {
        assert!(!matches("[?(@..role == 'admin')]", &json!({"role": "admin"})));
        // The failure is contained by the enclosing connector.
        assert!(matches(
            "[?(@..role == 'admin' or @.ok == 1)]",
            &json!({"ok": 1})
        ));
    }

    #[test]
    fn regex_operator_fails_closed() {
        assert!(!matches("[?(@.iss =~ 'http.*')]", &json!({"iss": "http://host/"})));
    }

    #[test]
    fn literal_left_of_equality_fails_closed() {
        assert!(!matches("[?('x' == 'x')]", &json!({})));
    }

    #[test]
    fn realistic_token_claim_checks() {
        let token = json!({
            "iss": "https://sso.example.com/auth/realms/broker",
            "aud": ["rill", "account"],
            "typ": "Bearer",
            "exp": 1_700_000_600,
            "realm_access": {"roles": ["publisher", "offline_access"]},
            "clientId": null
        });
        assert!(matches(
            "$[?(@.iss == 'https://sso.example.com/auth/realms/broker')]",
            &token
        ));
        assert!(matches("$[?('rill' in @.aud)]", &token));
        assert!(matches(
            "$[?(@.typ == 'Bearer' and @.realm_access.roles anyof ['publisher'])]",
            &token
        ));
        assert!(matches("$[?(@.clientId == null)]", &token));
        assert!(!matches(
            "$[?(@.typ == 'Refresh' or @.realm_access.roles anyof ['admin'])]",
            &token
        ));
    }
}
