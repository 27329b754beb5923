use crate::mask;
use serde_json::Value;
use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid success condition format: {0}")]
pub struct InvalidCondition(pub String);

/// Ordered `field=value` predicates a response must satisfy before it is diffed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuccessConditions(Vec<(String, String)>);

impl SuccessConditions {
    pub fn parse<S: AsRef<str>>(conditions: &[S]) -> Result<SuccessConditions, InvalidCondition> {
        conditions
            .iter()
            .map(|c| c.as_ref().trim())
            .filter(|c| !c.is_empty())
            .map(|c| match c.split_once('=') {
                Some((field, expected)) if !field.is_empty() => {
                    Ok((field.to_string(), expected.to_string()))
                }
                _ => Err(InvalidCondition(c.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(SuccessConditions)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every predicate holds. A field that cannot be found fails its predicate.
    pub fn is_met(&self, response: &Value) -> bool {
        self.0.iter().all(|(field, expected)| match mask::get(response, field) {
            Ok(v) => stringify(&v) == expected.as_str(),
            Err(_) => false,
        })
    }
}

// Floats print in their shortest form, so `0.0` reads as `0` and `1e3` as `1000`.
fn stringify(v: &Value) -> Cow<'_, str> {
    match v {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Null => Cow::Borrowed(""),
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) => Cow::Owned(f.to_string()),
            None => Cow::Owned(n.to_string()),
        },
        other => Cow::Owned(other.to_string()),
    }
}
