use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;
use std::sync::Arc;

/// One recorded test case, read from a single line of a payload file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// URL-encoded query string appended to both endpoints
    #[serde(default)]
    pub params: String,
    /// JSON object of string header values
    #[serde(default)]
    pub headers: String,
    /// JSON document, or a form-encoded string for form content types
    #[serde(default)]
    pub body: String,
}

impl Payload {
    pub fn from_line(line: &[u8]) -> Result<Payload, serde_json::Error> {
        serde_json::from_slice(line)
    }
}

/// A line of `<task>_output.txt`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub payload: Arc<Payload>,
    pub url_a_response: Option<Value>,
    pub url_b_response: Option<Value>,
    pub diff: String,
}

impl OutputRecord {
    /// Both sides agreed; the responses are not kept.
    pub fn same(payload: Arc<Payload>) -> OutputRecord {
        OutputRecord {
            payload,
            url_a_response: None,
            url_b_response: None,
            diff: String::new(),
        }
    }

    pub fn different(payload: Arc<Payload>, a: Value, b: Value, diff: String) -> OutputRecord {
        OutputRecord {
            payload,
            url_a_response: Some(a),
            url_b_response: Some(b),
            diff,
        }
    }

    pub fn has_diff(&self) -> bool {
        !self.diff.is_empty()
    }
}

/// A line of `<task>_failed_payload.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub params: String,
    pub headers: String,
    pub body: String,
    pub err: String,
}

impl FailureRecord {
    pub fn new<E: Display>(payload: &Payload, err: E) -> FailureRecord {
        FailureRecord {
            params: payload.params.clone(),
            headers: payload.headers.clone(),
            body: payload.body.clone(),
            err: err.to_string(),
        }
    }
}
