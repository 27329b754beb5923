//! Structural comparison of two decoded responses.
//!
//! `treediff` walks both trees and `Collector` turns its callbacks into a report. Object
//! keys are compared irrespective of order and arrays element by element. Numbers compare
//! by value, so `10` equals `10.0`, but `"1"` still differs from `1`.

use serde_json::{Number, Value};
use std::fmt::{self, Display, Formatter};
use treediff::value::Key;
use treediff::Delegate;

#[derive(Debug, Clone, PartialEq)]
pub enum Difference {
    Changed { path: String, a: Value, b: Value },
    OnlyInA { path: String, a: Value },
    OnlyInB { path: String, b: Value },
}

impl Display for Difference {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Difference::Changed { path, a, b } => write!(f, "{}: A={} B={}", path, a, b),
            Difference::OnlyInA { path, a } => write!(f, "{}: A={} B=<missing>", path, a),
            Difference::OnlyInB { path, b } => write!(f, "{}: A=<missing> B={}", path, b),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff(Vec<Difference>);

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Difference> {
        self.0.iter()
    }
}

/// One line per difference; the empty string when both sides are equal.
impl Display for Diff {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

pub fn diff(a: &Value, b: &Value) -> Diff {
    let mut collector = Collector::new(a, b);
    treediff::diff(a, b, &mut collector);
    Diff(collector.found)
}

/// Integers compare exactly; as soon as one side is a float both are compared as floats.
fn same_number(a: &Number, b: &Number) -> bool {
    if a.is_f64() || b.is_f64() {
        a.as_f64() == b.as_f64()
    } else {
        a == b
    }
}

// An object and an array have no keys in common, and two empty ones have no keys at all.
fn different_containers(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Object(_), Value::Array(_)) | (Value::Array(_), Value::Object(_))
    )
}

fn child<'a>(v: &'a Value, key: &Key) -> Option<&'a Value> {
    match (v, key) {
        (Value::Object(map), Key::String(k)) => map.get(k),
        (Value::Array(items), Key::Index(i)) => items.get(*i),
        _ => None,
    }
}

fn segment(key: &Key) -> String {
    match key {
        Key::Index(i) => format!("[{}]", i),
        Key::String(k) => {
            let plain =
                !k.is_empty() && k.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-');
            if plain {
                format!(".{}", k)
            } else {
                format!("[{}]", Value::String(k.clone()))
            }
        }
    }
}

/// Receives the walk's callbacks. Tracks the pair of nodes under the cursor so a change of
/// container kind is reported once instead of as a list of unrelated keys.
struct Collector<'a> {
    path: Vec<String>,
    nodes: Vec<Option<(&'a Value, &'a Value)>>,
    found: Vec<Difference>,
}

impl<'a> Collector<'a> {
    fn new(a: &'a Value, b: &'a Value) -> Collector<'a> {
        let mut collector = Collector {
            path: Vec::new(),
            nodes: Vec::new(),
            found: Vec::new(),
        };
        collector.enter(Some((a, b)));
        collector
    }

    fn current_path(&self) -> String {
        let mut path = String::from("$");
        for s in &self.path {
            path.push_str(s);
        }
        path
    }

    fn enter(&mut self, pair: Option<(&'a Value, &'a Value)>) {
        if let Some((a, b)) = pair {
            if different_containers(a, b) {
                self.changed(a, b);
            }
        }
        self.nodes.push(pair);
    }

    fn inside_replaced_container(&self) -> bool {
        matches!(self.nodes.last(), Some(Some((a, b))) if different_containers(a, b))
    }

    fn changed(&mut self, a: &Value, b: &Value) {
        self.found.push(Difference::Changed {
            path: self.current_path(),
            a: a.clone(),
            b: b.clone(),
        });
    }
}

impl<'a> Delegate<'a, Key, Value> for Collector<'a> {
    fn push(&mut self, key: &Key) {
        let pair = self
            .nodes
            .last()
            .copied()
            .flatten()
            .and_then(|(a, b)| Some((child(a, key)?, child(b, key)?)));
        self.path.push(segment(key));
        self.enter(pair);
    }

    fn pop(&mut self) {
        self.path.pop();
        self.nodes.pop();
    }

    fn removed(&mut self, key: &Key, a: &'a Value) {
        if !self.inside_replaced_container() {
            let path = format!("{}{}", self.current_path(), segment(key));
            self.found.push(Difference::OnlyInA { path, a: a.clone() });
        }
    }

    fn added(&mut self, key: &Key, b: &'a Value) {
        if !self.inside_replaced_container() {
            let path = format!("{}{}", self.current_path(), segment(key));
            self.found.push(Difference::OnlyInB { path, b: b.clone() });
        }
    }

    fn modified(&mut self, a: &'a Value, b: &'a Value) {
        let equal = match (a, b) {
            (Value::Number(x), Value::Number(y)) => same_number(x, y),
            // already reported on entry
            _ => different_containers(a, b),
        };
        if !equal {
            self.changed(a, b);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_documents_have_no_diff() {
        let a = json!({"a": 1, "b": [1, {"c": null}], "d": "x"});
        let b = json!({"d": "x", "b": [1, {"c": null}], "a": 1});
        let d = diff(&a, &b);
        assert!(d.is_empty());
        assert_eq!(d.to_string(), "");
    }

    #[test]
    fn changed_scalar_is_reported_with_path() {
        let d = diff(&json!({"a": 1}), &json!({"a": 2}));
        assert_eq!(d.len(), 1);
        assert_eq!(d.to_string(), "$.a: A=1 B=2");
    }

    #[test]
    fn scalar_type_matters() {
        assert!(!diff(&json!({"a": 1}), &json!({"a": "1"})).is_empty());
        assert!(!diff(&json!({"a": 0}), &json!({"a": false})).is_empty());
        assert!(!diff(&json!({"a": null}), &json!({"a": false})).is_empty());
        assert!(!diff(&json!({"a": 1}), &json!({"a": {}})).is_empty());
    }

    #[test]
    fn numbers_compare_by_value() {
        let d = diff(&json!({"price": 10, "code": 0}), &json!({"price": 10.0, "code": 0}));
        assert!(d.is_empty(), "{}", d);
        assert!(diff(&json!([-3, 2.5]), &json!([-3.0, 2.5])).is_empty());
        assert_eq!(
            diff(&json!({"price": 10}), &json!({"price": 10.5})).to_string(),
            "$.price: A=10 B=10.5"
        );
        assert!(!diff(&json!(u64::MAX), &json!(u64::MAX - 1)).is_empty());
    }

    #[test]
    fn object_and_array_are_different() {
        assert_eq!(diff(&json!({"a": {}}), &json!({"a": []})).to_string(), "$.a: A={} B=[]");
        assert_eq!(diff(&json!({"0": 1}), &json!([1])).to_string(), "$: A={\"0\":1} B=[1]");
    }

    #[test]
    fn array_order_matters() {
        let d = diff(&json!([1, 2]), &json!([2, 1]));
        assert_eq!(d.to_string(), "$[0]: A=1 B=2\n$[1]: A=2 B=1");
    }

    #[test]
    fn missing_keys_and_elements_are_reported() {
        let d = diff(&json!({"a": [1], "x": true}), &json!({"a": [1, 2], "y": "z"}));
        let mut lines: Vec<String> = d.iter().map(|x| x.to_string()).collect();
        lines.sort();
        assert_eq!(
            lines,
            vec![
                "$.a[1]: A=<missing> B=2",
                "$.x: A=true B=<missing>",
                "$.y: A=<missing> B=\"z\"",
            ]
        );
    }

    #[test]
    fn unusual_keys_are_quoted() {
        let d = diff(&json!({"a.b": 1}), &json!({"a.b": 2}));
        assert_eq!(d.to_string(), "$[\"a.b\"]: A=1 B=2");
    }

    #[test]
    fn nested_containers_are_walked() {
        let d = diff(
            &json!({"data": {"items": [{"id": 1, "v": "a"}]}}),
            &json!({"data": {"items": [{"id": 1, "v": "b"}]}}),
        );
        assert_eq!(d.to_string(), "$.data.items[0].v: A=\"a\" B=\"b\"");
    }

    #[test]
    fn jointly_nulled_fields_compare_equal() {
        let mut a = json!({"id": 1, "ts": 100});
        let mut b = json!({"id": 1, "ts": 200});
        assert!(!diff(&a, &b).is_empty());
        crate::mask::set_to_nil(&mut a, "ts").unwrap();
        crate::mask::set_to_nil(&mut b, "ts").unwrap();
        assert!(diff(&a, &b).is_empty());
    }
}
