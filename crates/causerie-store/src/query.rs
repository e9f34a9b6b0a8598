//! Query model for one-shot fetches and continuous listeners.
//!
//! Mirrors what a remote document database can evaluate server-side: equality
//! and array-membership filters, a string range for prefix search, a single
//! order-by, and a result cap.  Evaluation lives here so the in-memory store
//! and tests share one implementation.

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;

use crate::document::Document;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum Filter {
    /// Field equals value.
    Eq(String, Value),
    /// Field is an array containing value.
    ArrayContains(String, Value),
    /// String field starts with the given prefix (range query).
    Prefix(String, String),
    /// Document id equals the given id.
    DocId(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(path: impl Into<String>) -> Self {
        Self {
            collection: path.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Query for a single document by id (used for per-record listeners).
    pub fn doc(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::collection(collection).filter(Filter::DocId(id.into()))
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filter_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(field.into(), value.into()))
    }

    pub fn array_contains(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::ArrayContains(field.into(), value.into()))
    }

    pub fn prefix(self, field: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.filter(Filter::Prefix(field.into(), prefix.into()))
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Stable identity of this query, used to share one store listener
    /// between equal subscriptions.
    pub fn key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }

    /// Whether a document satisfies every filter.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|filter| match filter {
            Filter::Eq(field, value) => doc.fields.get(field) == Some(value),
            Filter::ArrayContains(field, value) => doc
                .fields
                .get(field)
                .and_then(Value::as_array)
                .map(|list| list.contains(value))
                .unwrap_or(false),
            Filter::Prefix(field, prefix) => doc
                .str_field(field)
                .map(|s| s.starts_with(prefix.as_str()))
                .unwrap_or(false),
            Filter::DocId(id) => doc.id == *id,
        })
    }

    /// Filter, order and cap a collection snapshot.
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut hits: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        if let Some((field, direction)) = &self.order_by {
            hits.sort_by(|a, b| {
                let ord = compare_values(a.fields.get(field), b.fields.get(field))
                    // Ties broken by store-assigned id so every reader
                    // observes the same order.
                    .then_with(|| a.id.cmp(&b.id));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        } else {
            hits.sort_by(|a, b| a.id.cmp(&b.id));
        }

        if let Some(limit) = self.limit {
            hits.truncate(limit);
        }
        hits
    }
}

/// Total order over field values: absent < null < bool < number < string.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare_present(x, y),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_present(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Fields;
    use serde_json::json;

    fn doc(id: &str, entries: &[(&str, Value)]) -> Document {
        let mut fields = Fields::new();
        for (k, v) in entries {
            fields.insert(k.to_string(), v.clone());
        }
        Document::new(id, fields)
    }

    #[test]
    fn eq_and_array_contains() {
        let q = Query::collection("chats")
            .array_contains("participants", "u1")
            .filter_eq("archived", false);

        let hit = doc(
            "c1",
            &[("participants", json!(["u1", "u2"])), ("archived", json!(false))],
        );
        let miss = doc(
            "c2",
            &[("participants", json!(["u2", "u3"])), ("archived", json!(false))],
        );
        assert!(q.matches(&hit));
        assert!(!q.matches(&miss));
    }

    #[test]
    fn prefix_filter() {
        let q = Query::collection("users").prefix("nickname", "al");
        assert!(q.matches(&doc("u1", &[("nickname", json!("alex"))])));
        assert!(!q.matches(&doc("u2", &[("nickname", json!("bob"))])));
        assert!(!q.matches(&doc("u3", &[])));
    }

    #[test]
    fn order_and_limit() {
        let docs = vec![
            doc("b", &[("ts", json!(2))]),
            doc("a", &[("ts", json!(3))]),
            doc("c", &[("ts", json!(1))]),
        ];
        let q = Query::collection("messages")
            .order_by("ts", Direction::Descending)
            .limit(2);
        let out = q.apply(docs);
        let ids: Vec<&str> = out.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn equal_timestamps_break_ties_by_id() {
        let docs = vec![
            doc("m2", &[("ts", json!(5))]),
            doc("m1", &[("ts", json!(5))]),
        ];
        let q = Query::collection("messages").order_by("ts", Direction::Ascending);
        let out = q.apply(docs);
        let ids: Vec<&str> = out.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn missing_order_field_sorts_first_ascending() {
        let docs = vec![
            doc("m1", &[("ts", json!(5))]),
            doc("m0", &[]),
        ];
        let q = Query::collection("messages").order_by("ts", Direction::Ascending);
        let out = q.apply(docs);
        assert_eq!(out[0].id, "m0");
    }

    #[test]
    fn doc_query_matches_single_id() {
        let q = Query::doc("calls", "call-1");
        assert!(q.matches(&doc("call-1", &[])));
        assert!(!q.matches(&doc("call-2", &[])));
    }
}
