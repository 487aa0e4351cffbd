//! Query description and evaluation shared by every backend.

use std::cmp::Ordering;

use serde_json::Value;

use crate::document::{CollectionPath, Document};

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Array field contains the value.
    ArrayContains(String, Value),
    /// Document id is one of the ids.
    IdIn(Vec<String>),
}

impl Filter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::ArrayContains(field, value) => doc
                .data
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Filter::IdIn(ids) => ids.iter().any(|id| *id == doc.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A read over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filter: Option<Filter>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filter: None,
            order_by: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Evaluate against the collection's documents, given in first-write order.
    ///
    /// Documents with equal order keys keep their first-write order (stable sort).
    pub fn evaluate(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut result: Vec<Document> = docs
            .into_iter()
            .filter(|d| self.filter.as_ref().map_or(true, |f| f.matches(d)))
            .collect();

        if let Some(order) = &self.order_by {
            result.sort_by(|a, b| {
                let ord = compare_values(a.data.get(&order.field), b.data.get(&order.field));
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        result
    }
}

/// Total order over optional JSON values: missing/null < bool < number < string < other.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(0.0)
                .total_cmp(&y.as_f64().unwrap_or(0.0)),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn doc(id: &str, body: Value) -> Document {
        let data: Map<String, Value> = match body {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        Document {
            id: id.to_string(),
            data,
        }
    }

    #[test]
    fn test_array_contains_filter() {
        let q = Query::new(CollectionPath::root("chats"))
            .filter(Filter::ArrayContains("participants".into(), json!("alice")));
        let docs = vec![
            doc("a_b", json!({"participants": ["alice", "bob"]})),
            doc("b_c", json!({"participants": ["bob", "carol"]})),
            doc("x", json!({})),
        ];
        let ids: Vec<String> = q.evaluate(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a_b"]);
    }

    #[test]
    fn test_order_is_stable_for_ties() {
        let q = Query::new(CollectionPath::root("m")).order_by("ts", Direction::Ascending);
        let docs = vec![
            doc("late", json!({"ts": 5})),
            doc("first", json!({"ts": 1})),
            doc("second", json!({"ts": 1})),
            doc("pending", json!({})),
        ];
        let ids: Vec<String> = q.evaluate(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["pending", "first", "second", "late"]);
    }

    #[test]
    fn test_id_in_filter() {
        let q = Query::new(CollectionPath::root("users"))
            .filter(Filter::IdIn(vec!["b".into(), "c".into()]));
        let docs = vec![doc("a", json!({})), doc("b", json!({})), doc("c", json!({}))];
        assert_eq!(q.evaluate(docs).len(), 2);
    }
}
