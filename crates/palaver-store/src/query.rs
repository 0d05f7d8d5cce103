//! Collection queries.
//!
//! Supports exactly what the client needs: one `array_contains` filter, one
//! ordering on a timestamp field, and a limit taken from either end.

use std::collections::BTreeMap;

use palaver_shared::{to_millis, Timestamp};
use serde_json::Value;

use crate::document::{lookup, DocumentSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub array_contains: Option<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
    /// Keep the *last* `limit` results instead of the first.
    pub limit_to_last: bool,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            array_contains: None,
            order_by: None,
            limit: None,
            limit_to_last: false,
        }
    }

    pub fn array_contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.array_contains = Some((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self.limit_to_last = false;
        self
    }

    pub fn limit_to_last(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self.limit_to_last = true;
        self
    }

    pub fn is_ordered(&self) -> bool {
        self.order_by.is_some()
    }

    /// Filtering on one field while ordering by another needs a composite
    /// index on the backend.
    pub fn needs_composite_index(&self) -> bool {
        self.array_contains.is_some() && self.order_by.is_some()
    }

    /// Run the query over one collection's documents (keyed by id).
    ///
    /// Without an ordering, results come back in document id order.  Ties in
    /// the ordered field are broken by id so results are deterministic.
    pub(crate) fn evaluate(&self, docs: &BTreeMap<String, Value>) -> Vec<DocumentSnapshot> {
        let mut matched: Vec<(&String, &Value)> = docs
            .iter()
            .filter(|(_, data)| self.matches(data))
            .collect();

        if let Some((field, direction)) = &self.order_by {
            let key = |data: &Value| -> u64 {
                let ts = lookup(data, field)
                    .and_then(|v| serde_json::from_value::<Timestamp>(v.clone()).ok());
                to_millis(ts.as_ref())
            };
            matched.sort_by(|(a_id, a), (b_id, b)| {
                let ord = key(a).cmp(&key(b)).then_with(|| a_id.cmp(b_id));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(n) = self.limit {
            if self.limit_to_last {
                let skip = matched.len().saturating_sub(n);
                matched.drain(..skip);
            } else {
                matched.truncate(n);
            }
        }

        matched
            .into_iter()
            .map(|(id, data)| DocumentSnapshot {
                id: id.clone(),
                data: data.clone(),
            })
            .collect()
    }

    fn matches(&self, data: &Value) -> bool {
        match &self.array_contains {
            Some((field, needle)) => lookup(data, field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(needle)),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs() -> BTreeMap<String, Value> {
        let mut docs = BTreeMap::new();
        docs.insert("c1".into(), json!({ "members": ["a", "b"], "updatedAt": 300 }));
        docs.insert("c2".into(), json!({ "members": ["a", "c"], "updatedAt": 100 }));
        docs.insert("c3".into(), json!({ "members": ["b", "c"], "updatedAt": 200 }));
        docs.insert(
            "c4".into(),
            json!({ "members": ["a"], "updatedAt": { "seconds": 1, "nanoseconds": 0 } }),
        );
        docs
    }

    fn ids(result: &[DocumentSnapshot]) -> Vec<&str> {
        result.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_array_contains() {
        let q = Query::collection("chats").array_contains("members", "a");
        assert_eq!(ids(&q.evaluate(&docs())), vec!["c1", "c2", "c4"]);
    }

    #[test]
    fn test_order_desc_with_limit() {
        let q = Query::collection("chats")
            .array_contains("members", "a")
            .order_by("updatedAt", Direction::Descending)
            .limit(2);
        assert!(q.needs_composite_index());
        assert_eq!(ids(&q.evaluate(&docs())), vec!["c4", "c1"]);
    }

    #[test]
    fn test_limit_to_last_keeps_tail_in_order() {
        let q = Query::collection("chats")
            .order_by("updatedAt", Direction::Ascending)
            .limit_to_last(2);
        assert!(q.is_ordered() && !q.needs_composite_index());
        assert_eq!(ids(&q.evaluate(&docs())), vec!["c1", "c4"]);
    }

    #[test]
    fn test_missing_order_field_sorts_first() {
        let mut docs = docs();
        docs.insert("c0".into(), json!({ "members": ["a"] }));
        let q = Query::collection("chats").order_by("updatedAt", Direction::Ascending);
        assert_eq!(ids(&q.evaluate(&docs))[0], "c0");
    }
}
