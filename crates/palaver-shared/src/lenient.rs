//! Field decoders that never reject a document.
//!
//! A field holding `null` or a value of the wrong type decodes to its
//! default.  Inside arrays and member maps the same rule applies per entry,
//! so one bad entry cannot take the rest of the document down with it.
//! Array entries are replaced rather than dropped: `members` and
//! `memberNames` stay index-aligned.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::types::UserId;

fn coerce<T: DeserializeOwned + Default>(value: Value) -> T {
    serde_json::from_value(value).unwrap_or_default()
}

pub(crate) fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(coerce(Value::deserialize(deserializer)?))
}

pub(crate) fn entries<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().map(coerce).collect(),
        _ => Vec::new(),
    })
}

pub(crate) fn per_member<'de, D, V>(deserializer: D) -> Result<HashMap<UserId, V>, D::Error>
where
    D: Deserializer<'de>,
    V: DeserializeOwned + Default,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(fields) => fields
            .into_iter()
            .map(|(uid, value)| (UserId::new(uid), coerce(value)))
            .collect(),
        _ => HashMap::new(),
    })
}
