//! Timestamp normalization.
//!
//! Time-like fields reach the client in several shapes: the backend's own
//! `{seconds, nanoseconds}` wrapper, RFC 3339 strings written by older
//! clients, raw epoch-millisecond numbers, or nothing at all while a
//! server-assigned time is still in flight.  [`Timestamp`] accepts all of them
//! and [`to_millis`] is the single place that turns one into a number.
//! Nothing else in the workspace matches on the variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A time-like value as stored in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Server-resolved wrapper.
    Server { seconds: i64, nanoseconds: u32 },
    /// Native date/time value.
    Date(DateTime<Utc>),
    /// Epoch milliseconds.
    Millis(f64),
    /// Anything else; normalizes to zero.
    Other(serde_json::Value),
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::Other(serde_json::Value::Null)
    }
}

impl Timestamp {
    /// Server wrapper for the given instant.
    pub fn server(at: DateTime<Utc>) -> Self {
        Self::Server {
            seconds: at.timestamp(),
            nanoseconds: at.timestamp_subsec_nanos(),
        }
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self::Date(at)
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::Millis(ms as f64)
    }

    /// Epoch milliseconds, or `0` when the value cannot be interpreted.
    pub fn as_millis(&self) -> u64 {
        match self {
            Self::Server {
                seconds,
                nanoseconds,
            } => {
                let Ok(secs) = u64::try_from(*seconds) else {
                    return 0;
                };
                secs.checked_mul(1_000)
                    .and_then(|ms| ms.checked_add(u64::from(*nanoseconds / 1_000_000)))
                    .unwrap_or(0)
            }
            Self::Date(at) => u64::try_from(at.timestamp_millis()).unwrap_or(0),
            Self::Millis(ms) => {
                if ms.is_finite() && *ms >= 0.0 && *ms < u64::MAX as f64 {
                    ms.trunc() as u64
                } else {
                    0
                }
            }
            Self::Other(_) => 0,
        }
    }
}

/// Normalize an optional timestamp to epoch milliseconds.
///
/// Absent, malformed, negative or out-of-range input yields `0`.  This never
/// panics, so partially synced documents can always be rendered.
pub fn to_millis(ts: Option<&Timestamp>) -> u64 {
    ts.map(Timestamp::as_millis).unwrap_or(0)
}

/// Local wall clock in epoch milliseconds.
pub fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
