//! # palaver-store
//!
//! The backend collaborator the Palaver client talks to: a real-time document
//! store and an authentication service.
//!
//! The document store runs in its own tokio task.  Callers hold a cloneable
//! [`StoreHandle`] and send typed commands over an mpsc channel; every write is
//! applied by the task in arrival order, and live feeds ([`Subscription`])
//! receive the complete current result of their query whenever it changes.
//! Timestamps written through [`Patch::server_timestamp`] always come from the
//! store's clock, never from a caller.

pub mod auth;
pub mod batch;
pub mod config;
pub mod document;
pub mod query;
pub mod store;
pub mod subscription;

mod error;

pub use auth::{AuthClient, AuthError, AuthServer, AuthUser};
pub use batch::{WriteBatch, WriteMode};
pub use config::StoreConfig;
pub use document::{DocPath, DocumentSnapshot, FieldOp, Patch};
pub use error::{Result, StoreError};
pub use query::{Direction, Query};
pub use store::{spawn_store, StoreCommand, StoreHandle, WatchTarget};
pub use subscription::{FeedEvent, Subscription, SubscriptionId};
