//! Live feed handles.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::document::DocumentSnapshot;
use crate::error::StoreError;
use crate::store::StoreCommand;

pub type SubscriptionId = u64;

/// One delivery on a live feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// The complete current result.  A document feed carries zero or one
    /// entries; zero means the document does not exist.
    Snapshot(Vec<DocumentSnapshot>),
    /// The feed failed and will deliver nothing further.
    Failed(StoreError),
}

/// Handle to a live feed registered with the store task.
///
/// Deliveries are read as a [`Stream`]; it ends once the feed is closed.
///
/// Dropping the handle cancels the feed on a best-effort basis; call
/// [`Subscription::unsubscribe`] to cancel it deterministically.
pub struct Subscription {
    id: SubscriptionId,
    events: mpsc::UnboundedReceiver<FeedEvent>,
    cmd_tx: mpsc::Sender<StoreCommand>,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        events: mpsc::UnboundedReceiver<FeedEvent>,
        cmd_tx: mpsc::Sender<StoreCommand>,
    ) -> Self {
        Self {
            id,
            events,
            cmd_tx,
            active: true,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Cancel the feed.  No further events are delivered after this returns.
    pub async fn unsubscribe(mut self) {
        self.active = false;
        self.events.close();
        let _ = self.cmd_tx.send(StoreCommand::Unwatch(self.id)).await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.active {
            let _ = self.cmd_tx.try_send(StoreCommand::Unwatch(self.id));
        }
    }
}

impl Stream for Subscription {
    type Item = FeedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
