//! Typing indicator: evaluation of peers' flags and the local clear timer.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use palaver_shared::{to_millis, Timestamp, UserId};
use tokio::task::JoinHandle;

/// True if any of `peers` has a typing timestamp younger than `threshold_ms`.
///
/// Absent or unresolved timestamps count as not typing; a timestamp slightly
/// ahead of the local clock counts as fresh.
pub fn is_typing(
    typing: &HashMap<UserId, Timestamp>,
    peers: &[&UserId],
    now_ms: u64,
    threshold_ms: u64,
) -> bool {
    peers.iter().any(|peer| {
        let at = to_millis(typing.get(*peer));
        at > 0 && now_ms.saturating_sub(at) < threshold_ms
    })
}

/// Holds at most one pending "stop typing" action.
///
/// Arming schedules `action` after the configured delay and aborts whatever
/// was pending before.  Dropping the debouncer aborts the pending action.
#[derive(Debug)]
pub struct TypingDebouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl TypingDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn arm<F>(&mut self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TypingDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
