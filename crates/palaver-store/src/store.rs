//! The document store task.
//!
//! All state lives inside one spawned task.  The rest of the application
//! talks to it through [`StoreHandle`], which wraps the command channel and
//! turns each request into a `StoreCommand` carrying a oneshot reply.
//!
//! Live feeds are re-evaluated after every commit that touches their
//! collection and receive a new snapshot only when their result changed.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::batch::{WriteBatch, WriteMode};
use crate::config::StoreConfig;
use crate::document::{validate_collection, DocPath, DocumentSnapshot, Patch};
use crate::error::{Result, StoreError};
use crate::query::Query;
use crate::subscription::{FeedEvent, Subscription, SubscriptionId};

// ---- Commands ----

/// What a live feed watches.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchTarget {
    Document(DocPath),
    Query(Query),
}

impl WatchTarget {
    fn collection(&self) -> &str {
        match self {
            WatchTarget::Document(path) => &path.collection,
            WatchTarget::Query(query) => &query.collection,
        }
    }
}

/// Commands sent *to* the store task.
#[derive(Debug)]
pub enum StoreCommand {
    /// Read one document.
    Get {
        path: DocPath,
        reply: oneshot::Sender<Result<Option<DocumentSnapshot>>>,
    },
    /// Run a query once.
    Query {
        query: Query,
        reply: oneshot::Sender<Result<Vec<DocumentSnapshot>>>,
    },
    /// Create a document with a store-assigned id.
    Add {
        collection: String,
        patch: Patch,
        reply: oneshot::Sender<Result<String>>,
    },
    /// Apply a batch atomically.
    Commit {
        batch: WriteBatch,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Register a live feed.
    Watch {
        target: WatchTarget,
        events: mpsc::UnboundedSender<FeedEvent>,
        reply: oneshot::Sender<SubscriptionId>,
    },
    /// Cancel a live feed.
    Unwatch(SubscriptionId),
    /// Number of live feeds currently registered.
    FeedCount(oneshot::Sender<usize>),
    /// Simulate losing (or regaining) connectivity: reads and writes fail
    /// with `Unavailable` while offline.  Live feeds keep their last result.
    SetOffline(bool),
    /// Stop the task.
    Shutdown,
}

// ---- Handle ----

/// Cloneable handle to the store task.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    cmd_tx: mpsc::Sender<StoreCommand>,
}

/// Spawn the store task and return a handle to it.
pub fn spawn_store(config: StoreConfig) -> StoreHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<StoreCommand>(config.command_buffer.max(1));

    tokio::spawn(async move {
        let mut state = StoreState::new(config);
        info!(ordered_queries = state.config.ordered_queries, "Store task started");

        while let Some(cmd) = cmd_rx.recv().await {
            if matches!(cmd, StoreCommand::Shutdown) {
                info!("Store shutdown requested");
                break;
            }
            state.handle(cmd);
        }

        info!(feeds = state.watchers.len(), "Store task stopped");
    });

    StoreHandle { cmd_tx }
}

impl StoreHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> StoreCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    pub async fn get(&self, path: DocPath) -> Result<Option<DocumentSnapshot>> {
        self.request(|reply| StoreCommand::Get { path, reply }).await?
    }

    /// Every document of a collection, in id order.
    pub async fn list(&self, collection: impl Into<String>) -> Result<Vec<DocumentSnapshot>> {
        self.query(Query::collection(collection)).await
    }

    pub async fn query(&self, query: Query) -> Result<Vec<DocumentSnapshot>> {
        self.request(|reply| StoreCommand::Query { query, reply })
            .await?
    }

    /// Create-or-merge a single document.
    pub async fn set_merge(&self, path: DocPath, patch: Patch) -> Result<()> {
        self.commit(WriteBatch::single(path, patch, WriteMode::Merge))
            .await
    }

    /// Create a document at `path`.  Checked and applied inside the store
    /// task, so of two racing creates exactly one succeeds; the other gets
    /// `AlreadyExists` and the document is left as the winner wrote it.
    pub async fn create(&self, path: DocPath, patch: Patch) -> Result<()> {
        self.commit(WriteBatch::single(path, patch, WriteMode::Create))
            .await
    }

    /// Patch an existing document.
    pub async fn update(&self, path: DocPath, patch: Patch) -> Result<()> {
        self.commit(WriteBatch::single(path, patch, WriteMode::Update))
            .await
    }

    /// Create a document under `collection` and return its new id.
    pub async fn add(&self, collection: impl Into<String>, patch: Patch) -> Result<String> {
        let collection = collection.into();
        self.request(|reply| StoreCommand::Add {
            collection,
            patch,
            reply,
        })
        .await?
    }

    pub async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.request(|reply| StoreCommand::Commit { batch, reply })
            .await?
    }

    pub async fn watch_document(&self, path: DocPath) -> Result<Subscription> {
        path.validate()?;
        self.watch(WatchTarget::Document(path)).await
    }

    pub async fn watch_query(&self, query: Query) -> Result<Subscription> {
        validate_collection(&query.collection)?;
        self.watch(WatchTarget::Query(query)).await
    }

    async fn watch(&self, target: WatchTarget) -> Result<Subscription> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let id = self
            .request(|reply| StoreCommand::Watch {
                target,
                events: events_tx,
                reply,
            })
            .await?;
        Ok(Subscription::new(id, events_rx, self.cmd_tx.clone()))
    }

    pub async fn feed_count(&self) -> Result<usize> {
        self.request(StoreCommand::FeedCount).await
    }

    pub async fn set_offline(&self, offline: bool) -> Result<()> {
        self.cmd_tx
            .send(StoreCommand::SetOffline(offline))
            .await
            .map_err(|_| StoreError::Closed)
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(StoreCommand::Shutdown).await;
    }
}

// ---- State ----

struct Watcher {
    target: WatchTarget,
    events: mpsc::UnboundedSender<FeedEvent>,
    last: Vec<DocumentSnapshot>,
}

struct StoreState {
    config: StoreConfig,
    /// collection path -> document id -> fields
    collections: HashMap<String, BTreeMap<String, Value>>,
    watchers: HashMap<SubscriptionId, Watcher>,
    next_watch_id: SubscriptionId,
    offline: bool,
    last_stamp: Option<DateTime<Utc>>,
}

impl StoreState {
    fn new(config: StoreConfig) -> Self {
        Self {
            config,
            collections: HashMap::new(),
            watchers: HashMap::new(),
            next_watch_id: 1,
            offline: false,
            last_stamp: None,
        }
    }

    fn handle(&mut self, cmd: StoreCommand) {
        match cmd {
            StoreCommand::Get { path, reply } => {
                let _ = reply.send(self.get(&path));
            }
            StoreCommand::Query { query, reply } => {
                let _ = reply.send(self.query(&query));
            }
            StoreCommand::Add {
                collection,
                patch,
                reply,
            } => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                let path = DocPath::new(collection, id.clone());
                let batch = WriteBatch::single(path, patch, WriteMode::Merge);
                let _ = reply.send(self.commit(batch).map(|()| id));
            }
            StoreCommand::Commit { batch, reply } => {
                let _ = reply.send(self.commit(batch));
            }
            StoreCommand::Watch {
                target,
                events,
                reply,
            } => {
                let id = self.next_watch_id;
                self.next_watch_id += 1;
                let _ = reply.send(id);
                self.register(id, target, events);
            }
            StoreCommand::Unwatch(id) => {
                if self.watchers.remove(&id).is_some() {
                    debug!(feed = id, "Feed cancelled");
                }
            }
            StoreCommand::FeedCount(reply) => {
                let _ = reply.send(self.watchers.len());
            }
            StoreCommand::SetOffline(offline) => {
                info!(offline, "Store connectivity changed");
                self.offline = offline;
            }
            StoreCommand::Shutdown => {}
        }
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline {
            return Err(StoreError::Unavailable("client is offline".into()));
        }
        Ok(())
    }

    /// Store clock.  Strictly increasing at millisecond resolution, so
    /// consecutive writes never share a server timestamp.
    fn tick(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_stamp {
            let floor = last + ChronoDuration::milliseconds(1);
            if now < floor {
                now = floor;
            }
        }
        self.last_stamp = Some(now);
        now
    }

    fn get(&self, path: &DocPath) -> Result<Option<DocumentSnapshot>> {
        self.ensure_online()?;
        path.validate()?;
        Ok(self.document(path))
    }

    fn document(&self, path: &DocPath) -> Option<DocumentSnapshot> {
        self.collections
            .get(&path.collection)
            .and_then(|docs| docs.get(&path.id))
            .map(|data| DocumentSnapshot {
                id: path.id.clone(),
                data: data.clone(),
            })
    }

    fn query(&self, query: &Query) -> Result<Vec<DocumentSnapshot>> {
        self.ensure_online()?;
        validate_collection(&query.collection)?;
        self.check_supported(query)?;
        Ok(self.run(query))
    }

    fn check_supported(&self, query: &Query) -> Result<()> {
        if query.needs_composite_index() && !self.config.ordered_queries {
            return Err(StoreError::QueryUnsupported(format!(
                "filtered and ordered query on '{}'",
                query.collection
            )));
        }
        Ok(())
    }

    fn run(&self, query: &Query) -> Vec<DocumentSnapshot> {
        match self.collections.get(&query.collection) {
            Some(docs) => query.evaluate(docs),
            None => Vec::new(),
        }
    }

    fn evaluate(&self, target: &WatchTarget) -> Vec<DocumentSnapshot> {
        match target {
            WatchTarget::Document(path) => self.document(path).into_iter().collect(),
            WatchTarget::Query(query) => self.run(query),
        }
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        self.ensure_online()?;
        batch.validate()?;

        // Updates need their target to exist and creates need it absent,
        // counting earlier writes in the same batch.
        let mut created: HashSet<&DocPath> = HashSet::new();
        for (path, _, mode) in &batch.writes {
            let exists = created.contains(path) || self.document(path).is_some();
            match mode {
                WriteMode::Update if !exists => {
                    return Err(StoreError::NotFound(path.to_string()));
                }
                WriteMode::Create if exists => {
                    return Err(StoreError::AlreadyExists(path.to_string()));
                }
                WriteMode::Merge | WriteMode::Create => {
                    created.insert(path);
                }
                WriteMode::Update => {}
            }
        }

        let now = self.tick();
        let mut touched = HashSet::new();
        for (path, patch, _) in &batch.writes {
            let docs = self.collections.entry(path.collection.clone()).or_default();
            let doc = docs
                .entry(path.id.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(fields) = doc {
                patch.apply(fields, now);
            }
            debug!(doc = %path, ops = patch.ops().len(), "Document written");
            touched.insert(path.collection.clone());
        }

        self.notify(&touched);
        Ok(())
    }

    fn register(
        &mut self,
        id: SubscriptionId,
        target: WatchTarget,
        events: mpsc::UnboundedSender<FeedEvent>,
    ) {
        if let WatchTarget::Query(query) = &target {
            if let Err(e) = self.check_supported(query) {
                warn!(feed = id, error = %e, "Feed rejected");
                let _ = events.send(FeedEvent::Failed(e));
                return;
            }
        }

        let initial = self.evaluate(&target);
        if events.send(FeedEvent::Snapshot(initial.clone())).is_err() {
            return;
        }
        debug!(feed = id, collection = target.collection(), "Feed registered");
        self.watchers.insert(
            id,
            Watcher {
                target,
                events,
                last: initial,
            },
        );
    }

    fn notify(&mut self, touched: &HashSet<String>) {
        let mut closed = Vec::new();
        let ids: Vec<SubscriptionId> = self.watchers.keys().copied().collect();

        for id in ids {
            let Some(watcher) = self.watchers.get(&id) else {
                continue;
            };
            if !touched.contains(watcher.target.collection()) {
                continue;
            }
            let current = self.evaluate(&watcher.target);
            if current == watcher.last {
                continue;
            }
            if watcher
                .events
                .send(FeedEvent::Snapshot(current.clone()))
                .is_err()
            {
                closed.push(id);
                continue;
            }
            if let Some(watcher) = self.watchers.get_mut(&id) {
                watcher.last = current;
            }
        }

        for id in closed {
            debug!(feed = id, "Feed receiver dropped");
            self.watchers.remove(&id);
        }
    }
}
