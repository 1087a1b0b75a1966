// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory store implementation for testing.
//!
//! This module provides [`MemoryStore`], a store that keeps its data in process
//! memory, expires keys using a [`tick::Clock`], honors optimistic transactions,
//! records every operation and supports failure injection for testing error paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tick::Clock;

use crate::{Batch, Command, CommitOutcome, ConnectionSettings, Connector, Error, Result, SetCondition, Store, Transaction};

/// Recorded store operation with full context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// A connection was established with the given settings.
    Connect(ConnectionSettings),
    /// A plain read of the given key.
    Get(String),
    /// A write of the given key.
    Set {
        /// The key that was written.
        key: String,
        /// The requested time-to-live.
        ttl: Duration,
        /// The existence condition of the write.
        condition: SetCondition,
    },
    /// A deletion of the given key.
    Delete(String),
    /// A transaction started watching the given key.
    Watch(String),
    /// A read of the given key inside a transaction.
    TransactionGet(String),
    /// A transaction attempted to commit the given batch.
    Exec(Batch),
    /// A transaction abandoned its watch.
    Discard,
    /// The connection was closed.
    Close,
}

type FailPredicate = Box<dyn Fn(&StoreOp) -> bool + Send + Sync>;
type Hook = Box<dyn FnOnce() + Send>;

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
    version: u64,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct Data {
    entries: HashMap<String, Entry>,
    next_version: u64,
}

impl Data {
    fn live(&mut self, key: &str, now: Instant) -> Option<&Entry> {
        if self.entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get(key)
    }

    /// Identity of the live value under `key`; changes on every write, delete or expiry.
    fn fingerprint(&mut self, key: &str, now: Instant) -> Option<u64> {
        self.live(key, now).map(|entry| entry.version)
    }

    fn write(&mut self, key: &str, value: &[u8], ttl: Duration, now: Instant) {
        self.next_version += 1;
        let entry = Entry {
            value: value.to_vec(),
            expires_at: now.checked_add(ttl),
            version: self.next_version,
        };
        self.entries.insert(key.to_string(), entry);
    }
}

struct Shared {
    clock: Clock,
    data: Mutex<Data>,
    operations: Mutex<Vec<StoreOp>>,
    fail_when: Mutex<Option<FailPredicate>>,
    before_exec: Mutex<Option<Hook>>,
}

/// An in-memory store for testing.
///
/// Clones share the same data, so a single `MemoryStore` can stand in for the remote
/// store seen by several components (and therefore several simulated processes).
/// Expiration follows the supplied clock, which makes TTL behavior deterministic when
/// the clock comes from [`tick::ClockControl`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use tether_store::{SetCondition, Store, testing::MemoryStore};
/// use tick::ClockControl;
///
/// # futures::executor::block_on(async {
/// let control = ClockControl::new();
/// let store = MemoryStore::new(control.to_clock());
///
/// store.set("greeting", b"hello", Duration::from_secs(1), SetCondition::Always).await.unwrap();
/// assert_eq!(store.get("greeting").await.unwrap(), Some(b"hello".to_vec()));
///
/// control.advance(Duration::from_secs(2));
/// assert_eq!(store.get("greeting").await.unwrap(), None);
/// # });
/// ```
///
/// # Failure Injection
///
/// ```
/// use tether_store::{Store, testing::{MemoryStore, StoreOp}};
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let store = MemoryStore::new(Clock::new_frozen());
/// store.fail_when(|op| matches!(op, StoreOp::Get(key) if key == "broken"));
///
/// assert!(store.get("broken").await.is_err());
/// assert!(store.get("fine").await.is_ok());
/// # });
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("data", &self.shared.data)
            .field("operations", &self.shared.operations)
            .field("fail_when", &self.shared.fail_when.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Creates an empty store whose expirations follow `clock`.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            shared: Arc::new(Shared {
                clock,
                data: Mutex::new(Data::default()),
                operations: Mutex::new(Vec::new()),
                fail_when: Mutex::new(None),
                before_exec: Mutex::new(None),
            }),
        }
    }

    /// Returns a connector whose connections all share this store's data.
    #[must_use]
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector { store: self.clone() }
    }

    /// Sets a predicate that determines when operations should fail.
    ///
    /// Failed operations are still recorded but do not touch the data.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.shared.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.shared.fail_when.lock() = None;
    }

    /// Registers a hook that runs once, right before the next transaction commit is
    /// evaluated.
    ///
    /// Use it to simulate another process writing between a transaction's read and its
    /// commit.
    pub fn before_exec<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.shared.before_exec.lock() = Some(Box::new(hook));
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.shared.operations.lock().clone()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.shared.operations.lock().clear();
    }

    /// Returns the settings of every connection attempted through a connector.
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionSettings> {
        self.shared
            .operations
            .lock()
            .iter()
            .filter_map(|op| match op {
                StoreOp::Connect(settings) => Some(settings.clone()),
                _ => None,
            })
            .collect()
    }

    /// Writes a value directly, bypassing recording and failure injection.
    ///
    /// This simulates a write by a process outside the code under test.
    pub fn put(&self, key: &str, value: impl AsRef<[u8]>, ttl: Duration) {
        let now = self.shared.clock.instant();
        self.shared.data.lock().write(key, value.as_ref(), ttl, now);
    }

    /// Returns the live value under `key` without recording an operation.
    #[must_use]
    pub fn value_of(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.shared.clock.instant();
        self.shared.data.lock().live(key, now).map(|entry| entry.value.clone())
    }

    /// Returns the remaining time-to-live of `key`, if it is live and expires.
    #[must_use]
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        let now = self.shared.clock.instant();
        self.shared
            .data
            .lock()
            .live(key, now)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        let now = self.shared.clock.instant();
        let mut data = self.shared.data.lock();
        data.entries.retain(|_, entry| entry.is_live(now));
        data.entries.len()
    }

    fn check(&self, op: StoreOp) -> Result<()> {
        let fail = self.shared.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        let message = fail.then(|| format!("memory store: {op:?} failed"));
        self.shared.operations.lock().push(op);

        match message {
            Some(message) => Err(Error::from_message(message)),
            None => Ok(()),
        }
    }

    fn now(&self) -> Instant {
        self.shared.clock.instant()
    }
}

impl Store for MemoryStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check(StoreOp::Get(key.to_string()))?;
        let now = self.now();
        Ok(self.shared.data.lock().live(key, now).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration, condition: SetCondition) -> Result<bool> {
        self.check(StoreOp::Set {
            key: key.to_string(),
            ttl,
            condition,
        })?;

        let now = self.now();
        let mut data = self.shared.data.lock();
        let exists = data.live(key, now).is_some();
        let allowed = match condition {
            SetCondition::Always => true,
            SetCondition::IfAbsent => !exists,
            SetCondition::IfPresent => exists,
        };

        if allowed {
            data.write(key, value, ttl, now);
        }

        Ok(allowed)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check(StoreOp::Delete(key.to_string()))?;
        let now = self.now();
        let mut data = self.shared.data.lock();
        let existed = data.live(key, now).is_some();
        data.entries.remove(key);
        Ok(existed)
    }

    async fn watch(&self, key: &str) -> Result<MemoryTransaction<'_>> {
        self.check(StoreOp::Watch(key.to_string()))?;
        let now = self.now();
        let fingerprint = self.shared.data.lock().fingerprint(key, now);

        Ok(MemoryTransaction {
            store: self,
            watched: vec![(key.to_string(), fingerprint)],
        })
    }

    async fn close(self) -> Result<()> {
        self.check(StoreOp::Close)
    }
}

/// A transaction against a [`MemoryStore`].
///
/// The commit is rejected if any watched key was written, deleted or expired after the
/// watch began, mirroring the store's optimistic transaction semantics.
#[derive(Debug)]
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    watched: Vec<(String, Option<u64>)>,
}

impl Transaction for MemoryTransaction<'_> {
    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        self.store.check(StoreOp::TransactionGet(key.to_string()))?;
        let now = self.store.now();
        Ok(self.store.shared.data.lock().live(key, now).map(|entry| entry.value.clone()))
    }

    async fn exec(self, batch: Batch) -> Result<CommitOutcome> {
        let hook = self.store.shared.before_exec.lock().take();
        if let Some(hook) = hook {
            hook();
        }

        self.store.check(StoreOp::Exec(batch.clone()))?;

        let now = self.store.now();
        let mut data = self.store.shared.data.lock();
        let unchanged = self
            .watched
            .iter()
            .all(|(key, fingerprint)| data.fingerprint(key, now) == *fingerprint);

        if !unchanged {
            return Ok(CommitOutcome::Rejected);
        }

        for command in batch {
            match command {
                Command::Delete(key) => {
                    data.entries.remove(&key);
                }
            }
        }

        Ok(CommitOutcome::Committed)
    }

    async fn discard(self) -> Result<()> {
        self.store.check(StoreOp::Discard)
    }
}

/// A connector that hands out handles to a shared [`MemoryStore`].
///
/// Every successful connection is recorded as [`StoreOp::Connect`] together with the
/// settings it was given.
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    store: MemoryStore,
}

impl MemoryConnector {
    /// Returns the store this connector connects to.
    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl Connector for MemoryConnector {
    type Store = MemoryStore;

    async fn connect(&self, settings: &ConnectionSettings) -> Result<MemoryStore> {
        self.store.check(StoreOp::Connect(settings.clone()))?;
        Ok(self.store.clone())
    }
}
