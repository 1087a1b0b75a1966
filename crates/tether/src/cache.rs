// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::time::Duration;

use tether_store::{Connector, SetCondition, Store};

use crate::connection::{Connection, check_ttl};
use crate::{Config, References, Result};

/// A cache of opaque byte values shared through a remote key-value store.
///
/// Every entry carries its own expiration, enforced by the store. A value read after
/// it expired is reported as absent. Writes to the same key overwrite each other,
/// the last writer wins.
///
/// The component must be opened before use. Operations on a closed component fail
/// with [`Error::InvalidState`](crate::Error::InvalidState) without contacting the
/// store.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use tether::{Config, DistributedCache};
/// use tether_store::testing::MemoryStore;
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let store = MemoryStore::new(Clock::new_frozen());
/// let mut cache = DistributedCache::new(store.connector());
/// cache.configure(&Config::with_address("localhost", 6379));
/// cache.open("startup").await?;
///
/// cache.store("req-1", "greeting", b"hello", Duration::from_secs(5)).await?;
/// assert_eq!(cache.retrieve("req-1", "greeting").await?.as_deref(), Some(&b"hello"[..]));
///
/// cache.close("shutdown").await?;
/// # Ok::<(), tether::Error>(())
/// # });
/// ```
pub struct DistributedCache<C: Connector> {
    connection: Connection<C>,
}

impl<C: Connector> DistributedCache<C> {
    /// Creates a closed cache that connects through `connector`.
    #[must_use]
    pub fn new(connector: C) -> Self {
        Self {
            connection: Connection::new("cache", connector),
        }
    }

    /// Applies connection, credential and option settings.
    ///
    /// Takes effect on the next [`open`](Self::open).
    pub fn configure(&mut self, config: &Config) {
        self.connection.configure(config);
    }

    /// Sets the discovery services and credential stores used on [`open`](Self::open).
    pub fn set_references(&mut self, references: &References) {
        self.connection.set_references(references);
    }

    /// Returns `true` while the cache holds a store connection.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// Resolves the connection and credential and connects to the store.
    ///
    /// Does nothing if the cache is already open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](crate::Error::Configuration) with code
    /// `NO_CONNECTION` if no connection resolves, errors raised by discovery services
    /// and credential stores unchanged, and store errors raised while connecting.
    pub async fn open(&mut self, correlation_id: &str) -> Result<()> {
        self.connection.open(correlation_id).await
    }

    /// Closes the store connection. Does nothing if the cache is not open.
    ///
    /// # Errors
    ///
    /// Returns the error raised by the store while closing. The cache is closed
    /// either way.
    pub async fn close(&mut self, correlation_id: &str) -> Result<()> {
        self.connection.close(correlation_id).await
    }

    /// Stores `value` under `key`, expiring after `timeout`.
    ///
    /// # Errors
    ///
    /// Fails if the cache is not open, if `timeout` is below one millisecond, or if
    /// the store fails.
    pub async fn store(&self, correlation_id: &str, key: &str, value: &[u8], timeout: Duration) -> Result<()> {
        let store = self.connection.store(correlation_id)?;
        check_ttl(correlation_id, "timeout", timeout)?;

        store.set(key, value, timeout, SetCondition::Always).await?;
        tracing::debug!(correlation_id, key, ?timeout, len = value.len(), "stored");
        Ok(())
    }

    /// Stores `value` under `key`, expiring after the configured `options.timeout`.
    ///
    /// # Errors
    ///
    /// Fails like [`store`](Self::store).
    pub async fn store_default(&self, correlation_id: &str, key: &str, value: &[u8]) -> Result<()> {
        let timeout = self.connection.options().timeout();
        self.store(correlation_id, key, value, timeout).await
    }

    /// Returns the value stored under `key`, or `None` if it is absent or expired.
    ///
    /// # Errors
    ///
    /// Fails if the cache is not open or the store fails.
    pub async fn retrieve(&self, correlation_id: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let store = self.connection.store(correlation_id)?;

        let value = store.get(key).await?;
        tracing::debug!(correlation_id, key, hit = value.is_some(), "retrieved");
        Ok(value)
    }

    /// Removes `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Fails if the cache is not open or the store fails.
    pub async fn remove(&self, correlation_id: &str, key: &str) -> Result<()> {
        let store = self.connection.store(correlation_id)?;

        let existed = store.delete(key).await?;
        tracing::debug!(correlation_id, key, existed, "removed");
        Ok(())
    }
}

impl<C: Connector + Debug> Debug for DistributedCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedCache").field("connection", &self.connection).finish()
    }
}
