// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Distributed cache and distributed lock over a remote key-value store.
//!
//! This crate provides two coordination primitives for processes that share a
//! remote store such as Redis:
//!
//! - [`DistributedCache`] stores opaque byte values under string keys, each with its
//!   own expiration enforced by the store.
//! - [`DistributedLock`] grants a named key to a single owner for a limited time.
//!   Only the current owner can release it, even when its lease lapsed and the key
//!   was acquired by someone else in the meantime.
//!
//! Both talk to the store through the [`tether_store::Connector`] and
//! [`tether_store::Store`] traits. `tether_redis` provides the Redis implementation,
//! and the `test-util` feature of `tether_store` provides an in-memory one for tests.
//!
//! # Lifecycle
//!
//! Components are created closed. [`configure`](DistributedCache::configure) them
//! with a [`Config`], optionally wire [`References`] to discovery services and
//! credential stores, then [`open`](DistributedCache::open) them. Opening resolves the
//! connection and credential and connects; operations on a closed component fail with
//! [`Error::InvalidState`]. [`close`](DistributedCache::close) drops the connection.
//!
//! Every operation takes a correlation id, which is carried into log events and
//! errors and has no other effect.
//!
//! # Locking protocol
//!
//! Acquiring writes the lock's [`LockToken`] under the key only if the key is absent,
//! with the requested time-to-live. Releasing watches the key, reads it, and deletes
//! it in a transaction that the store applies only if the key did not change after
//! the watch. A release therefore reports one of the [`ReleaseOutcome`] values and
//! never deletes a lock held by someone else.
//!
//! [`DistributedLock::acquire_lock`] retries a busy lock according to the configured
//! [`Options`], sleeping on the injected [`tick::Clock`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use tether::{Config, DistributedCache, DistributedLock};
//! use tether_store::testing::MemoryStore;
//! use tick::ClockControl;
//!
//! # futures::executor::block_on(async {
//! let control = ClockControl::new().auto_advance_timers(true);
//! let store = MemoryStore::new(control.to_clock());
//! let config = Config::with_address("localhost", 6379);
//!
//! let mut cache = DistributedCache::new(store.connector());
//! cache.configure(&config);
//! cache.open("startup").await?;
//!
//! let mut lock = DistributedLock::new(store.connector(), control.to_clock());
//! lock.configure(&config);
//! lock.open("startup").await?;
//!
//! lock.acquire_lock("job-7", "report", Duration::from_secs(10), Duration::from_secs(1)).await?;
//! cache.store("job-7", "report:status", b"running", Duration::from_secs(60)).await?;
//! lock.release_lock("job-7", "report").await?;
//! # Ok::<(), tether::Error>(())
//! # });
//! ```

mod cache;
mod config;
mod connection;
mod error;
mod lock;
mod resolve;
mod retry;

pub use cache::DistributedCache;
pub use config::{
    Backoff, Config, ConnectionParams, CredentialParams, DEFAULT_RETRIES, DEFAULT_RETRY_TIMEOUT_MS, DEFAULT_TIMEOUT_MS,
    MAX_DATABASE, Options,
};
pub use error::{BoxError, Error, Result};
pub use lock::{DistributedLock, LockToken, ReleaseOutcome};
pub use resolve::{ConnectionResolver, CredentialResolver, CredentialStore, Discovery, References};
