// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Store abstractions for building remote key-value backends.
//!
//! This crate defines the [`Store`] trait that backs the `tether` distributed cache
//! and lock, the [`Transaction`] trait for the store's optimistic concurrency
//! mechanism, and the [`Connector`] trait that turns resolved
//! [`ConnectionSettings`] into a live store client.
//!
//! # Overview
//!
//! The store is assumed to be atomic for single commands and to support optimistic
//! transactions: a client watches a key, reads it, and then either commits a
//! [`Batch`] that is applied only if the watched key has not been modified in the
//! meantime, or discards the watch. The primitives in `tether` never perform local
//! expiry bookkeeping; all expiration is delegated to the store.
//!
//! # Implementing a Store
//!
//! A backend implements [`Store`] for its connection handle, [`Transaction`] for the
//! guard returned by [`Store::watch`], and [`Connector`] for the type that establishes
//! connections. See `tether_redis` for a production implementation and the
//! `testing` module (behind the `test-util` feature) for an in-memory one.

mod batch;
mod connect;
pub mod error;
mod store;
#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[doc(inline)]
pub use batch::{Batch, Command};
#[doc(inline)]
pub use connect::{ConnectionSettings, Connector, DEFAULT_HOST, DEFAULT_PORT, Endpoint};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use store::{CommitOutcome, SetCondition, Store, Transaction};
