// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Redis-backed store client for the `tether` distributed cache and lock.
//!
//! [`RedisConnector`] implements [`tether_store::Connector`] and produces a
//! [`RedisStore`], which implements [`tether_store::Store`] on top of a single
//! multiplexed Redis connection.
//!
//! # Command mapping
//!
//! | Store operation | Redis commands |
//! |-----------------|----------------|
//! | `get` | `GET key` |
//! | `set` | `SET key value PX ttl [NX \| XX]` |
//! | `delete` | `DEL key` |
//! | `watch` | `WATCH key` |
//! | `Transaction::get` | `GET key` |
//! | `Transaction::exec` | `MULTI`, queued commands, `EXEC` |
//! | `Transaction::discard` | `UNWATCH` |
//!
//! # Connection sharing
//!
//! Redis tracks `WATCH` per connection. A [`RedisStore`] therefore serializes access
//! to its connection: a plain command holds it for one round trip and a transaction
//! holds it from `WATCH` until `EXEC` or `UNWATCH`. Concurrent callers on the same
//! store wait for each other instead of interleaving commands inside a transaction.
//!
//! # Example
//!
//! ```no_run
//! use tether_redis::RedisConnector;
//! use tether_store::{ConnectionSettings, Connector, Endpoint, Store};
//!
//! # async fn example() -> tether_store::Result<()> {
//! let settings = ConnectionSettings::new(Endpoint::address("localhost", 6379)).with_database(1);
//! let store = RedisConnector::new().connect(&settings).await?;
//!
//! let _greeting = store.get("greeting").await?;
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

mod connector;
mod store;

#[doc(inline)]
pub use connector::RedisConnector;
#[doc(inline)]
pub use store::{RedisStore, RedisTransaction};
