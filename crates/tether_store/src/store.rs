// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core traits for remote store clients.

use std::time::Duration;

use crate::{Batch, Result};

/// Existence condition attached to a [`Store::set`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SetCondition {
    /// Write unconditionally, replacing any existing value and expiry.
    #[default]
    Always,

    /// Write only if the key does not exist (`NX`).
    IfAbsent,

    /// Write only if the key already exists (`XX`).
    IfPresent,
}

/// Result of committing a [`Transaction`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommitOutcome {
    /// The watched key was unchanged and the batch was applied.
    Committed,

    /// The watched key was modified (written, deleted or expired) after the watch began,
    /// so the store refused to apply the batch.
    Rejected,
}

/// A connection handle to a remote key-value store.
///
/// Every method is a single round trip and is atomic on the store side. Values are
/// opaque byte sequences, expirations are relative and enforced by the store.
///
/// Implementations decide whether several calls may be in flight on the same handle
/// at once. Implementations whose transport cannot multiplex transactions must
/// serialize access internally; callers never add locking of their own.
pub trait Store: Send + Sync {
    /// The transaction guard returned by [`Store::watch`].
    type Transaction<'a>: Transaction
    where
        Self: 'a;

    /// Reads the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist or has expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Writes `value` under `key` with the given time-to-live.
    ///
    /// Returns `true` if the value was written and `false` if `condition` prevented
    /// the write.
    fn set(&self, key: &str, value: &[u8], ttl: Duration, condition: SetCondition) -> impl Future<Output = Result<bool>> + Send;

    /// Deletes `key`, returning `true` if it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Begins an optimistic transaction by watching `key` for modification.
    ///
    /// The returned guard must be finished with either [`Transaction::exec`] or
    /// [`Transaction::discard`].
    fn watch(&self, key: &str) -> impl Future<Output = Result<Self::Transaction<'_>>> + Send;

    /// Closes the connection and frees its resources.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// An optimistic transaction in progress.
///
/// The transaction starts in the watching state. Reads issued through it observe the
/// current store state. It ends either by committing a [`Batch`] through
/// [`exec`](Self::exec), which the store applies only if no watched key changed, or
/// by abandoning the watch through [`discard`](Self::discard).
pub trait Transaction: Send {
    /// Reads a key while the watch is active.
    fn get(&mut self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Attempts to apply `batch` atomically.
    ///
    /// Returns [`CommitOutcome::Rejected`] rather than an error when a watched key was
    /// modified concurrently.
    fn exec(self, batch: Batch) -> impl Future<Output = Result<CommitOutcome>> + Send;

    /// Abandons the watch without modifying anything.
    fn discard(self) -> impl Future<Output = Result<()>> + Send;
}
