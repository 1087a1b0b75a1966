// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug, Display};
use std::time::Duration;

use tether_store::{Batch, CommitOutcome, Connector, SetCondition, Store, Transaction};
use tick::Clock;
use uuid::Uuid;

use crate::connection::{Connection, check_ttl};
use crate::retry::RetryPolicy;
use crate::{Config, Error, References, Result};

/// The value a [`DistributedLock`] writes under every key it holds.
///
/// Generated once per lock instance from a random UUID and rendered as 32 lowercase
/// hex characters.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the token as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LockToken").field(&self.0).finish()
    }
}

impl Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What [`DistributedLock::release_lock`] found.
///
/// None of the outcomes is an error: losing a lock to expiry is expected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReleaseOutcome {
    /// This instance held the lock and it was deleted.
    Released,

    /// The key was absent or held by another owner; it was left untouched.
    NotHeld,

    /// The key changed between reading it and committing the delete, typically
    /// because the lease expired and someone else acquired it. It was left
    /// untouched.
    Superseded,
}

/// A lease-based mutual-exclusion lock over a remote key-value store.
///
/// Each instance owns a [`LockToken`] and writes it under the keys it locks, with a
/// time-to-live after which the store drops the key. Releasing deletes the key only
/// while it still holds this instance's token, so a lock that expired and was
/// acquired by someone else is never released by its former holder.
///
/// The lock offers best-effort mutual exclusion. A holder that outlives its
/// time-to-live loses the lock without being told.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use tether::{Config, DistributedLock, ReleaseOutcome};
/// use tether_store::testing::MemoryStore;
/// use tick::ClockControl;
///
/// # futures::executor::block_on(async {
/// let control = ClockControl::new();
/// let store = MemoryStore::new(control.to_clock());
///
/// let mut lock = DistributedLock::new(store.connector(), control.to_clock());
/// lock.configure(&Config::with_address("localhost", 6379));
/// lock.open("startup").await?;
///
/// assert!(lock.try_acquire_lock("req-1", "orders", Duration::from_secs(2)).await?);
/// assert_eq!(lock.release_lock("req-1", "orders").await?, ReleaseOutcome::Released);
/// # Ok::<(), tether::Error>(())
/// # });
/// ```
pub struct DistributedLock<C: Connector> {
    connection: Connection<C>,
    clock: Clock,
    token: LockToken,
}

impl<C: Connector> DistributedLock<C> {
    /// Creates a closed lock with a fresh token.
    ///
    /// `clock` times bounded acquisition and the delays between its attempts.
    #[must_use]
    pub fn new(connector: C, clock: Clock) -> Self {
        Self {
            connection: Connection::new("lock", connector),
            clock,
            token: LockToken::generate(),
        }
    }

    /// Returns the token this instance writes under the keys it locks.
    #[must_use]
    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Applies connection, credential and retry settings.
    ///
    /// Connection settings take effect on the next [`open`](Self::open); retry
    /// settings on the next [`acquire_lock`](Self::acquire_lock).
    pub fn configure(&mut self, config: &Config) {
        self.connection.configure(config);
    }

    /// Sets the discovery services and credential stores used on [`open`](Self::open).
    pub fn set_references(&mut self, references: &References) {
        self.connection.set_references(references);
    }

    /// Returns `true` while the lock holds a store connection.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// Resolves the connection and credential and connects to the store.
    ///
    /// Does nothing if the lock is already open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] with code `NO_CONNECTION` if no connection
    /// resolves, errors raised by discovery services and credential stores unchanged,
    /// and store errors raised while connecting.
    pub async fn open(&mut self, correlation_id: &str) -> Result<()> {
        self.connection.open(correlation_id).await
    }

    /// Closes the store connection. Does nothing if the lock is not open.
    ///
    /// Locks still held are not released; they expire with their time-to-live.
    ///
    /// # Errors
    ///
    /// Returns the error raised by the store while closing. The lock is closed
    /// either way.
    pub async fn close(&mut self, correlation_id: &str) -> Result<()> {
        self.connection.close(correlation_id).await
    }

    /// Makes a single attempt to acquire `key` for `ttl`.
    ///
    /// Returns `false` if another owner holds the key. A key this instance already
    /// holds is reported as not acquired as well; its time-to-live is not extended.
    ///
    /// # Errors
    ///
    /// Fails if the lock is not open, if `ttl` is below one millisecond, or if the
    /// store fails.
    pub async fn try_acquire_lock(&self, correlation_id: &str, key: &str, ttl: Duration) -> Result<bool> {
        let store = self.connection.store(correlation_id)?;
        check_ttl(correlation_id, "ttl", ttl)?;

        self.try_acquire(store, correlation_id, key, ttl).await
    }

    /// Acquires `key` for `ttl`, retrying while another owner holds it.
    ///
    /// Makes at most `1 + options.retries` attempts. The delay before each retry
    /// follows `options.backoff` with `options.retry_timeout` as the base, is capped
    /// by `options.max_retry_delay`, and never exceeds the time left of `timeout`.
    /// When a delay ends exactly at the deadline one last attempt is made. A
    /// `timeout` of zero makes a single attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockTimeout`] when the attempts or the time run out, and
    /// fails like [`try_acquire_lock`](Self::try_acquire_lock) otherwise. Store errors
    /// end the acquisition immediately.
    pub async fn acquire_lock(&self, correlation_id: &str, key: &str, ttl: Duration, timeout: Duration) -> Result<()> {
        let store = self.connection.store(correlation_id)?;
        check_ttl(correlation_id, "ttl", ttl)?;

        let policy = RetryPolicy::from_options(self.connection.options());
        let stopwatch = self.clock.stopwatch();
        let mut delays = policy.delays();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            if self.try_acquire(store, correlation_id, key, ttl).await? {
                return Ok(());
            }

            let remaining = timeout.saturating_sub(stopwatch.elapsed());
            let Some(delay) = delays.next() else { break };
            if remaining.is_zero() {
                break;
            }

            let delay = delay.min(remaining);
            tracing::debug!(correlation_id, key, attempt = attempts, ?delay, "lock busy, retrying");
            self.clock.delay(delay).await;
        }

        let waited = stopwatch.elapsed();
        tracing::warn!(
            correlation_id,
            key,
            attempts,
            max_attempts = policy.max_attempts(),
            ?waited,
            "lock acquisition timed out"
        );

        Err(Error::LockTimeout {
            correlation_id: correlation_id.to_string(),
            key: key.to_string(),
            attempts,
            waited,
        })
    }

    /// Releases `key` if this instance holds it.
    ///
    /// Runs an optimistic transaction: watch the key, read it, and delete it only if
    /// it holds this instance's token and did not change since the read. Calling it
    /// for a key this instance does not hold is safe and leaves the key untouched.
    ///
    /// # Errors
    ///
    /// Fails if the lock is not open or the store fails.
    pub async fn release_lock(&self, correlation_id: &str, key: &str) -> Result<ReleaseOutcome> {
        let store = self.connection.store(correlation_id)?;

        // Watching: the transaction guard is consumed by exactly one of exec or discard.
        let mut transaction = store.watch(key).await?;
        let current = transaction.get(key).await?;

        let outcome = match current {
            Some(value) if value == self.token.as_bytes() => match transaction.exec(Batch::new().delete(key)).await? {
                CommitOutcome::Committed => ReleaseOutcome::Released,
                CommitOutcome::Rejected => {
                    tracing::warn!(correlation_id, key, "lock changed hands during release, not releasing");
                    ReleaseOutcome::Superseded
                }
            },
            Some(_) => {
                transaction.discard().await?;
                tracing::warn!(correlation_id, key, "lock is held by another owner, not releasing");
                ReleaseOutcome::NotHeld
            }
            None => {
                transaction.discard().await?;
                ReleaseOutcome::NotHeld
            }
        };

        tracing::debug!(correlation_id, key, ?outcome, "release");
        Ok(outcome)
    }

    async fn try_acquire(&self, store: &C::Store, correlation_id: &str, key: &str, ttl: Duration) -> Result<bool> {
        let acquired = store.set(key, self.token.as_bytes(), ttl, SetCondition::IfAbsent).await?;
        tracing::debug!(correlation_id, key, ?ttl, acquired, "try acquire");
        Ok(acquired)
    }
}

impl<C: Connector + Debug> Debug for DistributedLock<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedLock")
            .field("connection", &self.connection)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use tether_store::testing::{MemoryConnector, MemoryStore, StoreOp};
    use tick::ClockControl;

    use super::*;

    const TTL: Duration = Duration::from_secs(2);

    fn open_lock(store: &MemoryStore, control: &ClockControl) -> DistributedLock<MemoryConnector> {
        let mut lock = DistributedLock::new(store.connector(), control.to_clock());
        lock.configure(&Config::with_address("localhost", 6379));
        block_on(lock.open("c")).unwrap();
        lock
    }

    #[test]
    fn token_is_32_hex_characters() {
        let token = LockToken::generate();

        assert_eq!(token.as_str().len(), 32);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(token, LockToken::generate());
    }

    #[test]
    fn instances_have_distinct_tokens() {
        let control = ClockControl::new();
        let store = MemoryStore::new(control.to_clock());

        let a = open_lock(&store, &control);
        let b = open_lock(&store, &control);

        assert_ne!(a.token(), b.token());
    }

    #[test]
    fn try_acquire_writes_token_with_ttl() {
        let control = ClockControl::new();
        let store = MemoryStore::new(control.to_clock());
        let lock = open_lock(&store, &control);

        assert!(block_on(lock.try_acquire_lock("c", "k", TTL)).unwrap());

        assert_eq!(store.value_of("k"), Some(lock.token().as_str().as_bytes().to_vec()));
        assert_eq!(store.ttl_of("k"), Some(TTL));
    }

    #[test]
    fn try_acquire_does_not_reenter() {
        let control = ClockControl::new();
        let store = MemoryStore::new(control.to_clock());
        let lock = open_lock(&store, &control);

        assert!(block_on(lock.try_acquire_lock("c", "k", TTL)).unwrap());
        control.advance(Duration::from_secs(1));
        assert!(!block_on(lock.try_acquire_lock("c", "k", TTL)).unwrap());

        assert_eq!(store.ttl_of("k"), Some(Duration::from_secs(1)));
    }

    #[test]
    fn release_by_owner() {
        let control = ClockControl::new();
        let store = MemoryStore::new(control.to_clock());
        let lock = open_lock(&store, &control);
        block_on(lock.try_acquire_lock("c", "k", TTL)).unwrap();
        store.clear_operations();

        assert_eq!(block_on(lock.release_lock("c", "k")).unwrap(), ReleaseOutcome::Released);

        assert_eq!(store.value_of("k"), None);
        assert_eq!(
            store.operations(),
            vec![
                StoreOp::Watch("k".to_string()),
                StoreOp::TransactionGet("k".to_string()),
                StoreOp::Exec(Batch::new().delete("k")),
            ]
        );
    }

    #[test]
    fn release_of_foreign_lock_discards_watch() {
        let control = ClockControl::new();
        let store = MemoryStore::new(control.to_clock());
        let lock = open_lock(&store, &control);
        store.put("k", "someone-else", TTL);
        store.clear_operations();

        assert_eq!(block_on(lock.release_lock("c", "k")).unwrap(), ReleaseOutcome::NotHeld);

        assert_eq!(store.value_of("k").as_deref(), Some(&b"someone-else"[..]));
        assert_eq!(store.operations().last(), Some(&StoreOp::Discard));
    }

    #[test]
    fn release_is_idempotent() {
        let control = ClockControl::new();
        let store = MemoryStore::new(control.to_clock());
        let lock = open_lock(&store, &control);
        block_on(lock.try_acquire_lock("c", "k", TTL)).unwrap();

        assert_eq!(block_on(lock.release_lock("c", "k")).unwrap(), ReleaseOutcome::Released);
        assert_eq!(block_on(lock.release_lock("c", "k")).unwrap(), ReleaseOutcome::NotHeld);
    }

    #[test]
    fn release_rejected_when_key_changes_before_commit() {
        let control = ClockControl::new();
        let store = MemoryStore::new(control.to_clock());
        let lock = open_lock(&store, &control);
        block_on(lock.try_acquire_lock("c", "k", TTL)).unwrap();

        let intruder = store.clone();
        store.before_exec(move || intruder.put("k", "new-owner", TTL));

        assert_eq!(block_on(lock.release_lock("c", "k")).unwrap(), ReleaseOutcome::Superseded);
        assert_eq!(store.value_of("k").as_deref(), Some(&b"new-owner"[..]));
    }

    #[test]
    fn release_store_error_surfaces() {
        let control = ClockControl::new();
        let store = MemoryStore::new(control.to_clock());
        let lock = open_lock(&store, &control);
        store.fail_when(|op| matches!(op, StoreOp::Watch(_)));

        assert!(matches!(block_on(lock.release_lock("c", "k")), Err(Error::Store(_))));
    }

    #[test]
    fn ttl_below_a_millisecond_is_rejected() {
        let control = ClockControl::new();
        let store = MemoryStore::new(control.to_clock());
        let lock = open_lock(&store, &control);
        store.clear_operations();

        let error = block_on(lock.try_acquire_lock("c", "k", Duration::from_micros(500))).unwrap_err();
        assert!(matches!(error, Error::InvalidArgument { .. }));

        let error = block_on(lock.acquire_lock("c", "k", Duration::ZERO, Duration::from_secs(1))).unwrap_err();
        assert!(matches!(error, Error::InvalidArgument { .. }));

        assert!(store.operations().is_empty());
    }

    #[test]
    fn closed_lock_never_reaches_store() {
        let control = ClockControl::new();
        let store = MemoryStore::new(control.to_clock());
        let lock = DistributedLock::new(store.connector(), control.to_clock());

        assert!(matches!(
            block_on(lock.try_acquire_lock("c", "k", TTL)),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            block_on(lock.acquire_lock("c", "k", TTL, TTL)),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(block_on(lock.release_lock("c", "k")), Err(Error::InvalidState { .. })));

        assert!(store.operations().is_empty());
    }

    #[test]
    fn acquire_succeeds_immediately_when_free() {
        let control = ClockControl::new();
        let store = MemoryStore::new(control.to_clock());
        let lock = open_lock(&store, &control);

        block_on(lock.acquire_lock("c", "k", TTL, Duration::ZERO)).unwrap();

        assert_eq!(store.value_of("k"), Some(lock.token().as_str().as_bytes().to_vec()));
    }

    #[test]
    fn zero_timeout_makes_a_single_attempt() {
        let control = ClockControl::new();
        let store = MemoryStore::new(control.to_clock());
        let lock = open_lock(&store, &control);
        store.put("k", "someone-else", TTL);

        let error = block_on(lock.acquire_lock("c", "k", TTL, Duration::ZERO)).unwrap_err();

        assert!(matches!(error, Error::LockTimeout { attempts: 1, .. }));
    }
}
