// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use tether_store::{Batch, Command, CommitOutcome, Error, Result, SetCondition, Store, Transaction};
use tokio::sync::{Mutex, MutexGuard};

/// A [`Store`] backed by a single multiplexed Redis connection.
///
/// Created by [`RedisConnector`](crate::RedisConnector).
pub struct RedisStore {
    inner: Mutex<Inner>,
}

struct Inner {
    connection: MultiplexedConnection,

    // Set between WATCH and EXEC/UNWATCH. A transaction that failed midway leaves
    // this set so the next one clears the stale watch first.
    watching: bool,
}

impl RedisStore {
    pub(crate) fn new(connection: MultiplexedConnection) -> Self {
        Self {
            inner: Mutex::new(Inner {
                connection,
                watching: false,
            }),
        }
    }
}

impl Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

impl Store for RedisStore {
    type Transaction<'a> = RedisTransaction<'a>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock().await;
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut inner.connection)
            .await
            .map_err(Error::from_message)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration, condition: SetCondition) -> Result<bool> {
        let mut command = redis::cmd("SET");
        command.arg(key).arg(value).arg("PX").arg(ttl_millis(ttl));

        match condition {
            SetCondition::Always => {}
            SetCondition::IfAbsent => {
                command.arg("NX");
            }
            SetCondition::IfPresent => {
                command.arg("XX");
            }
        }

        let mut inner = self.inner.lock().await;
        let reply: Option<String> = command.query_async(&mut inner.connection).await.map_err(Error::from_message)?;

        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut inner.connection)
            .await
            .map_err(Error::from_message)?;

        Ok(removed > 0)
    }

    async fn watch(&self, key: &str) -> Result<RedisTransaction<'_>> {
        let mut inner = self.inner.lock().await;

        if inner.watching {
            tracing::debug!("clearing watch left by an unfinished transaction");
            redis::cmd("UNWATCH")
                .query_async::<()>(&mut inner.connection)
                .await
                .map_err(Error::from_message)?;
            inner.watching = false;
        }

        redis::cmd("WATCH")
            .arg(key)
            .query_async::<()>(&mut inner.connection)
            .await
            .map_err(Error::from_message)?;
        inner.watching = true;

        Ok(RedisTransaction { inner })
    }

    async fn close(self) -> Result<()> {
        drop(self.inner.into_inner());
        Ok(())
    }
}

/// An optimistic Redis transaction.
///
/// Holds exclusive use of the store's connection from `WATCH` until the transaction
/// is committed or discarded.
pub struct RedisTransaction<'a> {
    inner: MutexGuard<'a, Inner>,
}

impl Debug for RedisTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisTransaction").finish_non_exhaustive()
    }
}

impl Transaction for RedisTransaction<'_> {
    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.inner.connection)
            .await
            .map_err(Error::from_message)
    }

    async fn exec(mut self, batch: Batch) -> Result<CommitOutcome> {
        let connection = &mut self.inner.connection;

        // An empty pipeline is answered locally, so an empty batch needs an explicit
        // MULTI/EXEC to still be checked against the watch.
        let reply: Option<Vec<redis::Value>> = if batch.is_empty() {
            redis::cmd("MULTI")
                .query_async::<()>(connection)
                .await
                .map_err(Error::from_message)?;
            redis::cmd("EXEC").query_async(connection).await.map_err(Error::from_message)?
        } else {
            pipeline_for(batch)
                .query_async(connection)
                .await
                .map_err(Error::from_message)?
        };

        // EXEC always ends the watch, committed or not.
        self.inner.watching = false;

        Ok(match reply {
            Some(_) => CommitOutcome::Committed,
            None => CommitOutcome::Rejected,
        })
    }

    async fn discard(mut self) -> Result<()> {
        redis::cmd("UNWATCH")
            .query_async::<()>(&mut self.inner.connection)
            .await
            .map_err(Error::from_message)?;
        self.inner.watching = false;
        Ok(())
    }
}

fn pipeline_for(batch: Batch) -> redis::Pipeline {
    let mut pipeline = redis::pipe();
    pipeline.atomic();
    for command in batch {
        match command {
            Command::Delete(key) => {
                pipeline.cmd("DEL").arg(key);
            }
        }
    }
    pipeline
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(RedisStore: Send, Sync, Debug);
    assert_impl_all!(RedisTransaction<'static>: Send, Debug);

    #[test]
    fn ttl_is_rendered_in_millis() {
        assert_eq!(ttl_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(ttl_millis(Duration::from_micros(999)), 0);
        assert_eq!(ttl_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn batch_becomes_atomic_pipeline() {
        let packed = pipeline_for(Batch::new().delete("lock:a").delete("lock:b")).get_packed_pipeline();
        let text = String::from_utf8_lossy(&packed);

        assert!(text.starts_with("*1\r\n$5\r\nMULTI\r\n"));
        assert!(text.contains("$3\r\nDEL\r\n$6\r\nlock:a\r\n"));
        assert!(text.contains("$3\r\nDEL\r\n$6\r\nlock:b\r\n"));
        assert!(text.ends_with("*1\r\n$4\r\nEXEC\r\n"));
    }
}
