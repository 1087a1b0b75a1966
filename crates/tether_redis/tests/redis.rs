// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tests against a live Redis server.
//!
//! Skipped unless `TETHER_REDIS_URL` names a server, for example
//! `redis://127.0.0.1:6379/15`. The tests write keys with a random prefix and a
//! short expiry.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tether_redis::{RedisConnector, RedisStore};
use tether_store::{Batch, CommitOutcome, ConnectionSettings, Connector, Endpoint, SetCondition, Store, Transaction};

const TTL: Duration = Duration::from_secs(30);

async fn connect() -> Option<RedisStore> {
    let url = std::env::var("TETHER_REDIS_URL").ok()?;
    let settings = ConnectionSettings::new(Endpoint::Uri(url)).with_connect_timeout(Duration::from_secs(5));
    Some(RedisConnector::new().connect(&settings).await.unwrap())
}

fn unique_key(name: &str) -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    format!("tether-test:{nanos}:{name}")
}

#[tokio::test]
async fn set_get_delete() {
    let Some(store) = connect().await else { return };
    let key = unique_key("plain");

    assert!(store.set(&key, b"value", TTL, SetCondition::Always).await.unwrap());
    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some(&b"value"[..]));

    assert!(store.delete(&key).await.unwrap());
    assert!(!store.delete(&key).await.unwrap());
    assert_eq!(store.get(&key).await.unwrap(), None);

    store.close().await.unwrap();
}

#[tokio::test]
async fn values_expire() {
    let Some(store) = connect().await else { return };
    let key = unique_key("expiring");

    store.set(&key, b"short", Duration::from_millis(50), SetCondition::Always).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn conditional_set() {
    let Some(store) = connect().await else { return };
    let key = unique_key("conditional");

    assert!(!store.set(&key, b"x", TTL, SetCondition::IfPresent).await.unwrap());
    assert!(store.set(&key, b"first", TTL, SetCondition::IfAbsent).await.unwrap());
    assert!(!store.set(&key, b"second", TTL, SetCondition::IfAbsent).await.unwrap());
    assert!(store.set(&key, b"third", TTL, SetCondition::IfPresent).await.unwrap());

    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some(&b"third"[..]));
    store.delete(&key).await.unwrap();
}

#[tokio::test]
async fn transaction_commits_when_untouched() {
    let Some(store) = connect().await else { return };
    let key = unique_key("commit");
    store.set(&key, b"token", TTL, SetCondition::Always).await.unwrap();

    let mut tx = store.watch(&key).await.unwrap();
    assert_eq!(tx.get(&key).await.unwrap().as_deref(), Some(&b"token"[..]));
    assert_eq!(tx.exec(Batch::new().delete(key.as_str())).await.unwrap(), CommitOutcome::Committed);

    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn transaction_rejected_after_concurrent_write() {
    let Some(store) = connect().await else { return };
    let Some(other) = connect().await else { return };
    let key = unique_key("reject");
    store.set(&key, b"mine", TTL, SetCondition::Always).await.unwrap();

    let mut tx = store.watch(&key).await.unwrap();
    assert_eq!(tx.get(&key).await.unwrap().as_deref(), Some(&b"mine"[..]));

    other.set(&key, b"theirs", TTL, SetCondition::Always).await.unwrap();

    assert_eq!(tx.exec(Batch::new().delete(key.as_str())).await.unwrap(), CommitOutcome::Rejected);
    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some(&b"theirs"[..]));

    store.delete(&key).await.unwrap();
}

#[tokio::test]
async fn discard_clears_watch() {
    let Some(store) = connect().await else { return };
    let Some(other) = connect().await else { return };
    let key = unique_key("discard");
    store.set(&key, b"mine", TTL, SetCondition::Always).await.unwrap();

    let tx = store.watch(&key).await.unwrap();
    tx.discard().await.unwrap();

    other.set(&key, b"theirs", TTL, SetCondition::Always).await.unwrap();

    // The discarded watch must not affect a later transaction on another key.
    let second = unique_key("discard-second");
    store.set(&second, b"v", TTL, SetCondition::Always).await.unwrap();
    let tx = store.watch(&second).await.unwrap();
    assert_eq!(tx.exec(Batch::new().delete(second.as_str())).await.unwrap(), CommitOutcome::Committed);

    store.delete(&key).await.unwrap();
}

// One store serves all tasks: plain commands queue behind the connection lock, and
// a transaction keeps it from WATCH until EXEC, so no task's watch leaks into
// another task's commit.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_store_serves_concurrent_callers() {
    let Some(store) = connect().await else { return };
    let store = Arc::new(store);
    let prefix = unique_key("shared");

    let handles: Vec<_> = (0..32)
        .map(|task| {
            let store = Arc::clone(&store);
            let key = format!("{prefix}:{task}");
            tokio::spawn(async move {
                let value = format!("value-{task}").into_bytes();

                for _ in 0..5 {
                    assert!(store.set(&key, &value, TTL, SetCondition::Always).await.unwrap());
                    assert_eq!(store.get(&key).await.unwrap(), Some(value.clone()));
                }

                let mut tx = store.watch(&key).await.unwrap();
                assert_eq!(tx.get(&key).await.unwrap(), Some(value.clone()));
                let outcome = tx.exec(Batch::new().delete(key.as_str())).await.unwrap();

                (outcome, store.get(&key).await.unwrap())
            })
        })
        .collect();

    for handle in handles {
        let (outcome, after) = handle.await.unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);
        assert_eq!(after, None);
    }
}
