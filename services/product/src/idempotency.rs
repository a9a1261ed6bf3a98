//! Idempotency key store.
//!
//! # Contract
//! A plain TTL'd key-value store with SetNX semantics. The reservation use
//! case locks a key with the marker value `processing`, then replaces it
//! with the reservation id on success or deletes it on failure. `get`
//! returning `None` means the key is unknown or expired.
//!
//! # Backends
//! Redis in production (`SET NX PX` / `SET PX` / `GET` / `DEL`, each a
//! single atomic command), an in-memory map for tests, and a no-op store
//! for deployments without Redis where every lookup is a miss and every
//! lock trivially succeeds: idempotency off, reservations still correct.
use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::domain::DomainError;

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Set `key` to `value` only if absent. Returns true when the lock was
    /// acquired.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, DomainError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError>;

    async fn del(&self, key: &str) -> Result<(), DomainError>;
}

pub struct RedisIdempotencyStore {
    conn: redis::aio::ConnectionManager,
    prefix: String,
}

impl RedisIdempotencyStore {
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, DomainError> {
        let client = redis::Client::open(url).map_err(|e| anyhow!(e))?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| anyhow!(e))?;
        let prefix = if prefix.is_empty() {
            "product:idempotency:".to_string()
        } else {
            prefix.to_string()
        };
        Ok(Self { conn, prefix })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.key(key)).await.map_err(|e| anyhow!(e))?;
        Ok(value)
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, DomainError> {
        let mut conn = self.conn.clone();
        // SET key value NX PX ttl: nil reply means the key already existed.
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(reply.is_some())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(self.key(key), value, ttl.as_secs().max(1))
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.key(key)).await.map_err(|e| anyhow!(e))?;
        Ok(())
    }
}

/// In-memory implementation with real TTL behavior, for tests.
#[derive(Default)]
pub struct MemoryIdempotencyStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, DomainError> {
        let mut entries = self.entries.lock().await;
        let live = entries
            .get(key)
            .is_some_and(|(_, expires)| *expires > Instant::now());
        if live {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), DomainError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Disabled idempotency: every lock succeeds, every lookup misses.
pub struct NoopIdempotencyStore;

#[async_trait]
impl IdempotencyStore for NoopIdempotencyStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, DomainError> {
        Ok(None)
    }

    async fn set_nx(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool, DomainError> {
        Ok(true)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), DomainError> {
        Ok(())
    }

    async fn del(&self, _key: &str) -> Result<(), DomainError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_locks_until_expiry() {
        let store = MemoryIdempotencyStore::new();
        assert!(store.set_nx("k", "processing", Duration::from_millis(30)).await.unwrap());
        assert!(!store.set_nx("k", "other", Duration::from_millis(30)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("processing"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_nx("k", "again", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn set_overwrites_and_del_removes() {
        let store = MemoryIdempotencyStore::new();
        store.set("k", "v1", Duration::from_secs(60)).await.unwrap();
        store.set("k", "v2", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn noop_store_always_misses_and_always_locks() {
        let store = NoopIdempotencyStore;
        assert!(store.set_nx("k", "v", Duration::from_secs(1)).await.unwrap());
        assert!(store.set_nx("k", "v", Duration::from_secs(1)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
