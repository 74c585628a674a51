use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Response cache behind a [`crate::Pool`]. Implementations may expire
/// entries; an expired entry reads as absent.
#[async_trait::async_trait]
pub trait FetchCache<T>: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<T>>;
    async fn set(&self, key: &str, value: &T) -> anyhow::Result<()>;
}

/// In-process response cache with optional expiry.
pub struct MemoryFetchCache<T> {
    ttl: Option<Duration>,
    entries: Mutex<HashMap<String, (T, Option<Instant>)>>,
}

impl<T> MemoryFetchCache<T> {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl<T: Clone + Send + Sync> FetchCache<T> for MemoryFetchCache<T> {
    async fn get(&self, key: &str) -> anyhow::Result<Option<T>> {
        let mut entries = self.entries.lock().unwrap();
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some((_, Some(expires))) => *expires <= Instant::now(),
            Some((_, None)) => false,
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let expires = self.ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.clone(), expires));
        Ok(())
    }
}

/// Durable response cache: raw responses persisted as JSON rows so they
/// survive restarts of a long weave.
pub struct SqliteFetchCache<T> {
    conn: Arc<tokio::sync::Mutex<Connection>>,
    ttl: Option<Duration>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SqliteFetchCache<T> {
    pub fn open<P: AsRef<Path>>(path: P, ttl: Option<Duration>) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("failed to open fetch cache database")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS fetches (
                key         TEXT PRIMARY KEY,
                value       TEXT NOT NULL,
                expires_at  INTEGER
            );
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(tokio::sync::Mutex::new(conn)),
            ttl,
            _marker: PhantomData,
        })
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_millis() as i64
}

#[async_trait::async_trait]
impl<T> FetchCache<T> for SqliteFetchCache<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync,
{
    async fn get(&self, key: &str) -> anyhow::Result<Option<T>> {
        let conn = self.conn.lock().await;
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT value, expires_at FROM fetches WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((raw, expires_at)) = row else {
            return Ok(None);
        };
        if matches!(expires_at, Some(at) if at <= unix_millis()) {
            conn.execute("DELETE FROM fetches WHERE key = ?1", params![key])?;
            return Ok(None);
        }
        let value = serde_json::from_str(&raw).context("failed to decode cached response")?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let expires_at = self.ttl.map(|ttl| unix_millis() + ttl.as_millis() as i64);
        let raw = serde_json::to_string(value).context("failed to encode response")?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO fetches (key, value, expires_at) VALUES (?1, ?2, ?3)",
            params![key, raw, expires_at],
        )?;
        Ok(())
    }
}
