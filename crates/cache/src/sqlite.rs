use crate::{EdgeStore, Error, IdentifierRegistry, InfoStore, PendingStore};
use models::{CanonicalId, Info, Kind, Relation};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

// All namespaces share one database: kind / relation / list-name columns
// keep them apart. Registry and edge tables carry no expiry on purpose.
const BOOTSTRAP: &str = r#"
CREATE TABLE IF NOT EXISTS identifiers (
    kind        TEXT NOT NULL,
    identifier  TEXT NOT NULL,
    canonical   INTEGER NOT NULL,
    PRIMARY KEY (kind, identifier)
);
CREATE INDEX IF NOT EXISTS idx_identifiers_canonical
    ON identifiers (kind, canonical);
CREATE TABLE IF NOT EXISTS canonicals (
    kind        TEXT NOT NULL,
    canonical   INTEGER NOT NULL,
    PRIMARY KEY (kind, canonical)
);
CREATE TABLE IF NOT EXISTS counters (
    kind        TEXT PRIMARY KEY,
    next        INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS infos (
    kind        TEXT NOT NULL,
    canonical   INTEGER NOT NULL,
    info        TEXT NOT NULL,
    expires_at  INTEGER,
    PRIMARY KEY (kind, canonical)
);
CREATE TABLE IF NOT EXISTS pending (
    list        TEXT NOT NULL,
    parent      INTEGER NOT NULL,
    children    TEXT NOT NULL,
    expires_at  INTEGER,
    PRIMARY KEY (list, parent)
);
CREATE TABLE IF NOT EXISTS edges (
    relation    TEXT NOT NULL,
    parent      INTEGER NOT NULL,
    child       INTEGER NOT NULL,
    PRIMARY KEY (relation, parent, child)
);
"#;

/// The `external-kv` cache backend: every store persists into one SQLite
/// database. Handles are cheap clones sharing a single connection behind
/// an async mutex; the registry merge runs as one transaction, which is
/// what makes concurrent `register` calls atomic.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        Self::bootstrap(Connection::open(path)?)
    }

    /// A private, non-durable database. Useful in tests; production
    /// callers should prefer [`SqliteBackend::open`].
    pub fn open_in_memory() -> crate::Result<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> crate::Result<Self> {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_row| Ok(()))?;
        conn.execute_batch(BOOTSTRAP)?;
        tracing::debug!("bootstrapped cache database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn registry(&self, kind: Kind) -> SqliteRegistry {
        SqliteRegistry {
            conn: self.conn.clone(),
            kind,
        }
    }

    pub fn info_store(&self, kind: Kind, ttl: Option<Duration>) -> SqliteInfoStore {
        SqliteInfoStore {
            conn: self.conn.clone(),
            kind,
            ttl,
        }
    }

    pub fn pending_store(&self, list: &'static str, ttl: Option<Duration>) -> SqlitePendingStore {
        SqlitePendingStore {
            conn: self.conn.clone(),
            list,
            ttl,
        }
    }

    pub fn edge_store(&self, relation: Relation) -> SqliteEdgeStore {
        SqliteEdgeStore {
            conn: self.conn.clone(),
            relation,
        }
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_millis() as i64
}

pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
    kind: Kind,
}

#[async_trait::async_trait]
impl IdentifierRegistry for SqliteRegistry {
    async fn canonical_of(
        &self,
        identifiers: &BTreeSet<String>,
    ) -> crate::Result<Option<CanonicalId>> {
        if identifiers.is_empty() {
            return Err(Error::EmptyIdentifiers);
        }
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare_cached("SELECT canonical FROM identifiers WHERE kind = ?1 AND identifier = ?2")?;
        for ident in identifiers {
            let found: Option<i64> = stmt
                .query_row(params![self.kind.as_str(), ident], |row| row.get(0))
                .optional()?;
            if let Some(canonical) = found {
                return Ok(Some(CanonicalId::from_i64(canonical)));
            }
        }
        Ok(None)
    }

    async fn register(&self, identifiers: &BTreeSet<String>) -> crate::Result<CanonicalId> {
        if identifiers.is_empty() {
            return Err(Error::EmptyIdentifiers);
        }
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let canonical = register_in_tx(&tx, self.kind, identifiers)?;
        tx.commit()?;
        Ok(canonical)
    }

    async fn aliases_of(&self, canonical: CanonicalId) -> crate::Result<BTreeSet<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare_cached("SELECT identifier FROM identifiers WHERE kind = ?1 AND canonical = ?2")?;
        let rows = stmt.query_map(params![self.kind.as_str(), canonical.as_i64()], |row| {
            row.get::<_, String>(0)
        })?;
        let mut aliases = BTreeSet::new();
        for row in rows {
            aliases.insert(row?);
        }
        Ok(aliases)
    }

    async fn enumerate(&self) -> crate::Result<Vec<CanonicalId>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT canonical FROM canonicals WHERE kind = ?1 ORDER BY canonical",
        )?;
        let rows = stmt.query_map(params![self.kind.as_str()], |row| row.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(CanonicalId::from_i64(row?));
        }
        Ok(out)
    }
}

fn register_in_tx(
    tx: &rusqlite::Transaction<'_>,
    kind: Kind,
    identifiers: &BTreeSet<String>,
) -> crate::Result<CanonicalId> {
    let kind = kind.as_str();

    let mut existing: BTreeSet<i64> = BTreeSet::new();
    {
        let mut stmt = tx
            .prepare_cached("SELECT canonical FROM identifiers WHERE kind = ?1 AND identifier = ?2")?;
        for ident in identifiers {
            let found: Option<i64> = stmt
                .query_row(params![kind, ident], |row| row.get(0))
                .optional()?;
            if let Some(canonical) = found {
                existing.insert(canonical);
            }
        }
    }

    let Some(&primary) = existing.iter().next() else {
        // Mint a fresh canonical from the per-kind counter.
        tx.execute(
            "INSERT INTO counters (kind, next) VALUES (?1, 0) ON CONFLICT (kind) DO NOTHING",
            params![kind],
        )?;
        tx.execute("UPDATE counters SET next = next + 1 WHERE kind = ?1", params![kind])?;
        let next: i64 =
            tx.query_row("SELECT next FROM counters WHERE kind = ?1", params![kind], |row| {
                row.get(0)
            })?;

        tx.execute(
            "INSERT INTO canonicals (kind, canonical) VALUES (?1, ?2)",
            params![kind, next],
        )?;
        let mut stmt = tx.prepare_cached(
            "INSERT OR REPLACE INTO identifiers (kind, identifier, canonical) VALUES (?1, ?2, ?3)",
        )?;
        for ident in identifiers {
            stmt.execute(params![kind, ident, next])?;
        }
        return Ok(CanonicalId::from_i64(next));
    };

    // Union every overlapped class under the primary canonical.
    let mut all = identifiers.clone();
    {
        let mut stmt = tx
            .prepare_cached("SELECT identifier FROM identifiers WHERE kind = ?1 AND canonical = ?2")?;
        for canonical in &existing {
            let rows = stmt.query_map(params![kind, canonical], |row| row.get::<_, String>(0))?;
            for row in rows {
                all.insert(row?);
            }
        }
    }
    {
        let mut stmt = tx.prepare_cached(
            "INSERT OR REPLACE INTO identifiers (kind, identifier, canonical) VALUES (?1, ?2, ?3)",
        )?;
        for ident in &all {
            stmt.execute(params![kind, ident, primary])?;
        }
    }
    for canonical in &existing {
        if *canonical != primary {
            tx.execute(
                "DELETE FROM canonicals WHERE kind = ?1 AND canonical = ?2",
                params![kind, canonical],
            )?;
        }
    }
    Ok(CanonicalId::from_i64(primary))
}

pub struct SqliteInfoStore {
    conn: Arc<Mutex<Connection>>,
    kind: Kind,
    ttl: Option<Duration>,
}

#[async_trait::async_trait]
impl InfoStore for SqliteInfoStore {
    async fn get(&self, canonical: CanonicalId) -> crate::Result<Option<Info>> {
        let conn = self.conn.lock().await;
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT info, expires_at FROM infos WHERE kind = ?1 AND canonical = ?2",
                params![self.kind.as_str(), canonical.as_i64()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((raw, expires_at)) = row else {
            return Ok(None);
        };
        if matches!(expires_at, Some(at) if at <= unix_millis()) {
            conn.execute(
                "DELETE FROM infos WHERE kind = ?1 AND canonical = ?2",
                params![self.kind.as_str(), canonical.as_i64()],
            )?;
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn set(&self, canonical: CanonicalId, info: &Info) -> crate::Result<()> {
        let expires_at = self.ttl.map(|ttl| unix_millis() + ttl.as_millis() as i64);
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO infos (kind, canonical, info, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                self.kind.as_str(),
                canonical.as_i64(),
                serde_json::to_string(info)?,
                expires_at
            ],
        )?;
        Ok(())
    }
}

pub struct SqlitePendingStore {
    conn: Arc<Mutex<Connection>>,
    list: &'static str,
    ttl: Option<Duration>,
}

#[async_trait::async_trait]
impl PendingStore for SqlitePendingStore {
    async fn get(&self, parent: CanonicalId) -> crate::Result<Option<Vec<BTreeSet<String>>>> {
        let conn = self.conn.lock().await;
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT children, expires_at FROM pending WHERE list = ?1 AND parent = ?2",
                params![self.list, parent.as_i64()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((raw, expires_at)) = row else {
            return Ok(None);
        };
        if matches!(expires_at, Some(at) if at <= unix_millis()) {
            conn.execute(
                "DELETE FROM pending WHERE list = ?1 AND parent = ?2",
                params![self.list, parent.as_i64()],
            )?;
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn set(&self, parent: CanonicalId, children: &[BTreeSet<String>]) -> crate::Result<()> {
        let expires_at = self.ttl.map(|ttl| unix_millis() + ttl.as_millis() as i64);
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO pending (list, parent, children, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                self.list,
                parent.as_i64(),
                serde_json::to_string(children)?,
                expires_at
            ],
        )?;
        Ok(())
    }
}

pub struct SqliteEdgeStore {
    conn: Arc<Mutex<Connection>>,
    relation: Relation,
}

#[async_trait::async_trait]
impl EdgeStore for SqliteEdgeStore {
    async fn contains(&self, parent: CanonicalId, child: CanonicalId) -> crate::Result<bool> {
        let conn = self.conn.lock().await;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM edges WHERE relation = ?1 AND parent = ?2 AND child = ?3",
                params![self.relation.as_str(), parent.as_i64(), child.as_i64()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn insert(&self, parent: CanonicalId, child: CanonicalId) -> crate::Result<bool> {
        let conn = self.conn.lock().await;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO edges (relation, parent, child) VALUES (?1, ?2, ?3)",
            params![self.relation.as_str(), parent.as_i64(), child.as_i64()],
        )?;
        Ok(inserted > 0)
    }
}
