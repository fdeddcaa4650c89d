//! Device key-value persistence: the [`KeyValue`] capability the core reads
//! and writes through, and the stores a Rust shell answers it with.

use async_trait::async_trait;
use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::{AppError, ErrorKind};

pub const MAX_VALUE_SIZE: usize = 1024 * 1024;

/// The closed set of things the client persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKey {
    AuthToken,
    CachedUser,
    RememberedIdentity,
    ThemeMode,
}

impl StoreKey {
    pub const ALL: [StoreKey; 4] = [
        StoreKey::AuthToken,
        StoreKey::CachedUser,
        StoreKey::RememberedIdentity,
        StoreKey::ThemeMode,
    ];

    /// Key under which the value is written; shared with the native shells.
    pub fn raw(self) -> &'static str {
        match self {
            StoreKey::AuthToken => "@sala_auth_token",
            StoreKey::CachedUser => "@sala_user_info",
            StoreKey::RememberedIdentity => "@sala_remembered_identity",
            StoreKey::ThemeMode => "@sala_theme_mode",
        }
    }

}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}

#[derive(Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreError {
    #[error("storage backend error: {message}")]
    Backend { message: String },

    #[error("value too large for {key}: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { key: StoreKey, size: usize, max: usize },

    #[error("lock poisoned")]
    LockFailed,
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::new(ErrorKind::Storage, "Stockage local indisponible").with_internal(e.to_string())
    }
}

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend {
            message: e.to_string(),
        }
    }
}

fn check_size(key: StoreKey, value: &str) -> Result<(), StoreError> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(StoreError::ValueTooLarge {
            key,
            size: value.len(),
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

/// One round-trip to the device store.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KvOperation {
    Read { keys: Vec<StoreKey> },
    /// All-or-nothing where the backend allows it.
    Write { entries: Vec<(StoreKey, String)> },
    Delete { keys: Vec<StoreKey> },
}

impl KvOperation {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Delete { .. } => "delete",
        }
    }

    pub fn keys(&self) -> Vec<StoreKey> {
        match self {
            Self::Read { keys } | Self::Delete { keys } => keys.clone(),
            Self::Write { entries } => entries.iter().map(|(key, _)| *key).collect(),
        }
    }
}

// Values include the bearer token.
impl fmt::Debug for KvOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvOperation")
            .field("op", &self.name())
            .field("keys", &self.keys())
            .finish()
    }
}

/// Values found by a read; empty after a write or delete.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct KvOutput {
    pub values: Vec<(StoreKey, String)>,
}

impl KvOutput {
    pub fn get(&self, key: StoreKey) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for KvOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<StoreKey> = self.values.iter().map(|(k, _)| *k).collect();
        f.debug_struct("KvOutput").field("keys", &keys).finish()
    }
}

pub type KvResult = Result<KvOutput, StoreError>;

impl Operation for KvOperation {
    type Output = KvResult;
}

#[derive(Capability)]
pub struct KeyValue<Ev> {
    context: CapabilityContext<KvOperation, Ev>,
}

impl<Ev> KeyValue<Ev> {
    pub fn new(context: CapabilityContext<KvOperation, Ev>) -> Self {
        Self { context }
    }
}

impl<Ev> KeyValue<Ev>
where
    Ev: Send + 'static,
{
    pub fn perform<F>(&self, operation: KvOperation, make_event: F)
    where
        F: FnOnce(KvResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context.request_from_shell(operation).await;
            context.update_app(make_event(result));
        });
    }
}

/// Opaque string key-value persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: StoreKey) -> Result<(), StoreError>;

    /// Writes every entry before returning. Backends that can should make
    /// this all-or-nothing.
    async fn set_many(&self, entries: &[(StoreKey, String)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(*key, value).await?;
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[StoreKey]) -> Result<(), StoreError> {
        for key in keys {
            self.remove(*key).await?;
        }
        Ok(())
    }

    /// Answers a [`KvOperation`] the core sent out.
    async fn execute(&self, operation: KvOperation) -> KvResult {
        match operation {
            KvOperation::Read { keys } => {
                let mut values = Vec::with_capacity(keys.len());
                for key in keys {
                    if let Some(value) = self.get(key).await? {
                        values.push((key, value));
                    }
                }
                Ok(KvOutput { values })
            }
            KvOperation::Write { entries } => {
                self.set_many(&entries).await?;
                Ok(KvOutput::default())
            }
            KvOperation::Delete { keys } => {
                self.remove_many(&keys).await?;
                Ok(KvOutput::default())
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<StoreKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        check_size(key, value)?;
        self.entries.write().await.insert(key, value.to_string());
        Ok(())
    }

    async fn remove(&self, key: StoreKey) -> Result<(), StoreError> {
        self.entries.write().await.remove(&key);
        Ok(())
    }

    async fn set_many(&self, entries: &[(StoreKey, String)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            check_size(*key, value)?;
        }
        // Single lock scope: readers never see half of the pair.
        let mut map = self.entries.write().await;
        for (key, value) in entries {
            map.insert(*key, value.clone());
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[StoreKey]) -> Result<(), StoreError> {
        let mut map = self.entries.write().await;
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }
}

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
pub use self::sqlite::SqliteStore;

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
mod sqlite {
    use super::{check_size, SessionStore, StoreError, StoreKey};
    use async_trait::async_trait;
    use rusqlite::{params, Connection, OptionalExtension};
    use std::path::Path;
    use std::sync::{Mutex, MutexGuard};

    /// SQLite-based persistent storage with proper transactions
    pub struct SqliteStore {
        conn: Mutex<Connection>,
    }

    impl SqliteStore {
        pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
            Self::init(Connection::open(path)?)
        }

        pub fn open_in_memory() -> Result<Self, StoreError> {
            Self::init(Connection::open_in_memory()?)
        }

        fn init(conn: Connection) -> Result<Self, StoreError> {
            conn.execute_batch(
                r"
                CREATE TABLE IF NOT EXISTS kv (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                ",
            )?;
            Ok(Self {
                conn: Mutex::new(conn),
            })
        }

        fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
            self.conn.lock().map_err(|_| StoreError::LockFailed)
        }

        fn upsert(conn: &Connection, key: StoreKey, value: &str) -> Result<(), StoreError> {
            conn.execute(
                r"
                INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                ",
                params![
                    key.raw(),
                    value,
                    i64::try_from(crate::current_time_ms()).unwrap_or(i64::MAX)
                ],
            )?;
            Ok(())
        }
    }

    #[async_trait]
    impl SessionStore for SqliteStore {
        async fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
            let conn = self.lock()?;
            let value = conn
                .query_row(
                    "SELECT value FROM kv WHERE key = ?1",
                    params![key.raw()],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(value)
        }

        async fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
            check_size(key, value)?;
            let conn = self.lock()?;
            Self::upsert(&conn, key, value)
        }

        async fn remove(&self, key: StoreKey) -> Result<(), StoreError> {
            let conn = self.lock()?;
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key.raw()])?;
            Ok(())
        }

        async fn set_many(&self, entries: &[(StoreKey, String)]) -> Result<(), StoreError> {
            for (key, value) in entries {
                check_size(*key, value)?;
            }
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            for (key, value) in entries {
                Self::upsert(&tx, *key, value)?;
            }
            tx.commit()?;
            Ok(())
        }

        async fn remove_many(&self, keys: &[StoreKey]) -> Result<(), StoreError> {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            for key in keys {
                tx.execute("DELETE FROM kv WHERE key = ?1", params![key.raw()])?;
            }
            tx.commit()?;
            Ok(())
        }
    }
}
