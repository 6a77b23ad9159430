//! Backing store clients
//!
//! The cache service talks to a Redis-compatible key-value store through the
//! [`KeyValueStore`] trait. Two implementations are provided:
//!
//! - [`RedisStore`]: production client with lazy connection establishment,
//!   a connect-in-progress gate, and bounded connect retry
//! - [`MemoryStore`]: in-process store with the same contract, used by tests
//!   and local development
//!
//! Values are serialized text and TTLs are whole seconds. Implementations
//! must propagate every store-level error; no call silently swallows a
//! failure.

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Configuration for the Redis-backed store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Maximum number of connection attempts before giving up
    pub max_connect_attempts: u32,
    /// Delay between connection attempts
    pub connect_retry_delay: Duration,
    /// Poll interval while another caller is establishing the connection
    pub connect_poll_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            max_connect_attempts: 3,
            connect_retry_delay: Duration::from_millis(500),
            connect_poll_interval: Duration::from_millis(100),
        }
    }
}

impl StoreConfig {
    /// Load configuration from the environment (`REDIS_URL`)
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            ..Default::default()
        }
    }
}

/// Contract for the remote key-value store underlying the cache
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value; `None` is a genuine miss, not an error
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value without expiry
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Store a value that expires after `ttl_seconds`
    async fn set_with_expiry(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;

    /// Store a value only if the key is absent; returns whether it was stored
    async fn set_if_absent(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// List keys matching a glob-style pattern (`*` and `?`)
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>>;

    /// Round-trip liveness probe
    async fn ping(&self) -> Result<()>;
}

/// Redis-backed store client
///
/// The connection is established lazily on first use and cached as a shared
/// handle. Concurrent callers during establishment wait on a poll instead of
/// opening their own connections; a connect-in-progress flag gates duplicate
/// attempts. Connection setup retries up to `max_connect_attempts` with a
/// fixed delay before failing with a connectivity error.
pub struct RedisStore {
    client: redis::Client,
    conn: RwLock<Option<MultiplexedConnection>>,
    connecting: AtomicBool,
    config: StoreConfig,
}

impl RedisStore {
    /// Create a client; no connection is opened until the first operation
    pub fn new(config: StoreConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| CacheError::Config(format!("invalid store URL: {}", e)))?;

        Ok(Self {
            client,
            conn: RwLock::new(None),
            connecting: AtomicBool::new(false),
            config,
        })
    }

    /// Create a client configured from the environment
    pub fn from_env() -> Result<Self> {
        Self::new(StoreConfig::from_env())
    }

    /// Get the shared connection, establishing it on first use
    async fn connection(&self) -> Result<MultiplexedConnection> {
        loop {
            if let Some(conn) = self.conn.read().await.as_ref() {
                return Ok(conn.clone());
            }

            if self
                .connecting
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let result = self.establish().await;
                self.connecting.store(false, Ordering::SeqCst);
                return result;
            }

            // Another caller is establishing the connection; wait for it
            tokio::time::sleep(self.config.connect_poll_interval).await;
        }
    }

    async fn establish(&self) -> Result<MultiplexedConnection> {
        let mut attempt = 1;
        loop {
            info!(
                "Connecting to backing store at {} (attempt {}/{})",
                self.config.url, attempt, self.config.max_connect_attempts
            );

            match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => {
                    info!("Backing store connection established");
                    *self.conn.write().await = Some(conn.clone());
                    return Ok(conn);
                }
                Err(e) if attempt < self.config.max_connect_attempts => {
                    warn!(
                        "Store connection failed (attempt {}/{}), retrying after {:?}: {}",
                        attempt, self.config.max_connect_attempts, self.config.connect_retry_delay, e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.connect_retry_delay).await;
                }
                Err(e) => {
                    return Err(CacheError::Connection(format!(
                        "store unreachable after {} attempts: {}",
                        self.config.max_connect_attempts, e
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(key, value, ttl_seconds).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(keys.to_vec()).await?;
        Ok(removed)
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// In-memory store with the backing-store contract
///
/// Entries expire passively on read, mirroring the remote store's TTL
/// behavior. Used by tests and local development; not bounded in size.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live (unexpired) entries
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                debug!("Entry expired: {}", key);
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_seconds)),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let alive = entries.get(key).map(|e| !e.is_expired()).unwrap_or(false);
        if alive {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: (ttl_seconds > 0)
                    .then(|| Instant::now() + Duration::from_secs(ttl_seconds)),
            },
        );
        Ok(true)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if !entry.is_expired() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired() && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Match `text` against the `*`/`?` subset of KEYS-style glob patterns
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
