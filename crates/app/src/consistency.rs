//! Consistency layer — per-key locking for mutating operations.
//!
//! Every mutation locks the keys it touches through [`KeyedLocks::acquire`],
//! which sorts them by [`LockKey`] order before locking. Two operations
//! sharing keys therefore always lock them in the same order, which rules out
//! lock-order deadlocks. Reads take no lock: each backend call is atomic per
//! key, so a reader sees either the old or the new record.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::debug;

use devreg_domain::name::{AliasName, ClassName, DeviceName, ServerName};
use devreg_domain::property::PropertyOwner;

/// Default interval between cleanup runs (1 hour).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Default max idle age before a lock is considered stale (2 hours).
pub const DEFAULT_MAX_IDLE_AGE: Duration = Duration::from_secs(7200);

/// A lockable resource. The variant order is the global lock order: export
/// record, properties, server index, device record, class record, device
/// alias, attribute alias.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Export(String),
    Property(String),
    Server(String),
    Device(String),
    Class(String),
    Alias(String),
    AttributeAlias(String),
}

impl LockKey {
    #[must_use]
    pub fn export(device: &DeviceName) -> Self {
        Self::Export(device.key().to_string())
    }

    /// Properties lock on their root owner, so a device lock covers the
    /// properties of its attributes as well.
    #[must_use]
    pub fn property(owner: &PropertyOwner) -> Self {
        Self::Property(owner.root_key())
    }

    #[must_use]
    pub fn server(server: &ServerName) -> Self {
        Self::Server(server.key().to_string())
    }

    #[must_use]
    pub fn device(device: &DeviceName) -> Self {
        Self::Device(device.key().to_string())
    }

    #[must_use]
    pub fn class(class: &ClassName) -> Self {
        Self::Class(class.key().to_string())
    }

    #[must_use]
    pub fn alias(alias: &AliasName) -> Self {
        Self::Alias(alias.key().to_string())
    }

    #[must_use]
    pub fn attribute_alias(alias: &AliasName) -> Self {
        Self::AttributeAlias(alias.key().to_string())
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Export(key) => write!(f, "export:{key}"),
            Self::Property(key) => write!(f, "property:{key}"),
            Self::Server(key) => write!(f, "server:{key}"),
            Self::Device(key) => write!(f, "device:{key}"),
            Self::Class(key) => write!(f, "class:{key}"),
            Self::Alias(key) => write!(f, "alias:{key}"),
            Self::AttributeAlias(key) => write!(f, "attribute-alias:{key}"),
        }
    }
}

/// Guards for a set of keys, released together on drop.
#[derive(Debug)]
pub struct LockSet {
    keys: Vec<LockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockSet {
    /// Keys held, in acquisition order.
    #[must_use]
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

type LockStorage = DashMap<String, (Arc<Mutex<()>>, Instant)>;

/// Per-key async mutex with automatic stale entry cleanup.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<LockStorage>,
}

impl KeyedLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the mutex of `key`, refreshing its last-access time.
    #[must_use]
    pub fn get(&self, key: &str) -> Arc<Mutex<()>> {
        let now = Instant::now();
        self.locks
            .entry(key.to_string())
            .and_modify(|(_, last_access)| *last_access = now)
            .or_insert_with(|| (Arc::new(Mutex::new(())), now))
            .0
            .clone()
    }

    /// Lock every key in global order and hold them until the returned set
    /// is dropped. Duplicate keys are locked once.
    pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> LockSet {
        let ordered: BTreeSet<LockKey> = keys.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for key in &ordered {
            guards.push(self.get(&key.to_string()).lock_owned().await);
        }
        LockSet {
            keys: ordered.into_iter().collect(),
            _guards: guards,
        }
    }

    /// Remove entries idle for longer than `max_age` that nobody holds.
    /// Returns the number of entries removed.
    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let stale_keys: Vec<_> = self
            .locks
            .iter()
            .filter(|entry| {
                let (lock, last_access) = entry.value();
                Arc::strong_count(lock) == 1 && now.duration_since(*last_access) > max_age
            })
            .map(|entry| entry.key().clone())
            .collect();

        stale_keys
            .into_iter()
            .filter(|key| {
                self.locks
                    .remove_if(key, |_, (lock, _)| Arc::strong_count(lock) == 1)
                    .is_some()
            })
            .count()
    }

    /// Spawn a background task reclaiming idle entries with the default
    /// intervals. Must be called from within a tokio runtime.
    pub fn spawn_cleanup_task(self) -> tokio::task::JoinHandle<()> {
        self.spawn_cleanup_task_with(DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_IDLE_AGE)
    }

    pub fn spawn_cleanup_task_with(
        self,
        interval: Duration,
        max_age: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.cleanup_stale(max_age);
                if removed > 0 {
                    debug!(removed, remaining = self.len(), "cleaned up stale locks");
                }
            }
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
