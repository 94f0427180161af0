//! In-memory key-value backend
//!
//! Keys live in a `DashMap` and carry an optional expiry instant. Expired
//! keys are treated as absent by every operation, removed lazily when
//! touched, and swept by a background task spawned on the current Tokio
//! runtime.
//!
//! `insert_if_absent` and `read_and_mutate` run under the key's shard lock,
//! so reservation and read-decide-mutate are atomic with respect to every
//! other operation on the same key.

use super::engine::{FieldMap, FieldMutation, KeyValueBackend, MutationFn};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::metrics::EXPIRED_KEYS;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Expiries are capped at ~100 years to keep `Instant` arithmetic in range
const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

fn expiry_after(seconds: u64) -> Instant {
    Instant::now() + Duration::from_secs(seconds.min(MAX_TTL_SECONDS))
}

/// Field map stored under one key
#[derive(Debug, Clone)]
struct KeyEntry {
    fields: FieldMap,
    expires_at: Option<Instant>,
}

impl KeyEntry {
    fn new(fields: FieldMap) -> Self {
        Self {
            fields,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

fn parse_counter(key: &str, field: &str, value: Option<&String>) -> Result<i64> {
    match value {
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            Error::Backend(format!(
                "field '{}' of key '{}' is not an integer",
                field, key
            ))
        }),
        None => Ok(0),
    }
}

fn apply_delta(key: &str, field: &str, fields: &mut FieldMap, delta: i64) -> Result<i64> {
    let current = parse_counter(key, field, fields.get(field))?;
    let updated = current
        .checked_add(delta)
        .ok_or_else(|| Error::Backend(format!("increment of '{}' would overflow", field)))?;
    fields.insert(field.to_string(), updated.to_string());
    Ok(updated)
}

struct MemoryInner {
    data: DashMap<String, KeyEntry>,
    /// Dropping the sender (last backend handle gone) also stops the reaper
    shutdown_tx: watch::Sender<bool>,
}

/// Thread-safe in-memory backend with per-key TTL
///
/// Cloning is cheap and every clone shares the same data.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("keys", &self.inner.data.len())
            .finish()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a backend sweeping expired keys every 60 seconds
    pub fn new() -> Self {
        Self::with_cleanup_interval(Duration::from_secs(60))
    }

    /// Create a backend using the store configuration's cleanup interval
    pub fn with_config(config: &StoreConfig) -> Self {
        Self::with_cleanup_interval(config.cleanup_interval())
    }

    /// Create a backend with a custom sweep interval.
    ///
    /// Outside a Tokio runtime no sweeper is spawned and expired keys are
    /// only removed when touched.
    pub fn with_cleanup_interval(interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::new(MemoryInner {
            data: DashMap::new(),
            shutdown_tx,
        });

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let interval = interval.max(Duration::from_millis(1));
                handle.spawn(Self::cleanup_task(
                    Arc::downgrade(&inner),
                    interval,
                    shutdown_rx,
                ));
            }
            Err(_) => {
                warn!("No Tokio runtime available, expired keys will only be removed lazily");
            }
        }

        Self { inner }
    }

    /// Background task that periodically removes expired keys
    async fn cleanup_task(
        inner: Weak<MemoryInner>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(inner) = inner.upgrade() else {
                        break;
                    };
                    let removed = Self::cleanup_internal(&inner);
                    if removed > 0 {
                        debug!(removed, "Swept expired keys");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    fn cleanup_internal(inner: &MemoryInner) -> usize {
        let mut removed = 0usize;
        inner.data.retain(|_, entry| {
            if entry.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });
        EXPIRED_KEYS.inc_by(removed as u64);
        removed
    }

    /// Remove the key if its expiry has passed
    fn purge_if_expired(&self, key: &str) {
        if self
            .inner
            .data
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some()
        {
            EXPIRED_KEYS.inc();
        }
    }

    /// Manually sweep expired keys, returning how many were removed
    pub fn cleanup(&self) -> usize {
        Self::cleanup_internal(&self.inner)
    }

    /// Stop the background sweeper
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(true);
    }

    /// Number of stored keys, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.inner.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.data.is_empty()
    }

    /// Remaining time-to-live of a live key, `None` if absent or persistent
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entry = self.inner.data.get(key)?;
        if entry.is_expired() {
            return None;
        }
        entry
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.purge_if_expired(key);
        Ok(self.inner.data.contains_key(key))
    }

    async fn set_fields(&self, key: &str, fields: &FieldMap) -> Result<()> {
        if fields.is_empty() {
            return Err(Error::Backend(
                "set_fields requires at least one field".to_string(),
            ));
        }

        match self.inner.data.entry(key.to_string()) {
            Entry::Occupied(mut occ) => {
                if occ.get().is_expired() {
                    occ.insert(KeyEntry::new(fields.clone()));
                } else {
                    let stored = &mut occ.get_mut().fields;
                    for (name, value) in fields {
                        stored.insert(name.clone(), value.clone());
                    }
                }
            }
            Entry::Vacant(vac) => {
                vac.insert(KeyEntry::new(fields.clone()));
            }
        }
        Ok(())
    }

    async fn get_all_fields(&self, key: &str) -> Result<FieldMap> {
        self.purge_if_expired(key);
        Ok(self
            .inner
            .data
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.fields.clone())
            .unwrap_or_default())
    }

    async fn increment_field(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut entry = match self.inner.data.entry(key.to_string()) {
            Entry::Occupied(occ) if !occ.get().is_expired() => occ.into_ref(),
            Entry::Occupied(mut occ) => {
                occ.insert(KeyEntry::new(FieldMap::new()));
                occ.into_ref()
            }
            Entry::Vacant(vac) => vac.insert(KeyEntry::new(FieldMap::new())),
        };
        apply_delta(key, field, &mut entry.value_mut().fields, delta)
    }

    async fn delete_fields(&self, key: &str, fields: &[String]) -> Result<usize> {
        match self.inner.data.entry(key.to_string()) {
            Entry::Occupied(mut occ) => {
                if occ.get().is_expired() {
                    occ.remove();
                    return Ok(0);
                }
                let mut removed = 0;
                for field in fields {
                    if occ.get_mut().fields.remove(field).is_some() {
                        removed += 1;
                    }
                }
                if occ.get().fields.is_empty() {
                    occ.remove();
                }
                Ok(removed)
            }
            Entry::Vacant(_) => Ok(0),
        }
    }

    async fn delete_key(&self, key: &str) -> Result<bool> {
        Ok(self
            .inner
            .data
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired()))
    }

    async fn set_ttl(&self, key: &str, seconds: u64) -> Result<bool> {
        match self.inner.data.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.expires_at = Some(expiry_after(seconds));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_if_absent(
        &self,
        key: &str,
        fields: &FieldMap,
        ttl_secs: Option<u64>,
    ) -> Result<bool> {
        let entry = KeyEntry {
            fields: fields.clone(),
            expires_at: ttl_secs.map(expiry_after),
        };

        match self.inner.data.entry(key.to_string()) {
            Entry::Occupied(mut occ) => {
                if occ.get().is_expired() {
                    occ.insert(entry);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vac) => {
                vac.insert(entry);
                Ok(true)
            }
        }
    }

    async fn read_and_mutate(&self, key: &str, decide: MutationFn<'_>) -> Result<FieldMap> {
        match self.inner.data.entry(key.to_string()) {
            Entry::Occupied(mut occ) => {
                if occ.get().is_expired() {
                    occ.remove();
                    EXPIRED_KEYS.inc();
                    return Ok(FieldMap::new());
                }

                let snapshot = occ.get().fields.clone();
                match decide(&snapshot) {
                    FieldMutation::Keep => {}
                    FieldMutation::DeleteKey => {
                        occ.remove();
                    }
                    FieldMutation::Increment { field, delta } => {
                        apply_delta(key, &field, &mut occ.get_mut().fields, delta)?;
                    }
                }
                Ok(snapshot)
            }
            Entry::Vacant(_) => Ok(FieldMap::new()),
        }
    }
}
