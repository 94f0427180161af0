//! Mock backend for testing
//!
//! Wraps a [`MemoryBackend`] but only implements the basic field-map
//! operations, so the atomic primitives fall back to the trait's
//! multi-round-trip defaults. Faults can be injected to force identifier
//! collisions or simulate a lost connection, and every call is counted.

use super::engine::{FieldMap, KeyValueBackend};
use super::memory::MemoryBackend;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct MockState {
    collide: AtomicBool,
    unavailable: AtomicBool,
    calls: Mutex<HashMap<&'static str, usize>>,
}

/// In-memory mock backend with fault injection
#[derive(Clone, Default)]
pub struct MockBackend {
    inner: MemoryBackend,
    state: Arc<MockState>,
}

impl MockBackend {
    /// Create a new mock backend instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every key as existing, forcing identifier collisions
    pub fn set_collide(&self, collide: bool) {
        self.state.collide.store(collide, Ordering::SeqCst);
    }

    /// Fail every call with `BackendUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of times `op` has been called
    pub fn calls(&self, op: &str) -> usize {
        self.state.calls.lock().get(op).copied().unwrap_or(0)
    }

    /// The backing in-memory store
    pub fn memory(&self) -> &MemoryBackend {
        &self.inner
    }

    fn enter(&self, op: &'static str) -> Result<()> {
        *self.state.calls.lock().entry(op).or_insert(0) += 1;
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(Error::BackendUnavailable(format!(
                "mock backend refused {}",
                op
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueBackend for MockBackend {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.enter("exists")?;
        if self.state.collide.load(Ordering::SeqCst) {
            return Ok(true);
        }
        self.inner.exists(key).await
    }

    async fn set_fields(&self, key: &str, fields: &FieldMap) -> Result<()> {
        self.enter("set_fields")?;
        self.inner.set_fields(key, fields).await
    }

    async fn get_all_fields(&self, key: &str) -> Result<FieldMap> {
        self.enter("get_all_fields")?;
        self.inner.get_all_fields(key).await
    }

    async fn increment_field(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.enter("increment_field")?;
        self.inner.increment_field(key, field, delta).await
    }

    async fn delete_fields(&self, key: &str, fields: &[String]) -> Result<usize> {
        self.enter("delete_fields")?;
        self.inner.delete_fields(key, fields).await
    }

    async fn delete_key(&self, key: &str) -> Result<bool> {
        self.enter("delete_key")?;
        self.inner.delete_key(key).await
    }

    async fn set_ttl(&self, key: &str, seconds: u64) -> Result<bool> {
        self.enter("set_ttl")?;
        self.inner.set_ttl(key, seconds).await
    }
}
