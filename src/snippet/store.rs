//! Snippet lifecycle operations

use super::ident::{IdentGenerator, IdentifierAllocator, PronounceableGenerator};
use super::record::{SnippetRecord, FIELD_VIEWS_LEFT, MAX_VIEW_BUDGET};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::metrics::record_operation;
use crate::storage::{FieldMap, FieldMutation, KeyValueBackend};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Input of [`SnippetStore::create`]
///
/// # Example
///
/// ```rust
/// use snipbin::NewSnippet;
///
/// let snippet = NewSnippet::new("print(1)")
///     .with_max_usage(2)
///     .with_lifetime(3600)
///     .with_token("s3cret");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSnippet {
    pub code: String,
    /// View budget, 0 for unlimited, at most [`MAX_VIEW_BUDGET`]
    pub max_usage: u64,
    /// Seconds until expiry, 0 or less for none
    pub lifetime: i64,
    /// Identifier of the snippet this one duplicates, empty for originals
    pub parent_id: String,
    pub token: Option<String>,
}

impl NewSnippet {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    pub fn with_max_usage(mut self, max_usage: u64) -> Self {
        self.max_usage = max_usage;
        self
    }

    pub fn with_lifetime(mut self, seconds: i64) -> Self {
        self.lifetime = seconds;
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = parent_id.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Outcome of [`SnippetStore::delete_if`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deletion {
    /// The guard accepted the record and it was removed
    Deleted(SnippetRecord),
    /// The guard rejected the record, which was left untouched
    Refused(SnippetRecord),
}

/// Creates, reads and deletes snippets on a [`KeyValueBackend`]
///
/// The store holds no state of its own besides the backend handle, so
/// clones are cheap and can be shared across tasks.
#[derive(Clone)]
pub struct SnippetStore {
    backend: Arc<dyn KeyValueBackend>,
    allocator: IdentifierAllocator,
}

impl std::fmt::Debug for SnippetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnippetStore")
            .field("allocator", &self.allocator)
            .finish()
    }
}

fn outcome<T>(op: &str, result: &Result<T>) {
    let status = match result {
        Ok(_) => "ok",
        Err(Error::NotFound(_)) => "not_found",
        Err(Error::AllocationExhausted { .. }) => "exhausted",
        Err(Error::BackendUnavailable(_)) => "unavailable",
        Err(Error::InvalidInput(_)) => "invalid",
        Err(_) => "error",
    };
    record_operation(op, status);
}

impl SnippetStore {
    /// Create a store generating pronounceable identifiers
    pub fn new(backend: Arc<dyn KeyValueBackend>, config: &StoreConfig) -> Self {
        Self::with_generator(backend, Arc::new(PronounceableGenerator), config)
    }

    pub fn with_generator(
        backend: Arc<dyn KeyValueBackend>,
        generator: Arc<dyn IdentGenerator>,
        config: &StoreConfig,
    ) -> Self {
        let allocator = IdentifierAllocator::new(
            backend.clone(),
            generator,
            config.ident_size,
            config.max_allocation_attempts,
        );
        Self { backend, allocator }
    }

    pub fn allocator(&self) -> &IdentifierAllocator {
        &self.allocator
    }

    /// Save a snippet under a fresh identifier.
    ///
    /// The fields and the optional TTL are written through
    /// `insert_if_absent`, so identifier reservation and the write are one
    /// step on backends that implement it atomically. A `max_usage` above
    /// [`MAX_VIEW_BUDGET`] fails with `InvalidInput` before anything is
    /// written.
    #[instrument(skip(self, snippet), fields(max_usage = snippet.max_usage, lifetime = snippet.lifetime))]
    pub async fn create(&self, snippet: NewSnippet) -> Result<SnippetRecord> {
        let NewSnippet {
            code,
            max_usage,
            lifetime,
            parent_id,
            token,
        } = snippet;

        if max_usage > MAX_VIEW_BUDGET {
            record_operation("create", "invalid");
            return Err(Error::InvalidInput(format!(
                "max_usage {} exceeds the limit of {}",
                max_usage, MAX_VIEW_BUDGET
            )));
        }

        let mut record = SnippetRecord {
            id: String::new(),
            code,
            views_left: max_usage,
            parent_id,
            token: token.filter(|t| !t.is_empty()),
        };
        let ttl_secs = u64::try_from(lifetime).ok().filter(|secs| *secs > 0);

        let result = self.allocator.reserve(&record.to_fields(), ttl_secs).await;
        outcome("create", &result);

        record.id = result?;
        info!(ident = %record.id, "Snippet created");
        Ok(record)
    }

    /// Read a snippet, consuming one view.
    ///
    /// The returned record carries the view count valid for this read,
    /// before the decrement. A count of 1 deletes the snippet, a count of 0
    /// leaves it untouched.
    #[instrument(skip(self))]
    pub async fn fetch(&self, id: &str) -> Result<SnippetRecord> {
        let result = self.fetch_inner(id).await;
        outcome("fetch", &result);
        result
    }

    async fn fetch_inner(&self, id: &str) -> Result<SnippetRecord> {
        // The decision decodes the record; the same decode is returned
        let decoded: Mutex<Option<Result<SnippetRecord>>> = Mutex::new(None);
        let decide = |fields: &FieldMap| {
            let record = SnippetRecord::from_fields(id, fields);
            let mutation = match &record {
                Ok(record) if record.is_unlimited() => FieldMutation::Keep,
                Ok(record) if record.is_last_view() => FieldMutation::DeleteKey,
                Ok(_) => FieldMutation::Increment {
                    field: FIELD_VIEWS_LEFT.to_string(),
                    delta: -1,
                },
                // Corrupt records are left alone and reported below
                Err(_) => FieldMutation::Keep,
            };
            *decoded.lock() = Some(record);
            mutation
        };

        let fields = self.backend.read_and_mutate(id, &decide).await?;
        if fields.is_empty() {
            return Err(Error::NotFound(id.to_string()));
        }

        let record = decoded.lock().take().ok_or_else(|| {
            Error::Backend(format!("backend returned '{}' without a decision", id))
        })??;
        if record.is_last_view() {
            info!(ident = %id, "Snippet consumed its last view");
        } else {
            debug!(ident = %id, views_left = record.views_left, "Snippet fetched");
        }
        Ok(record)
    }

    /// Read a snippet without consuming a view
    #[instrument(skip(self))]
    pub async fn peek(&self, id: &str) -> Result<SnippetRecord> {
        let fields = self.backend.get_all_fields(id).await?;
        if fields.is_empty() {
            return Err(Error::NotFound(id.to_string()));
        }
        SnippetRecord::from_fields(id, &fields)
    }

    /// Delete a snippet.
    ///
    /// Fails with `NotFound` if it is already gone; callers should treat
    /// that as success. The admin token is not checked here.
    ///
    /// Removing every field of a snippet is the same as removing its key, so
    /// this issues a `DeleteKey` mutation rather than
    /// [`KeyValueBackend::delete_fields`].
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let delete_all = |_: &FieldMap| FieldMutation::DeleteKey;
        let result = match self.backend.read_and_mutate(id, &delete_all).await {
            Ok(fields) if fields.is_empty() => Err(Error::NotFound(id.to_string())),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        outcome("delete", &result);

        result?;
        info!(ident = %id, "Snippet deleted");
        Ok(())
    }

    /// Delete a snippet only if `guard` accepts it.
    ///
    /// The guard runs inside the same `read_and_mutate` as the removal, so
    /// the record it inspects is the record that gets deleted. Absent
    /// snippets fail with `NotFound`, corrupt ones with `CorruptRecord`, and
    /// neither is touched.
    #[instrument(skip(self, guard))]
    pub async fn delete_if<F>(&self, id: &str, guard: F) -> Result<Deletion>
    where
        F: Fn(&SnippetRecord) -> bool + Send + Sync,
    {
        let result = self.delete_if_inner(id, &guard).await;
        match &result {
            Ok(Deletion::Refused(_)) => record_operation("delete", "refused"),
            _ => outcome("delete", &result),
        }
        result
    }

    async fn delete_if_inner(
        &self,
        id: &str,
        guard: &(dyn Fn(&SnippetRecord) -> bool + Send + Sync),
    ) -> Result<Deletion> {
        let verdict: Mutex<Option<Result<Deletion>>> = Mutex::new(None);
        let decide = |fields: &FieldMap| {
            let (mutation, decided) = match SnippetRecord::from_fields(id, fields) {
                Ok(record) if guard(&record) => {
                    (FieldMutation::DeleteKey, Ok(Deletion::Deleted(record)))
                }
                Ok(record) => (FieldMutation::Keep, Ok(Deletion::Refused(record))),
                Err(e) => (FieldMutation::Keep, Err(e)),
            };
            *verdict.lock() = Some(decided);
            mutation
        };

        let fields = self.backend.read_and_mutate(id, &decide).await?;
        if fields.is_empty() {
            return Err(Error::NotFound(id.to_string()));
        }

        let deletion = verdict.lock().take().ok_or_else(|| {
            Error::Backend(format!("backend returned '{}' without a decision", id))
        })??;
        match &deletion {
            Deletion::Deleted(_) => info!(ident = %id, "Snippet deleted"),
            Deletion::Refused(_) => debug!(ident = %id, "Snippet deletion refused"),
        }
        Ok(deletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snippet::record::{FIELD_CODE, FIELD_TOKEN};
    use crate::storage::{MemoryBackend, MockBackend, MutationFn};
    use async_trait::async_trait;

    fn memory_store() -> (SnippetStore, MemoryBackend) {
        let backend = MemoryBackend::new();
        let store = SnippetStore::new(Arc::new(backend.clone()), &StoreConfig::default());
        (store, backend)
    }

    #[tokio::test]
    async fn test_two_view_snippet_lifecycle() -> Result<()> {
        let (store, backend) = memory_store();
        let created = store
            .create(NewSnippet::new("print(1)").with_max_usage(2))
            .await?;
        assert_eq!(created.id.len(), 6);
        assert_eq!(created.views_left, 2);

        let first = store.fetch(&created.id).await?;
        assert_eq!(first.code, "print(1)");
        assert_eq!(first.views_left, 2);
        assert!(backend.exists(&created.id).await?);

        let second = store.fetch(&created.id).await?;
        assert_eq!(second.views_left, 1);
        assert!(!backend.exists(&created.id).await?);

        let err = store.fetch(&created.id).await.unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_single_view_then_delete_is_not_found() -> Result<()> {
        let (store, _) = memory_store();
        let created = store
            .create(NewSnippet::new("x").with_max_usage(1).with_parent("orig123"))
            .await?;
        assert_eq!(created.parent_id, "orig123");

        let fetched = store.fetch(&created.id).await?;
        assert_eq!(fetched.parent_id, "orig123");

        let err = store.delete(&created.id).await.unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_fails_when_every_candidate_collides() {
        let backend = MockBackend::new();
        backend.set_collide(true);
        let store = SnippetStore::new(Arc::new(backend.clone()), &StoreConfig::default());

        let err = store.create(NewSnippet::new("x")).await.unwrap_err();
        assert!(matches!(err, Error::AllocationExhausted { attempts: 20 }));
        assert_eq!(backend.calls("exists"), 20);
        assert_eq!(backend.calls("set_fields"), 0);
    }

    #[tokio::test]
    async fn test_token_stored_only_when_given() -> Result<()> {
        let (store, backend) = memory_store();

        let plain = store.create(NewSnippet::new("a")).await?;
        assert_eq!(plain.token, None);
        assert!(!backend.get_all_fields(&plain.id).await?.contains_key(FIELD_TOKEN));

        let empty = store.create(NewSnippet::new("b").with_token("")).await?;
        assert_eq!(empty.token, None);
        assert!(!backend.get_all_fields(&empty.id).await?.contains_key(FIELD_TOKEN));

        let owned = store.create(NewSnippet::new("c").with_token("s3cret")).await?;
        assert_eq!(owned.token.as_deref(), Some("s3cret"));
        assert_eq!(store.fetch(&owned.id).await?.token.as_deref(), Some("s3cret"));
        Ok(())
    }

    #[tokio::test]
    async fn test_lifetime_sets_ttl() -> Result<()> {
        let (store, backend) = memory_store();

        let expiring = store.create(NewSnippet::new("a").with_lifetime(120)).await?;
        assert!(backend.ttl(&expiring.id).is_some());

        let negative = store.create(NewSnippet::new("b").with_lifetime(-5)).await?;
        assert!(backend.ttl(&negative.id).is_none());

        let persistent = store.create(NewSnippet::new("c")).await?;
        assert!(backend.ttl(&persistent.id).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() -> Result<()> {
        let (store, _) = memory_store();
        let created = store.create(NewSnippet::new("a").with_max_usage(1)).await?;

        assert_eq!(store.peek(&created.id).await?.views_left, 1);
        assert_eq!(store.peek(&created.id).await?.views_left, 1);
        store.fetch(&created.id).await?;
        assert!(store.peek(&created.id).await.unwrap_err().is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_record_is_reported_and_left_alone() -> Result<()> {
        let (store, backend) = memory_store();
        let fields = FieldMap::from([
            (FIELD_CODE.to_string(), "a".to_string()),
            (FIELD_VIEWS_LEFT.to_string(), "lots".to_string()),
        ]);
        backend.set_fields("broken", &fields).await?;

        let err = store.fetch("broken").await.unwrap_err();
        assert!(matches!(err, Error::CorruptRecord(_)));
        assert_eq!(backend.get_all_fields("broken").await?, fields);
        Ok(())
    }

    #[tokio::test]
    async fn test_default_primitives_follow_same_lifecycle() -> Result<()> {
        let backend = MockBackend::new();
        let store = SnippetStore::new(Arc::new(backend.clone()), &StoreConfig::default());

        let created = store
            .create(NewSnippet::new("print(1)").with_max_usage(3).with_lifetime(60))
            .await?;
        assert_eq!(backend.calls("set_ttl"), 1);

        assert_eq!(store.fetch(&created.id).await?.views_left, 3);
        assert_eq!(store.fetch(&created.id).await?.views_left, 2);
        assert_eq!(backend.calls("increment_field"), 2);

        assert_eq!(store.fetch(&created.id).await?.views_left, 1);
        assert_eq!(backend.calls("delete_key"), 1);
        assert!(store.fetch(&created.id).await.unwrap_err().is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_backend_outage_propagates() {
        let backend = MockBackend::new();
        let store = SnippetStore::new(Arc::new(backend.clone()), &StoreConfig::default());
        backend.set_unavailable(true);

        let err = store.fetch("anything").await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
        let err = store.create(NewSnippet::new("x")).await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
        let err = store.delete("anything").await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_view_budget_beyond_counter_range_is_rejected() -> Result<()> {
        let (store, backend) = memory_store();

        let err = store
            .create(NewSnippet::new("x").with_max_usage(u64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(backend.is_empty());

        let largest = store
            .create(NewSnippet::new("x").with_max_usage(MAX_VIEW_BUDGET))
            .await?;
        assert_eq!(store.fetch(&largest.id).await?.views_left, MAX_VIEW_BUDGET);
        assert_eq!(
            store.fetch(&largest.id).await?.views_left,
            MAX_VIEW_BUDGET - 1
        );
        Ok(())
    }

    /// Decides on the stored fields but hands back a damaged copy
    struct DamagedReadBackend(MemoryBackend);

    #[async_trait]
    impl KeyValueBackend for DamagedReadBackend {
        async fn exists(&self, key: &str) -> Result<bool> {
            self.0.exists(key).await
        }

        async fn set_fields(&self, key: &str, fields: &FieldMap) -> Result<()> {
            self.0.set_fields(key, fields).await
        }

        async fn get_all_fields(&self, key: &str) -> Result<FieldMap> {
            self.0.get_all_fields(key).await
        }

        async fn increment_field(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
            self.0.increment_field(key, field, delta).await
        }

        async fn delete_fields(&self, key: &str, fields: &[String]) -> Result<usize> {
            self.0.delete_fields(key, fields).await
        }

        async fn delete_key(&self, key: &str) -> Result<bool> {
            self.0.delete_key(key).await
        }

        async fn set_ttl(&self, key: &str, seconds: u64) -> Result<bool> {
            self.0.set_ttl(key, seconds).await
        }

        async fn read_and_mutate(&self, key: &str, decide: MutationFn<'_>) -> Result<FieldMap> {
            let mut fields = self.0.read_and_mutate(key, decide).await?;
            if !fields.is_empty() {
                fields.insert(FIELD_VIEWS_LEFT.to_string(), "damaged".to_string());
            }
            Ok(fields)
        }
    }

    #[tokio::test]
    async fn test_fetch_returns_the_record_it_decided_on() -> Result<()> {
        let store = SnippetStore::new(
            Arc::new(DamagedReadBackend(MemoryBackend::new())),
            &StoreConfig::default(),
        );
        let created = store.create(NewSnippet::new("x").with_max_usage(3)).await?;

        assert_eq!(store.fetch(&created.id).await?.views_left, 3);
        assert_eq!(store.fetch(&created.id).await?.views_left, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_if_removes_accepted_record() -> Result<()> {
        let (store, backend) = memory_store();
        let created = store
            .create(NewSnippet::new("x").with_max_usage(2).with_token("s3cret"))
            .await?;

        let deletion = store
            .delete_if(&created.id, |record| record.token.as_deref() == Some("s3cret"))
            .await?;
        assert_eq!(deletion, Deletion::Deleted(created.clone()));
        assert!(!backend.exists(&created.id).await?);

        let err = store.delete_if(&created.id, |_| true).await.unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_if_refusal_leaves_record_untouched() -> Result<()> {
        let (store, backend) = memory_store();
        let created = store
            .create(NewSnippet::new("x").with_max_usage(2).with_token("s3cret"))
            .await?;
        let before = backend.get_all_fields(&created.id).await?;

        let deletion = store
            .delete_if(&created.id, |record| record.token.as_deref() == Some("guess"))
            .await?;
        assert_eq!(deletion, Deletion::Refused(created.clone()));
        assert_eq!(backend.get_all_fields(&created.id).await?, before);
        assert_eq!(store.fetch(&created.id).await?.views_left, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_if_reports_corrupt_record() -> Result<()> {
        let (store, backend) = memory_store();
        let fields = FieldMap::from([(FIELD_CODE.to_string(), "a".to_string())]);
        backend.set_fields("broken", &fields).await?;

        let err = store.delete_if("broken", |_| true).await.unwrap_err();
        assert!(matches!(err, Error::CorruptRecord(_)));
        assert!(backend.exists("broken").await?);
        Ok(())
    }
}
