//! Key-value backend trait

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Field name to value map stored under a single key
pub type FieldMap = HashMap<String, String>;

/// Mutation applied by [`KeyValueBackend::read_and_mutate`] after the read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMutation {
    /// Leave the key untouched
    Keep,
    /// Remove the whole key
    DeleteKey,
    /// Adjust a numeric field by `delta`
    Increment { field: String, delta: i64 },
}

/// Decision callback for [`KeyValueBackend::read_and_mutate`]
pub type MutationFn<'a> = &'a (dyn Fn(&FieldMap) -> FieldMutation + Send + Sync);

/// Backend capability consumed by the snippet store
///
/// Keys hold a map of string fields and an optional time-to-live. An
/// expired key is indistinguishable from an absent one.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// True iff the key is present and unexpired
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Create or overwrite the named fields
    async fn set_fields(&self, key: &str, fields: &FieldMap) -> Result<()>;

    /// All fields of a key, empty if the key is absent
    async fn get_all_fields(&self, key: &str) -> Result<FieldMap>;

    /// Adjust a numeric field and return the new value.
    ///
    /// A missing field counts as 0. A non-integer value is rejected.
    async fn increment_field(&self, key: &str, field: &str, delta: i64) -> Result<i64>;

    /// Remove the named fields and return how many existed.
    ///
    /// Removing the last field removes the key.
    async fn delete_fields(&self, key: &str, fields: &[String]) -> Result<usize>;

    /// Remove the key, returning whether it existed
    async fn delete_key(&self, key: &str) -> Result<bool>;

    /// Attach an expiry of `seconds` to an existing key
    async fn set_ttl(&self, key: &str, seconds: u64) -> Result<bool>;

    /// Write `fields` (and the optional ttl) only if `key` is absent.
    ///
    /// The default implementation is check-then-act: two concurrent callers
    /// can both see the key as absent and the later write wins. Backends
    /// with a native set-if-absent primitive should override it.
    async fn insert_if_absent(
        &self,
        key: &str,
        fields: &FieldMap,
        ttl_secs: Option<u64>,
    ) -> Result<bool> {
        if self.exists(key).await? {
            return Ok(false);
        }
        self.set_fields(key, fields).await?;
        if let Some(seconds) = ttl_secs {
            self.set_ttl(key, seconds).await?;
        }
        Ok(true)
    }

    /// Read all fields, then apply the mutation chosen by `decide`.
    ///
    /// Returns the fields as they were before the mutation; an absent key
    /// yields an empty map and `decide` is not called. The default
    /// implementation takes two round trips, so concurrent callers may both
    /// observe the same pre-mutation state. Backends that can run the
    /// decision server-side (script, shard lock) should override it.
    async fn read_and_mutate(&self, key: &str, decide: MutationFn<'_>) -> Result<FieldMap> {
        let fields = self.get_all_fields(key).await?;
        if fields.is_empty() {
            return Ok(fields);
        }

        match decide(&fields) {
            FieldMutation::Keep => {}
            FieldMutation::DeleteKey => {
                self.delete_key(key).await?;
            }
            FieldMutation::Increment { field, delta } => {
                self.increment_field(key, &field, delta).await?;
            }
        }
        Ok(fields)
    }
}
