//! Identifier generation and allocation

use crate::error::{Error, Result};
use crate::metrics::ALLOCATION_COLLISIONS;
use crate::storage::{FieldMap, KeyValueBackend};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, warn};

const CONSONANTS: &[u8] = b"bcdfghjklmnprstvz";
const VOWELS: &[u8] = b"aeiou";

/// Source of candidate identifiers
pub trait IdentGenerator: Send + Sync {
    /// Produce a random identifier of `len` characters
    fn generate(&self, len: usize) -> String;
}

/// Lowercase identifiers alternating consonants and vowels ("bakepo")
#[derive(Debug, Clone, Copy, Default)]
pub struct PronounceableGenerator;

impl IdentGenerator for PronounceableGenerator {
    fn generate(&self, len: usize) -> String {
        let mut rng = rand::thread_rng();
        let mut use_vowel = rng.gen_bool(0.5);
        let mut ident = String::with_capacity(len);

        for _ in 0..len {
            let pool = if use_vowel { VOWELS } else { CONSONANTS };
            ident.push(pool[rng.gen_range(0..pool.len())] as char);
            use_vowel = !use_vowel;
        }
        ident
    }
}

/// Finds identifiers not used by any live key
#[derive(Clone)]
pub struct IdentifierAllocator {
    backend: Arc<dyn KeyValueBackend>,
    generator: Arc<dyn IdentGenerator>,
    ident_size: usize,
    max_attempts: usize,
}

impl std::fmt::Debug for IdentifierAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierAllocator")
            .field("ident_size", &self.ident_size)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl IdentifierAllocator {
    pub fn new(
        backend: Arc<dyn KeyValueBackend>,
        generator: Arc<dyn IdentGenerator>,
        ident_size: usize,
        max_attempts: usize,
    ) -> Self {
        Self {
            backend,
            generator,
            ident_size,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Return the first generated identifier that does not exist yet.
    ///
    /// Nothing is written, so another caller may take the identifier before
    /// this one uses it. Prefer [`reserve`](Self::reserve) when writing.
    pub async fn allocate(&self) -> Result<String> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.generator.generate(self.ident_size);
            if !self.backend.exists(&candidate).await? {
                return Ok(candidate);
            }
            self.note_collision(&candidate, attempt);
        }
        Err(self.exhausted())
    }

    /// Write `fields` under the first generated identifier that is free,
    /// attaching `ttl_secs` if given, and return that identifier.
    pub async fn reserve(&self, fields: &FieldMap, ttl_secs: Option<u64>) -> Result<String> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.generator.generate(self.ident_size);
            if self
                .backend
                .insert_if_absent(&candidate, fields, ttl_secs)
                .await?
            {
                return Ok(candidate);
            }
            self.note_collision(&candidate, attempt);
        }
        Err(self.exhausted())
    }

    fn note_collision(&self, candidate: &str, attempt: usize) {
        ALLOCATION_COLLISIONS.inc();
        debug!(ident = %candidate, attempt, "Identifier already taken");
    }

    fn exhausted(&self) -> Error {
        warn!(
            attempts = self.max_attempts,
            ident_size = self.ident_size,
            "No free identifier found"
        );
        Error::AllocationExhausted {
            attempts: self.max_attempts,
        }
    }
}
