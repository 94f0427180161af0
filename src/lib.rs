// snipbin - Self-expiring snippet store
// Text snippets with a view budget and a time budget on a field-map key-value backend

#![warn(rust_2018_idioms)]

pub mod config;
pub mod metrics;
pub mod server;
pub mod snippet;
pub mod storage;

// Re-exports for convenience
pub use crate::config::{Config, ServerConfig, StoreConfig};
pub use crate::snippet::{Deletion, IdentifierAllocator, NewSnippet, SnippetRecord, SnippetStore};
pub use crate::storage::{KeyValueBackend, MemoryBackend};

/// snipbin error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        /// Identifier absent, expired or already deleted
        #[error("Not found: {0}")]
        NotFound(String),

        #[error("No free identifier found after {attempts} attempts")]
        AllocationExhausted { attempts: usize },

        #[error("Backend unavailable: {0}")]
        BackendUnavailable(String),

        /// The backend rejected a command
        #[error("Backend error: {0}")]
        Backend(String),

        #[error("Corrupt record: {0}")]
        CorruptRecord(String),

        /// Caller input the store cannot represent
        #[error("Invalid input: {0}")]
        InvalidInput(String),

        #[error("Configuration error: {0}")]
        Config(String),
    }

    impl Error {
        /// `NotFound` means "already gone", not a failure needing remediation
        pub fn is_not_found(&self) -> bool {
            matches!(self, Error::NotFound(_))
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
