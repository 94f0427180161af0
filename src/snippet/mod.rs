//! Snippet lifecycle
//!
//! A snippet is an immutable text saved under a short random identifier.
//! Every fetch consumes one view; the snippet deletes itself when its view
//! budget runs out or its TTL elapses, whichever comes first.

pub mod ident;
pub mod record;
pub mod store;

pub use ident::{IdentGenerator, IdentifierAllocator, PronounceableGenerator};
pub use record::{SnippetRecord, MAX_VIEW_BUDGET};
pub use store::{Deletion, NewSnippet, SnippetStore};
