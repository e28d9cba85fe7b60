//! Docsync core: the document catalog model, validation rules, and schema migration.
//!
//! Nothing in this crate touches the network or the filesystem; persistence lives in
//! `docsync_engine`.
mod document;
mod error;
mod manifest;
mod migrate;
mod provider;
mod summary;
mod topics;

pub use document::{is_uuid_v4, Document, DocumentPatch};
pub use error::ValidationError;
pub use manifest::{Manifest, SearchFilters, MANIFEST_VERSION};
pub use migrate::{migrate_value, MigrationError, MigrationOutcome};
pub use provider::ProviderEntry;
pub use summary::{RunSummary, SyncFailure};
pub use topics::{normalize_topics, topics_from_keywords, MAX_TOPICS, MAX_TOPIC_LEN};
