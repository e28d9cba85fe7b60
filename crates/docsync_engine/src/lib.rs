//! Docsync engine: fetching, extraction, change detection, and manifest persistence.
mod config;
mod decode;
mod extract;
mod fetch;
mod hash;
mod markdown;
mod orchestrator;
mod paths;
mod persist;
mod rate_limit;
mod sanitize;
mod store;
mod types;

pub use config::{ConfigError, SyncConfig};
pub use decode::decode_text;
pub use extract::{
    ContentExtractor, ExtractedPage, ExtractionError, Html2MdExtractor, PageMetadata,
    PageRenderer, RenderingExtractor, StaticMarkupExtractor,
};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher, DEFAULT_MAX_BYTES};
pub use hash::{content_hash, matches_hash};
pub use orchestrator::{SyncError, SyncOrchestrator};
pub use paths::local_path_for;
pub use persist::{backup_path, ensure_output_dir, AtomicFileWriter, PersistError, StagedWrite};
pub use rate_limit::{RateLimitSettings, RateLimiter, MIN_RATE_PER_SECOND};
pub use store::{system_clock, Clock, ManifestStore, StoreError};
pub use types::{FailureKind, FetchError, FetchMetadata, FetchOutput};
