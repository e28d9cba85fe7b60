use std::fmt;
use std::path::PathBuf;

use crate::fetch::FetchSettings;
use crate::rate_limit::{RateLimitSettings, MIN_RATE_PER_SECOND};
use crate::store::{system_clock, Clock};

/// Everything a sync run needs besides the manifest store and the backends.
#[derive(Clone)]
pub struct SyncConfig {
    /// Directory that `Document::local_path` values are relative to.
    pub docs_root: PathBuf,
    pub fetch: FetchSettings,
    pub rate_limit: RateLimitSettings,
    pub clock: Clock,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("rate limit must be at least {MIN_RATE_PER_SECOND} requests per second, got {0}")]
    InvalidRate(f64),
    #[error("rate limit capacity must be at least 1")]
    ZeroCapacity,
    #[error("maximum response size must be greater than zero")]
    ZeroMaxBytes,
    #[error("no hosts are allowed; every fetch would be refused")]
    EmptyAllowlist,
}

impl SyncConfig {
    pub fn default_with_docs_root(docs_root: PathBuf) -> Self {
        Self {
            docs_root,
            fetch: FetchSettings::default(),
            rate_limit: RateLimitSettings::default(),
            clock: system_clock(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.rate_limit.per_second;
        if !(rate.is_finite() && rate >= MIN_RATE_PER_SECOND) {
            return Err(ConfigError::InvalidRate(rate));
        }
        if self.rate_limit.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.fetch.max_bytes == 0 {
            return Err(ConfigError::ZeroMaxBytes);
        }
        if self.fetch.allowed_hosts.is_empty() {
            return Err(ConfigError::EmptyAllowlist);
        }
        Ok(())
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("docs_root", &self.docs_root)
            .field("fetch", &self.fetch)
            .field("rate_limit", &self.rate_limit)
            .finish_non_exhaustive()
    }
}
