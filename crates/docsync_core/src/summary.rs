use std::fmt;

use serde::Serialize;

/// A per-URL failure recorded during a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub url: String,
    pub reason: String,
}

/// Aggregated outcome of one sync run.
///
/// `fetched` counts documents created by this run, `updated` existing documents
/// whose content changed, `unchanged` documents whose digest matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub provider: String,
    pub fetched: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub errors: Vec<SyncFailure>,
    /// Set when the run stopped at an entry boundary before processing every entry.
    pub cancelled: bool,
}

impl RunSummary {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    pub fn record_failure(&mut self, url: impl Into<String>, reason: impl Into<String>) {
        self.failed += 1;
        self.errors.push(SyncFailure {
            url: url.into(),
            reason: reason.into(),
        });
    }

    pub fn processed(&self) -> usize {
        self.fetched + self.updated + self.unchanged + self.failed
    }

    /// A run succeeds only when every entry was processed without error.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} new, {} updated, {} unchanged, {} failed",
            self.provider, self.fetched, self.updated, self.unchanged, self.failed
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}
