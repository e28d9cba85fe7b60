use std::sync::Arc;

use docsync_core::{Document, DocumentPatch, ProviderEntry, RunSummary, ValidationError};
use engine_logging::{engine_debug, engine_info, engine_warn};
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, SyncConfig};
use crate::extract::{ContentExtractor, ExtractionError, StaticMarkupExtractor};
use crate::fetch::{Fetcher, ReqwestFetcher};
use crate::hash::content_hash;
use crate::paths::local_path_for;
use crate::persist::{AtomicFileWriter, PersistError};
use crate::rate_limit::RateLimiter;
use crate::store::{Clock, ManifestStore, StoreError};
use crate::FetchError;

/// Failures that abort a run. Per-URL problems never end up here.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to write content for {url}: {source}")]
    Content {
        url: String,
        #[source]
        source: PersistError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Created,
    Updated,
    Unchanged,
}

enum EntryError {
    Fetch(FetchError),
    Extract(ExtractionError),
    Rejected(StoreError),
    Fatal(SyncError),
}

/// Drives the fetch → extract → hash → persist pipeline over a provider's entries.
///
/// Entries are processed one at a time in the given order, behind a token-bucket
/// rate limiter. A failing URL is recorded in the [`RunSummary`] and the run moves
/// on; only a failing manifest or content write aborts it.
pub struct SyncOrchestrator {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn ContentExtractor>,
    limiter: RateLimiter,
    store: ManifestStore,
    content: AtomicFileWriter,
    clock: Clock,
}

impl SyncOrchestrator {
    /// Fails when `config` does not pass [`SyncConfig::validate`].
    pub fn new(
        config: SyncConfig,
        store: ManifestStore,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn ContentExtractor>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            fetcher,
            extractor,
            limiter: RateLimiter::new(config.rate_limit),
            store,
            content: AtomicFileWriter::new(config.docs_root),
            clock: config.clock,
        })
    }

    /// Reqwest fetching and the static markup backend.
    pub fn with_defaults(config: SyncConfig, store: ManifestStore) -> Result<Self, ConfigError> {
        let fetcher = Arc::new(ReqwestFetcher::new(config.fetch.clone()));
        Self::new(config, store, fetcher, Arc::new(StaticMarkupExtractor))
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ManifestStore {
        &mut self.store
    }

    pub fn into_store(self) -> ManifestStore {
        self.store
    }

    pub async fn sync(
        &mut self,
        provider: &str,
        entries: &[ProviderEntry],
    ) -> Result<RunSummary, SyncError> {
        self.sync_until(provider, entries, &CancellationToken::new())
            .await
    }

    /// Fetches a single page, creating or updating its document.
    pub async fn sync_one(
        &mut self,
        provider: &str,
        entry: &ProviderEntry,
    ) -> Result<RunSummary, SyncError> {
        self.sync(provider, std::slice::from_ref(entry)).await
    }

    /// Like [`SyncOrchestrator::sync`], but checks `cancel` before each entry. A
    /// cancelled run returns the partial summary with `cancelled` set; every
    /// manifest write made so far is complete.
    pub async fn sync_until(
        &mut self,
        provider: &str,
        entries: &[ProviderEntry],
        cancel: &CancellationToken,
    ) -> Result<RunSummary, SyncError> {
        let mut summary = RunSummary::new(provider);
        engine_info!("Syncing {} entries for provider {}", entries.len(), provider);

        for entry in entries {
            if cancel.is_cancelled() {
                engine_warn!(
                    "Sync of {} cancelled after {} of {} entries",
                    provider,
                    summary.processed(),
                    entries.len()
                );
                summary.cancelled = true;
                break;
            }

            match self.process_entry(provider, entry).await {
                Ok(EntryOutcome::Created) => summary.fetched += 1,
                Ok(EntryOutcome::Updated) => summary.updated += 1,
                Ok(EntryOutcome::Unchanged) => summary.unchanged += 1,
                Err(EntryError::Fetch(err)) => {
                    engine_warn!("Fetch failed for {}: {}", entry.url, err);
                    summary.record_failure(&entry.url, err.to_string());
                }
                Err(EntryError::Extract(err)) => {
                    engine_warn!("Extraction failed for {}: {}", entry.url, err);
                    summary.record_failure(&entry.url, format!("extraction failed: {err}"));
                }
                Err(EntryError::Rejected(err)) => {
                    engine_warn!("Document for {} rejected: {}", entry.url, err);
                    summary.record_failure(&entry.url, err.to_string());
                }
                Err(EntryError::Fatal(err)) => {
                    engine_warn!("Aborting sync of {}: {}", provider, err);
                    return Err(err);
                }
            }
        }

        engine_info!("Sync finished: {}", summary);
        Ok(summary)
    }

    async fn process_entry(
        &mut self,
        provider: &str,
        entry: &ProviderEntry,
    ) -> Result<EntryOutcome, EntryError> {
        let existing = self.store.get_by_url(provider, &entry.url).cloned();

        self.limiter.acquire().await;
        let output = self
            .fetcher
            .fetch(&entry.url)
            .await
            .map_err(EntryError::Fetch)?;
        let page = self
            .extractor
            .extract(&output.bytes, output.metadata.content_type.as_deref())
            .map_err(EntryError::Extract)?;
        let digest = content_hash(&page.markdown);

        if let Some(doc) = &existing {
            if doc.hash.eq_ignore_ascii_case(&digest) {
                if doc.category != entry.category {
                    let patch = DocumentPatch {
                        category: Some(entry.category.clone()),
                        ..DocumentPatch::default()
                    };
                    self.store.update(doc.id, patch).map_err(store_failure)?;
                    engine_info!("Recategorized {} as {:?}", entry.url, entry.category);
                } else {
                    engine_debug!("Unchanged: {}", entry.url);
                }
                return Ok(EntryOutcome::Unchanged);
            }
        }

        let local_path = match &existing {
            Some(doc) => doc.local_path.clone(),
            None => {
                let path = local_path_for(provider, &entry.url);
                if self.store.get_by_local_path(&path).is_some() {
                    return Err(EntryError::Rejected(StoreError::Validation(
                        ValidationError::DuplicateLocalPath(path),
                    )));
                }
                path
            }
        };

        // Content is committed before the manifest: if the manifest write then
        // fails, the stale hash makes the next run rewrite both.
        self.content
            .write(&local_path, page.markdown.as_bytes())
            .map_err(|source| {
                EntryError::Fatal(SyncError::Content {
                    url: entry.url.clone(),
                    source,
                })
            })?;

        let now = (self.clock)();
        let metadata = page.metadata;
        let result = match existing {
            Some(doc) => self
                .store
                .update(
                    doc.id,
                    DocumentPatch {
                        hash: Some(digest),
                        last_fetched: Some(now),
                        category: Some(entry.category.clone()),
                        title: Some(metadata.title),
                        description: Some(metadata.description),
                        topics: Some(metadata.keywords),
                        ..DocumentPatch::default()
                    },
                )
                .map(|_| EntryOutcome::Updated),
            None => {
                let mut doc = Document::new(provider, &entry.url, local_path, digest, now);
                doc.category = entry.category.clone();
                doc.title = metadata.title;
                doc.description = metadata.description;
                doc.topics = metadata.keywords;
                self.store.add(doc).map(|_| EntryOutcome::Created)
            }
        };

        let outcome = result.map_err(store_failure)?;
        engine_info!("{:?}: {}", outcome, entry.url);
        Ok(outcome)
    }
}

fn store_failure(err: StoreError) -> EntryError {
    if err.is_persistence() {
        EntryError::Fatal(SyncError::Store(err))
    } else {
        EntryError::Rejected(err)
    }
}
