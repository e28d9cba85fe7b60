use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use docsync_core::{
    migrate_value, Document, DocumentPatch, Manifest, MigrationError, SearchFilters,
    ValidationError,
};
use engine_logging::{engine_debug, engine_info};
use uuid::Uuid;

use crate::persist::{AtomicFileWriter, PersistError};

/// Source of timestamps for `last_updated` and `last_fetched`.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("manifest {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("manifest {path} cannot be migrated: {source}")]
    Migration {
        path: PathBuf,
        #[source]
        source: MigrationError,
    },
    #[error("manifest {path} violates catalog constraints: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },
    #[error("failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: PersistError,
    },
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl StoreError {
    /// Everything except a rejected mutation means the store itself is failing.
    pub fn is_persistence(&self) -> bool {
        !matches!(self, StoreError::Validation(_))
    }
}

/// The persisted document catalog.
///
/// Each mutation is applied to a copy of the in-memory manifest, written to disk
/// atomically (keeping the previous file as `<name>.bak`), and only then swapped
/// in. A failed write therefore leaves both the file and the in-memory state as
/// they were. The file is not held open between operations; a single writer per
/// manifest file is assumed.
pub struct ManifestStore {
    path: PathBuf,
    file_name: String,
    writer: AtomicFileWriter,
    manifest: Manifest,
    clock: Clock,
    writes: u64,
}

impl ManifestStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with_clock(path, system_clock())
    }

    /// Loads the manifest at `path`, or starts an empty one if the file does not
    /// exist. A prior-schema manifest is migrated and written back once.
    pub fn open_with_clock(path: impl Into<PathBuf>, clock: Clock) -> Result<Self, StoreError> {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StoreError::Write {
                path: path.clone(),
                source: PersistError::OutputDir("manifest path has no file name".into()),
            })?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut store = Self {
            file_name,
            writer: AtomicFileWriter::new(dir).with_backup(),
            manifest: Manifest::new(clock()),
            clock,
            writes: 0,
            path,
        };

        if !store.path.exists() {
            engine_info!("No manifest at {:?}; starting empty", store.path);
            return Ok(store);
        }

        let (manifest, migrated) = store.load()?;
        store.manifest = manifest;
        if migrated {
            let snapshot = store.manifest.clone();
            store.persist(&snapshot)?;
        }
        Ok(store)
    }

    fn load(&self) -> Result<(Manifest, bool), StoreError> {
        let path = &self.path;
        let text = fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;
        let mut value: serde_json::Value =
            serde_json::from_str(&text).map_err(|source| StoreError::Malformed {
                path: path.clone(),
                source,
            })?;
        let outcome =
            migrate_value(&mut value, (self.clock)()).map_err(|source| StoreError::Migration {
                path: path.clone(),
                source,
            })?;
        let mut manifest: Manifest =
            serde_json::from_value(value).map_err(|source| StoreError::Malformed {
                path: path.clone(),
                source,
            })?;
        manifest.validate().map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;

        if outcome.is_migrated() {
            engine_info!(
                "Migrated manifest {:?} ({:?}) to version {} with {} documents",
                path,
                outcome,
                manifest.version(),
                manifest.documents().len()
            );
        } else {
            engine_debug!(
                "Loaded manifest {:?} with {} documents",
                path,
                manifest.documents().len()
            );
        }
        Ok((manifest, outcome.is_migrated()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn documents(&self) -> &[Document] {
        self.manifest.documents()
    }

    /// Number of manifest writes performed through this handle.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn get(&self, id: Uuid) -> Option<&Document> {
        self.manifest.get(id)
    }

    pub fn get_by_url(&self, provider: &str, url: &str) -> Option<&Document> {
        self.manifest.get_by_url(provider, url)
    }

    pub fn get_by_local_path(&self, local_path: &str) -> Option<&Document> {
        self.manifest.get_by_local_path(local_path)
    }

    pub fn search(&self, query: &str, filters: &SearchFilters) -> Vec<Document> {
        self.manifest
            .search(query, filters)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn list_providers(&self) -> Vec<String> {
        self.manifest.providers().to_vec()
    }

    pub fn list_categories(&self) -> Vec<String> {
        self.manifest.categories().to_vec()
    }

    pub fn add(&mut self, document: Document) -> Result<Document, StoreError> {
        let now = (self.clock)();
        self.commit(|manifest| manifest.insert(document, now).cloned())
    }

    pub fn update(&mut self, id: Uuid, patch: DocumentPatch) -> Result<Document, StoreError> {
        let now = (self.clock)();
        self.commit(|manifest| manifest.update(id, patch, now).cloned())
    }

    pub fn remove(&mut self, id: Uuid) -> Result<Document, StoreError> {
        let now = (self.clock)();
        self.commit(|manifest| manifest.remove(id, now))
    }

    /// Removes documents of `provider` whose url is not in `keep_urls`.
    /// Nothing is written when no document matches.
    pub fn prune(&mut self, provider: &str, keep_urls: &[String]) -> Result<Vec<Document>, StoreError> {
        let mut next = self.manifest.clone();
        let pruned = next.prune(provider, keep_urls, (self.clock)());
        if pruned.is_empty() {
            return Ok(pruned);
        }
        self.persist(&next)?;
        self.manifest = next;
        engine_info!("Pruned {} documents of provider {}", pruned.len(), provider);
        Ok(pruned)
    }

    fn commit<T>(
        &mut self,
        mutate: impl FnOnce(&mut Manifest) -> Result<T, ValidationError>,
    ) -> Result<T, StoreError> {
        let mut next = self.manifest.clone();
        let result = mutate(&mut next)?;
        self.persist(&next)?;
        self.manifest = next;
        Ok(result)
    }

    fn persist(&mut self, manifest: &Manifest) -> Result<(), StoreError> {
        let mut bytes = serde_json::to_vec_pretty(manifest).map_err(StoreError::Serialize)?;
        bytes.push(b'\n');
        self.writer
            .write(&self.file_name, &bytes)
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.writes += 1;
        engine_debug!(
            "Wrote manifest {:?} ({} documents, {} bytes)",
            self.path,
            manifest.documents().len(),
            bytes.len()
        );
        Ok(())
    }
}
