use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Document, DocumentPatch, ValidationError};

/// Current on-disk schema version.
pub const MANIFEST_VERSION: &str = "2.0";

/// The document catalog.
///
/// `providers` and `categories` are caches of the distinct, sorted values found in
/// `documents`. Every mutating method recomputes them, so they can never drift from
/// the document list held in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    version: String,
    last_updated: DateTime<Utc>,
    #[serde(default)]
    providers: Vec<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    documents: Vec<Document>,
}

/// Optional narrowing applied after the text match in [`Manifest::search`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub provider: Option<String>,
    pub category: Option<String>,
}

impl SearchFilters {
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    fn admits(&self, doc: &Document) -> bool {
        self.provider.as_deref().map_or(true, |p| doc.provider == p)
            && self.category.as_deref().map_or(true, |c| doc.category == c)
    }
}

impl Manifest {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            last_updated: now,
            providers: Vec::new(),
            categories: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn get(&self, id: Uuid) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn get_by_url(&self, provider: &str, url: &str) -> Option<&Document> {
        self.documents
            .iter()
            .find(|d| d.provider == provider && d.url == url)
    }

    pub fn get_by_local_path(&self, local_path: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.local_path == local_path)
    }

    /// Validates and appends a new document.
    pub fn insert(
        &mut self,
        mut document: Document,
        now: DateTime<Utc>,
    ) -> Result<&Document, ValidationError> {
        document.normalize()?;
        if self.get(document.id).is_some() {
            return Err(ValidationError::DuplicateId(document.id));
        }
        if self.get_by_url(&document.provider, &document.url).is_some() {
            return Err(ValidationError::DuplicateUrl {
                provider: document.provider,
                url: document.url,
            });
        }
        if self.get_by_local_path(&document.local_path).is_some() {
            return Err(ValidationError::DuplicateLocalPath(document.local_path));
        }
        self.documents.push(document);
        self.touch(now);
        let last = self.documents.len() - 1;
        Ok(&self.documents[last])
    }

    /// Applies `patch` to the document with `id`. Nothing changes on error.
    pub fn update(
        &mut self,
        id: Uuid,
        patch: DocumentPatch,
        now: DateTime<Utc>,
    ) -> Result<&Document, ValidationError> {
        let index = self.position(id)?;
        let next = self.documents[index].patched(patch)?;
        let path_taken = self
            .documents
            .iter()
            .any(|d| d.id != id && d.local_path == next.local_path);
        if path_taken {
            return Err(ValidationError::DuplicateLocalPath(next.local_path));
        }
        self.documents[index] = next;
        self.touch(now);
        Ok(&self.documents[index])
    }

    pub fn remove(&mut self, id: Uuid, now: DateTime<Utc>) -> Result<Document, ValidationError> {
        let index = self.position(id)?;
        let removed = self.documents.remove(index);
        self.touch(now);
        Ok(removed)
    }

    /// Removes every document of `provider` whose url is not in `keep_urls` and
    /// returns the removed documents in catalog order.
    pub fn prune(
        &mut self,
        provider: &str,
        keep_urls: &[String],
        now: DateTime<Utc>,
    ) -> Vec<Document> {
        let keep: HashSet<&str> = keep_urls.iter().map(String::as_str).collect();
        let (pruned, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.documents)
            .into_iter()
            .partition(|d| d.provider == provider && !keep.contains(d.url.as_str()));
        self.documents = kept;
        if !pruned.is_empty() {
            self.touch(now);
        }
        pruned
    }

    /// Case-insensitive substring search over title, description and topics.
    /// An empty query matches every document admitted by `filters`.
    pub fn search(&self, query: &str, filters: &SearchFilters) -> Vec<&Document> {
        let needle = query.trim().to_lowercase();
        self.documents
            .iter()
            .filter(|d| filters.admits(d))
            .filter(|d| needle.is_empty() || d.matches(&needle))
            .collect()
    }

    /// Checks every document and the uniqueness constraints, normalizing topics.
    /// Used after loading a manifest from disk.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        let mut ids = HashSet::new();
        let mut urls = HashSet::new();
        let mut paths = HashSet::new();
        for doc in &mut self.documents {
            doc.normalize()?;
            if !ids.insert(doc.id) {
                return Err(ValidationError::DuplicateId(doc.id));
            }
            if !urls.insert((doc.provider.clone(), doc.url.clone())) {
                return Err(ValidationError::DuplicateUrl {
                    provider: doc.provider.clone(),
                    url: doc.url.clone(),
                });
            }
            if !paths.insert(doc.local_path.clone()) {
                return Err(ValidationError::DuplicateLocalPath(doc.local_path.clone()));
            }
        }
        self.recompute_indices();
        Ok(())
    }

    /// Rebuilds `providers` and `categories` from the documents.
    pub fn recompute_indices(&mut self) {
        let providers: BTreeSet<&str> = self.documents.iter().map(|d| d.provider.as_str()).collect();
        let categories: BTreeSet<&str> = self
            .documents
            .iter()
            .map(|d| d.category.as_str())
            .filter(|c| !c.is_empty())
            .collect();
        self.providers = providers.into_iter().map(str::to_string).collect();
        self.categories = categories.into_iter().map(str::to_string).collect();
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.recompute_indices();
        self.last_updated = now;
    }

    fn position(&self, id: Uuid) -> Result<usize, ValidationError> {
        self.documents
            .iter()
            .position(|d| d.id == id)
            .ok_or(ValidationError::UnknownId(id))
    }
}
