use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::{Uuid, Variant, Version};

use crate::{normalize_topics, ValidationError};

/// One tracked documentation page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub provider: String,
    pub url: String,
    /// Storage path relative to the docs root, always `/`-separated.
    pub local_path: String,
    /// Hex SHA-256 of the markdown currently stored at `local_path`.
    pub hash: String,
    pub last_fetched: DateTime<Utc>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl Document {
    /// Creates a document with a freshly generated id and empty metadata.
    pub fn new(
        provider: impl Into<String>,
        url: impl Into<String>,
        local_path: impl Into<String>,
        hash: impl Into<String>,
        last_fetched: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            url: url.into(),
            local_path: local_path.into(),
            hash: hash.into(),
            last_fetched,
            category: String::new(),
            title: String::new(),
            description: String::new(),
            topics: Vec::new(),
        }
    }

    /// Checks the id and required fields, and lowercases topics in place.
    pub fn normalize(&mut self) -> Result<(), ValidationError> {
        if !is_uuid_v4(&self.id) {
            return Err(ValidationError::InvalidId(self.id));
        }
        if self.provider.trim().is_empty() {
            return Err(ValidationError::EmptyField("provider"));
        }
        if self.url.trim().is_empty() {
            return Err(ValidationError::EmptyField("url"));
        }
        if self.local_path.trim().is_empty() {
            return Err(ValidationError::EmptyField("local_path"));
        }
        self.topics = normalize_topics(&self.topics)?;
        Ok(())
    }

    /// Case-insensitive substring match over title, description and topics.
    /// `needle` must already be lowercase.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.topics.iter().any(|t| t.to_lowercase().contains(needle))
    }

    fn apply(&mut self, patch: DocumentPatch) {
        let DocumentPatch {
            hash,
            last_fetched,
            local_path,
            category,
            title,
            description,
            topics,
        } = patch;
        if let Some(hash) = hash {
            self.hash = hash;
        }
        if let Some(last_fetched) = last_fetched {
            self.last_fetched = last_fetched;
        }
        if let Some(local_path) = local_path {
            self.local_path = local_path;
        }
        if let Some(category) = category {
            self.category = category;
        }
        if let Some(title) = title {
            self.title = title;
        }
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(topics) = topics {
            self.topics = topics;
        }
    }

    /// Returns a copy with `patch` applied and re-validated.
    pub(crate) fn patched(&self, patch: DocumentPatch) -> Result<Self, ValidationError> {
        let mut next = self.clone();
        next.apply(patch);
        next.normalize()?;
        Ok(next)
    }
}

/// Partial update of a [`Document`]. `None` leaves a field untouched; `id`,
/// `provider` and `url` are immutable and have no counterpart here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPatch {
    pub hash: Option<String>,
    pub last_fetched: Option<DateTime<Utc>>,
    pub local_path: Option<String>,
    pub category: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub topics: Option<Vec<String>>,
}

pub fn is_uuid_v4(id: &Uuid) -> bool {
    id.get_version() == Some(Version::Random) && id.get_variant() == Variant::RFC4122
}
