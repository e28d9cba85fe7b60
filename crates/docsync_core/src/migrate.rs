use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::MANIFEST_VERSION;

const CURRENT_MAJOR: u64 = 2;
const PRIOR_MAJOR: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Already at the current schema; the value was not touched.
    Current,
    /// Upgraded in place from the recorded version (`None` when the field was missing).
    Migrated { from: Option<String> },
}

impl MigrationOutcome {
    pub fn is_migrated(&self) -> bool {
        matches!(self, MigrationOutcome::Migrated { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationError {
    #[error("manifest root is not a JSON object")]
    NotAnObject,
    #[error("unsupported manifest version {0}")]
    UnsupportedVersion(String),
    #[error("manifest `documents` is not an array of objects")]
    InvalidDocuments,
}

/// Upgrades a raw manifest to the current schema.
///
/// A missing version or a `1.x` version is upgraded: the index arrays are
/// initialized, documents without an `id` get a fresh v4 UUID, documents without
/// `topics` get an empty list, the indices are recomputed, and the version is bumped.
/// A current manifest is returned untouched, so running this twice is a no-op.
pub fn migrate_value(
    value: &mut Value,
    now: DateTime<Utc>,
) -> Result<MigrationOutcome, MigrationError> {
    let root = value.as_object_mut().ok_or(MigrationError::NotAnObject)?;
    let version = root.get("version").and_then(version_label);

    match version.as_deref().map(major_of) {
        Some(Some(CURRENT_MAJOR)) => return Ok(MigrationOutcome::Current),
        None | Some(Some(PRIOR_MAJOR)) => {}
        Some(_) => {
            return Err(MigrationError::UnsupportedVersion(
                version.unwrap_or_default(),
            ))
        }
    }

    let documents = root
        .entry("documents")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or(MigrationError::InvalidDocuments)?;

    let mut providers = BTreeSet::new();
    let mut categories = BTreeSet::new();
    for doc in documents.iter_mut() {
        let doc = doc.as_object_mut().ok_or(MigrationError::InvalidDocuments)?;
        upgrade_document(doc);
        if let Some(provider) = doc.get("provider").and_then(Value::as_str) {
            providers.insert(provider.to_string());
        }
        if let Some(category) = doc.get("category").and_then(Value::as_str) {
            if !category.is_empty() {
                categories.insert(category.to_string());
            }
        }
    }

    root.insert("providers".into(), string_array(providers));
    root.insert("categories".into(), string_array(categories));
    root.insert("version".into(), Value::String(MANIFEST_VERSION.to_string()));
    if !root.contains_key("last_updated") {
        root.insert("last_updated".into(), Value::String(now.to_rfc3339()));
    }

    Ok(MigrationOutcome::Migrated { from: version })
}

fn upgrade_document(doc: &mut Map<String, Value>) {
    let has_id = doc
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.trim().is_empty());
    if !has_id {
        doc.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
    }
    if !doc.get("topics").is_some_and(Value::is_array) {
        doc.insert("topics".into(), Value::Array(Vec::new()));
    }
}

fn version_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn major_of(version: &str) -> Option<u64> {
    version.trim().split('.').next()?.parse().ok()
}

fn string_array(values: BTreeSet<String>) -> Value {
    Value::Array(values.into_iter().map(Value::String).collect())
}

#[cfg(test)]
mod tests {
    use super::major_of;

    #[test]
    fn major_version_parsing() {
        assert_eq!(major_of("1.0"), Some(1));
        assert_eq!(major_of("2"), Some(2));
        assert_eq!(major_of("v2"), None);
    }
}
