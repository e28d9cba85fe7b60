use serde::{Deserialize, Serialize};

/// One configured page of a provider, in sync order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub url: String,
    pub category: String,
}

impl ProviderEntry {
    pub fn new(url: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            category: category.into(),
        }
    }
}
