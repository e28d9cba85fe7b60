//! RON configuration file for the `docsync` binary.
//!
//! Relative paths are resolved against the directory holding the config file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use docsync_core::ProviderEntry;
use docsync_engine::{FetchSettings, RateLimitSettings, SyncConfig, DEFAULT_MAX_BYTES};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct AppConfig {
    pub manifest: PathBuf,
    pub docs_root: PathBuf,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    /// Provider name to its pages, in sync order.
    #[serde(default)]
    pub providers: BTreeMap<String, Vec<ProviderEntry>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FetchSection {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    /// Hosts allowed in addition to those of the configured provider pages.
    pub allowed_hosts: Vec<String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            redirect_limit: 5,
            max_bytes: DEFAULT_MAX_BYTES,
            allowed_hosts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RateLimitSection {
    pub capacity: u32,
    pub per_second: f64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        let defaults = RateLimitSettings::default();
        Self {
            capacity: defaults.capacity,
            per_second: defaults.per_second,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse(&text, base)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str, base: &Path) -> Result<Self> {
        let mut config: AppConfig = ron::from_str(text)?;
        config.manifest = base.join(&config.manifest);
        config.docs_root = base.join(&config.docs_root);
        for (name, entries) in &config.providers {
            if name.trim().is_empty() {
                bail!("provider names must not be empty");
            }
            if entries.iter().any(|e| e.url.trim().is_empty()) {
                bail!("provider {name} has an entry without a url");
            }
        }
        Ok(config)
    }

    pub fn entries(&self, provider: &str) -> Result<&[ProviderEntry]> {
        match self.providers.get(provider) {
            Some(entries) => Ok(entries),
            None => bail!("provider {provider} is not configured"),
        }
    }

    /// Explicitly listed hosts followed by the hosts of every provider page.
    pub fn allowed_hosts(&self) -> Vec<String> {
        let mut hosts = self.fetch.allowed_hosts.clone();
        let configured = self
            .providers
            .values()
            .flatten()
            .filter_map(|entry| Url::parse(&entry.url).ok())
            .filter_map(|url| url.host_str().map(str::to_ascii_lowercase));
        for host in configured {
            if !hosts.contains(&host) {
                hosts.push(host);
            }
        }
        hosts
    }

    pub fn sync_config(&self) -> Result<SyncConfig> {
        let fetch = FetchSettings {
            connect_timeout: Duration::from_secs(self.fetch.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.fetch.request_timeout_secs),
            redirect_limit: self.fetch.redirect_limit,
            max_bytes: self.fetch.max_bytes,
            ..FetchSettings::default()
        }
        .with_allowed_hosts(self.allowed_hosts());
        let config = SyncConfig {
            fetch,
            rate_limit: RateLimitSettings {
                capacity: self.rate_limit.capacity,
                per_second: self.rate_limit.per_second,
            },
            ..SyncConfig::default_with_docs_root(self.docs_root.clone())
        };
        config.validate()?;
        Ok(config)
    }
}
