use std::process::ExitCode;

use anyhow::{Context, Result};
use docsync_core::{ProviderEntry, RunSummary, SearchFilters};
use docsync_engine::{ManifestStore, SyncOrchestrator};
use engine_logging::engine_warn;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

fn open_store(config: &AppConfig) -> Result<ManifestStore> {
    ManifestStore::open(&config.manifest)
        .with_context(|| format!("Failed to open manifest {}", config.manifest.display()))
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn report(summary: &RunSummary) {
    println!("{summary}");
    for failure in &summary.errors {
        println!("  failed {}: {}", failure.url, failure.reason);
    }
    if summary.cancelled {
        println!("  cancelled before every page was processed");
    }
}

/// Cancels the returned token on Ctrl-C so a run stops at the next page boundary.
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            engine_warn!("Interrupt received; stopping after the current page");
            trigger.cancel();
        }
    });
    token
}

pub(crate) async fn sync(config: &AppConfig, providers: &[String]) -> Result<ExitCode> {
    let names: Vec<String> = if providers.is_empty() {
        config.providers.keys().cloned().collect()
    } else {
        providers.to_vec()
    };
    let mut orchestrator =
        SyncOrchestrator::with_defaults(config.sync_config()?, open_store(config)?)?;
    let cancel = cancel_on_interrupt();

    let mut success = true;
    for name in &names {
        let entries = config.entries(name)?;
        let summary = orchestrator.sync_until(name, entries, &cancel).await?;
        report(&summary);
        success &= summary.is_success();
        if summary.cancelled {
            break;
        }
    }
    Ok(exit_code(success))
}

pub(crate) async fn fetch(
    config: &AppConfig,
    provider: &str,
    url: &str,
    category: &str,
) -> Result<ExitCode> {
    let mut orchestrator =
        SyncOrchestrator::with_defaults(config.sync_config()?, open_store(config)?)?;
    let summary = orchestrator
        .sync_one(provider, &ProviderEntry::new(url, category))
        .await?;
    report(&summary);
    Ok(exit_code(summary.is_success()))
}

pub(crate) fn search(
    config: &AppConfig,
    query: &str,
    provider: Option<String>,
    category: Option<String>,
    json: bool,
) -> Result<ExitCode> {
    let store = open_store(config)?;
    let filters = SearchFilters { provider, category };
    let hits = store.search(query, &filters);

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        for doc in &hits {
            let title = if doc.title.is_empty() { &doc.url } else { &doc.title };
            println!("{}\t{}\t{}\t{}", doc.provider, doc.category, title, doc.local_path);
        }
        println!("{} documents", hits.len());
    }
    Ok(ExitCode::SUCCESS)
}

pub(crate) fn providers(config: &AppConfig) -> Result<ExitCode> {
    for name in open_store(config)?.list_providers() {
        println!("{name}");
    }
    Ok(ExitCode::SUCCESS)
}

pub(crate) fn categories(config: &AppConfig) -> Result<ExitCode> {
    for name in open_store(config)?.list_categories() {
        println!("{name}");
    }
    Ok(ExitCode::SUCCESS)
}

pub(crate) fn prune(config: &AppConfig, provider: &str) -> Result<ExitCode> {
    let keep: Vec<String> = config
        .providers
        .get(provider)
        .map(|entries| entries.iter().map(|e| e.url.clone()).collect())
        .unwrap_or_default();
    let mut store = open_store(config)?;
    let pruned = store.prune(provider, &keep)?;
    for doc in &pruned {
        println!("pruned {} ({})", doc.url, doc.local_path);
    }
    println!("{} documents pruned", pruned.len());
    Ok(ExitCode::SUCCESS)
}

pub(crate) fn migrate(config: &AppConfig) -> Result<ExitCode> {
    if !config.manifest.exists() {
        println!("no manifest at {}", config.manifest.display());
        return Ok(ExitCode::SUCCESS);
    }
    let store = open_store(config)?;
    let manifest = store.manifest();
    if store.writes() > 0 {
        println!(
            "migrated {} to version {} ({} documents)",
            config.manifest.display(),
            manifest.version(),
            manifest.documents().len()
        );
    } else {
        println!(
            "{} is already at version {}",
            config.manifest.display(),
            manifest.version()
        );
    }
    Ok(ExitCode::SUCCESS)
}
