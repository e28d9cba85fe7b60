use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use bytes::BytesMut;
use engine_logging::{engine_debug, engine_warn};
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::{FailureKind, FetchError, FetchMetadata, FetchOutput};

pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    /// Budget for the whole request, body included.
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    /// Hosts that may be contacted. An entry `*.example.com` admits every
    /// subdomain of `example.com` but not the bare domain.
    pub allowed_hosts: Vec<String>,
    /// When false, plain `http` is accepted as well. Only meant for local test servers.
    pub require_https: bool,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: DEFAULT_MAX_BYTES,
            allowed_hosts: Vec::new(),
            require_https: true,
            user_agent: concat!("docsync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchSettings {
    pub fn with_allowed_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Parses `raw` and checks it against the transport and host policy.
    pub fn check_url(&self, raw: &str) -> Result<Url, FetchError> {
        let parsed = Url::parse(raw)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        match policy_violation(&parsed, &self.allowed_hosts, self.require_https) {
            Some(err) => Err(err),
            None => Ok(parsed),
        }
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError>;
}

/// Single-attempt HTTP retrieval. Retrying is left to the caller.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    fn build_client(
        &self,
        redirect_counter: Arc<AtomicUsize>,
        blocked: Arc<Mutex<Option<FetchError>>>,
    ) -> Result<reqwest::Client, FetchError> {
        let redirect_limit = self.settings.redirect_limit;
        let allowed_hosts = self.settings.allowed_hosts.clone();
        let require_https = self.settings.require_https;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            let count = attempt.previous().len();
            redirect_counter.store(count, Ordering::Relaxed);
            if let Some(violation) = policy_violation(attempt.url(), &allowed_hosts, require_https)
            {
                if let Ok(mut slot) = blocked.lock() {
                    *slot = Some(violation);
                }
                attempt.error("redirect target not allowed")
            } else if count >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });

        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .user_agent(self.settings.user_agent.clone())
            .redirect(policy)
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))
    }

    fn size_exceeded(&self, actual: u64) -> FetchError {
        FetchError::new(
            FailureKind::SizeExceeded {
                max_bytes: self.settings.max_bytes,
                actual: Some(actual),
            },
            "response too large",
        )
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        let parsed = self.settings.check_url(url).inspect_err(|err| {
            engine_warn!("Refusing to fetch {}: {}", url, err);
        })?;

        let redirect_counter = Arc::new(AtomicUsize::new(0));
        let blocked = Arc::new(Mutex::new(None));
        let client = self.build_client(redirect_counter.clone(), blocked.clone())?;

        engine_debug!("GET {}", parsed);
        let response = match client.get(parsed).send().await {
            Ok(response) => response,
            Err(err) => {
                let violation = blocked.lock().ok().and_then(|mut slot| slot.take());
                return Err(violation.unwrap_or_else(|| map_reqwest_error(err)));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(self.size_exceeded(content_len));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = body.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(self.size_exceeded(next_len));
            }
            body.extend_from_slice(&chunk);
        }

        let metadata = FetchMetadata {
            original_url: url.to_string(),
            final_url,
            redirect_count: redirect_counter.load(Ordering::Relaxed),
            content_type,
            byte_len: body.len() as u64,
        };
        engine_debug!(
            "Fetched {} ({} bytes, {} redirects)",
            metadata.final_url,
            metadata.byte_len,
            metadata.redirect_count
        );

        Ok(FetchOutput {
            bytes: body.freeze(),
            metadata,
        })
    }
}

fn policy_violation(url: &Url, allowed_hosts: &[String], require_https: bool) -> Option<FetchError> {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let scheme = url.scheme();
    let scheme_ok = scheme == "https" || (!require_https && scheme == "http");
    if !scheme_ok {
        return Some(FetchError::new(
            FailureKind::DomainNotAllowed { host },
            format!("scheme `{scheme}` is not permitted"),
        ));
    }
    if !host_allowed(&host, allowed_hosts) {
        return Some(FetchError::new(
            FailureKind::DomainNotAllowed { host },
            "host is not in the allowlist",
        ));
    }
    None
}

fn host_allowed(host: &str, allowed_hosts: &[String]) -> bool {
    if host.is_empty() {
        return false;
    }
    allowed_hosts.iter().any(|entry| {
        let entry = entry.trim().to_ascii_lowercase();
        match entry.strip_prefix("*.") {
            Some(domain) => host.len() > domain.len() && host.ends_with(&format!(".{domain}")),
            None => host == entry,
        }
    })
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
