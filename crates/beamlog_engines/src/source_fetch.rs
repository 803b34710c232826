#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use beamlog_kernel_contracts::signal::SignalKind;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub const HTTP_TIMEOUT_MS_DEFAULT: u64 = 10_000;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source unreachable url={url} error={kind}")]
    Transport { url: String, kind: &'static str },
    #[error("source returned non-success status url={url} status={status}")]
    HttpStatus { url: String, status: u16 },
    #[error("source body is not valid json url={url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("fixture payload unreadable path={}: {source}", .path.display())]
    Fixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn url(&self) -> String {
        match self {
            Self::Transport { url, .. } | Self::HttpStatus { url, .. } | Self::Parse { url, .. } => {
                url.clone()
            }
            Self::Fixture { path, .. } => format!("file://{}", path.display()),
        }
    }
}

/// A successfully read source document.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPayload {
    pub url: String,
    pub document: Value,
    pub raw: String,
}

impl FetchedPayload {
    pub fn parse(url: &str, raw: String) -> Result<Self, FetchError> {
        let document = serde_json::from_str(&raw).map_err(|source| FetchError::Parse {
            url: url.to_string(),
            source,
        })?;
        Ok(Self {
            url: url.to_string(),
            document,
            raw,
        })
    }
}

/// Single-attempt reader for one source URL.
pub trait SourceFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFetchConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl HttpFetchConfig {
    pub fn standard_v1() -> Self {
        Self {
            timeout_ms: HTTP_TIMEOUT_MS_DEFAULT,
            user_agent: format!("beamlog/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpSourceFetcher {
    agent: ureq::Agent,
}

impl HttpSourceFetcher {
    pub fn new(config: &HttpFetchConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms.max(100));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(&config.user_agent)
            .build();
        Self { agent }
    }
}

impl SourceFetcher for HttpSourceFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError> {
        let response = self
            .agent
            .get(url)
            .set("Accept", "application/json")
            .call()
            .map_err(|err| fetch_error_from_ureq(url, err))?;
        let raw = response.into_string().map_err(|err| FetchError::Transport {
            url: url.to_string(),
            kind: classify_transport_error_kind(&err.to_string()),
        })?;
        FetchedPayload::parse(url, raw)
    }
}

/// Serves every URL from one local file, for offline runs.
#[derive(Debug, Clone)]
pub struct FixtureSourceFetcher {
    path: PathBuf,
}

impl FixtureSourceFetcher {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SourceFetcher for FixtureSourceFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| FetchError::Fixture {
            path: self.path.clone(),
            source,
        })?;
        FetchedPayload::parse(url, raw)
    }
}

fn fetch_error_from_ureq(url: &str, err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::Status(status, _) => FetchError::HttpStatus {
            url: url.to_string(),
            status,
        },
        ureq::Error::Transport(transport) => {
            let combined = format!("{:?} {}", transport.kind(), transport);
            FetchError::Transport {
                url: url.to_string(),
                kind: classify_transport_error_kind(&combined),
            }
        }
    }
}

fn classify_transport_error_kind(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") || lower.contains("certificate") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connection") || lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}

/// Which URLs feed which signals. Signals without an override read the primary document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePlan {
    pub primary_url: String,
    pub signal_urls: BTreeMap<SignalKind, String>,
}

impl SourcePlan {
    pub fn single(primary_url: impl Into<String>) -> Self {
        Self {
            primary_url: primary_url.into(),
            signal_urls: BTreeMap::new(),
        }
    }

    /// Distinct URLs in fetch order, primary first.
    pub fn urls(&self) -> Vec<&str> {
        let mut urls = vec![self.primary_url.as_str()];
        for url in self.signal_urls.values() {
            if !urls.contains(&url.as_str()) {
                urls.push(url.as_str());
            }
        }
        urls
    }
}

/// Everything one cycle read from its sources.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchBundle {
    pub primary: FetchedPayload,
    /// Per-signal override documents. `None` marks an override whose fetch failed.
    pub signal_payloads: BTreeMap<SignalKind, Option<FetchedPayload>>,
}

impl FetchBundle {
    pub fn single(primary: FetchedPayload) -> Self {
        Self {
            primary,
            signal_payloads: BTreeMap::new(),
        }
    }

    pub fn document_for(&self, kind: SignalKind) -> Option<&Value> {
        match self.signal_payloads.get(&kind) {
            Some(Some(payload)) => Some(&payload.document),
            Some(None) => None,
            None => Some(&self.primary.document),
        }
    }

    /// Source URLs consulted, primary first, without repeats.
    pub fn source_urls(&self) -> Vec<String> {
        let mut urls = vec![self.primary.url.clone()];
        for payload in self.signal_payloads.values().flatten() {
            if !urls.contains(&payload.url) {
                urls.push(payload.url.clone());
            }
        }
        urls
    }

    /// Raw text of every distinct document, joined for text-signature scanning.
    pub fn combined_text(&self) -> String {
        let mut seen = vec![self.primary.url.as_str()];
        let mut text = self.primary.raw.clone();
        for payload in self.signal_payloads.values().flatten() {
            if seen.contains(&payload.url.as_str()) {
                continue;
            }
            seen.push(payload.url.as_str());
            text.push('\n');
            text.push_str(&payload.raw);
        }
        text
    }
}

/// Fetches every distinct URL in the plan, concurrently when there is more than one.
/// A failed primary fails the bundle; a failed override only blanks its signal.
pub fn fetch_bundle<F>(fetcher: &F, plan: &SourcePlan) -> Result<FetchBundle, FetchError>
where
    F: SourceFetcher + Sync + ?Sized,
{
    let urls = plan.urls();
    let results: Vec<Result<FetchedPayload, FetchError>> = if urls.len() == 1 {
        vec![fetcher.fetch(urls[0])]
    } else {
        thread::scope(|scope| {
            let handles: Vec<_> = urls
                .iter()
                .map(|url| scope.spawn(move || fetcher.fetch(url)))
                .collect();
            handles
                .into_iter()
                .zip(urls.iter())
                .map(|(handle, url)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(FetchError::Transport {
                            url: url.to_string(),
                            kind: "fetch_panicked",
                        })
                    })
                })
                .collect()
        })
    };

    let mut by_url: BTreeMap<&str, Result<FetchedPayload, FetchError>> =
        urls.iter().copied().zip(results).collect();
    let primary = by_url
        .remove(plan.primary_url.as_str())
        .unwrap_or_else(|| {
            Err(FetchError::Transport {
                url: plan.primary_url.clone(),
                kind: "transport",
            })
        })?;
    debug!(url = %primary.url, bytes = primary.raw.len(), "primary source fetched");

    let mut signal_payloads = BTreeMap::new();
    for (kind, url) in &plan.signal_urls {
        let payload = if *url == plan.primary_url {
            Some(primary.clone())
        } else {
            match by_url.get(url.as_str()) {
                Some(Ok(payload)) => Some(payload.clone()),
                Some(Err(err)) => {
                    warn!(signal = kind.as_str(), error = %err, "signal source failed; signal left empty");
                    None
                }
                None => None,
            }
        };
        signal_payloads.insert(*kind, payload);
    }

    Ok(FetchBundle {
        primary,
        signal_payloads,
    })
}
