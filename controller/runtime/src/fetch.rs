use crate::{metrics::FetchMetrics, peers::Peer};
use std::path::PathBuf;
use thiserror::Error;
use tooc_controller_core::Configuration;
use tracing::debug;

/// Error bodies are truncated to this many bytes.
const MAX_ERROR_BODY: usize = 512;

/// Retrieves a peer's dynamic configuration.
#[async_trait::async_trait]
pub trait FetchConfiguration: Send + Sync + 'static {
    async fn fetch(&self, peer: &Peer) -> Result<Configuration, FetchError>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to read CA file {}: {source}", path.display())]
    ReadCa {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CA file {}: {reason}", path.display())]
    InvalidCa { path: PathBuf, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to decode configuration: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Fetches peer configurations over HTTP(S).
///
/// A client is built for every fetch so that changes to a peer's CA bundle
/// are picked up without a restart.
#[derive(Clone, Debug, Default)]
pub struct HttpsFetcher {
    metrics: FetchMetrics,
}

// === impl HttpsFetcher ===

impl HttpsFetcher {
    pub fn new(metrics: FetchMetrics) -> Self {
        Self { metrics }
    }

    async fn get(peer: &Peer) -> Result<Configuration, FetchError> {
        let mut client = reqwest::Client::builder().timeout(peer.timeout);
        if let Some(path) = &peer.root_ca_file {
            let pem = tokio::fs::read(path)
                .await
                .map_err(|source| FetchError::ReadCa {
                    path: path.clone(),
                    source,
                })?;
            let certs =
                reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| FetchError::InvalidCa {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            if certs.is_empty() {
                return Err(FetchError::InvalidCa {
                    path: path.clone(),
                    reason: "no PEM certificates found".to_string(),
                });
            }
            client = client.tls_built_in_root_certs(false);
            for ca in certs {
                client = client.add_root_certificate(ca);
            }
        }
        let client = client.build().map_err(FetchError::Client)?;

        let rsp = client
            .get(&peer.url)
            .send()
            .await
            .map_err(FetchError::Request)?;
        let status = rsp.status();
        if !status.is_success() {
            let mut body = rsp.text().await.unwrap_or_default();
            truncate(&mut body, MAX_ERROR_BODY);
            return Err(FetchError::Status { status, body });
        }

        let body = rsp.bytes().await.map_err(FetchError::Request)?;
        serde_json::from_slice(&body).map_err(FetchError::Decode)
    }
}

fn truncate(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

#[async_trait::async_trait]
impl FetchConfiguration for HttpsFetcher {
    async fn fetch(&self, peer: &Peer) -> Result<Configuration, FetchError> {
        let res = Self::get(peer).await;
        match &res {
            Ok(config) => {
                debug!(peer = %peer.name, routers = config.router_count(), "Fetched configuration");
                self.metrics.success(&peer.name);
            }
            Err(_) => self.metrics.error(&peer.name),
        }
        res
    }
}
