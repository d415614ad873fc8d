use crate::{cache::LocalSnapshot, fetch::FetchConfiguration, peers::Peer};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{self, Duration, Instant};
use tooc_controller_core::{merge, rewrite, Configuration};
use tracing::{debug, warn};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no configuration available from the local cluster or any peer")]
    Exhausted,

    #[error("failed to build local configuration: {0:#}")]
    Local(#[source] anyhow::Error),
}

/// Combines the local snapshot with the namespaced configurations of every
/// peer.
pub struct Aggregator<L, F> {
    local: L,
    local_name: Option<String>,
    peers: Vec<Peer>,
    fetcher: F,
    deadline: Duration,
}

// === impl Aggregator ===

impl<L, F> Aggregator<L, F>
where
    L: LocalSnapshot,
    F: FetchConfiguration,
{
    pub fn new(local: L, fetcher: F, peers: Vec<Peer>, deadline: Duration) -> Self {
        Self {
            local,
            local_name: None,
            peers,
            fetcher,
            deadline,
        }
    }

    /// Namespaces the local configuration with `name` as well.
    pub fn with_local_name(mut self, name: Option<String>) -> Self {
        self.local_name = name.filter(|n| !n.is_empty());
        self
    }

    pub async fn configuration(&self) -> Result<Arc<Configuration>, AggregateError> {
        if self.peers.is_empty() {
            let local = self.local.snapshot().await.map_err(AggregateError::Local)?;
            return Ok(self.namespace_local(local));
        }

        let local = match self.local.snapshot().await {
            Ok(local) => Some(self.namespace_local(local)),
            Err(error) => {
                warn!(error = %format!("{error:#}"), "Omitting local configuration");
                None
            }
        };
        let peers = self.fetch_peers().await;

        if local.is_none() && peers.is_empty() {
            return Err(AggregateError::Exhausted);
        }

        let config = merge(std::iter::once(local.as_deref()).chain(peers.iter().map(Some)));
        debug!(
            peers = peers.len(),
            routers = config.router_count(),
            "Aggregated configuration"
        );
        Ok(Arc::new(config))
    }

    fn namespace_local(&self, local: Arc<Configuration>) -> Arc<Configuration> {
        match &self.local_name {
            Some(name) => Arc::new(rewrite(&local, name)),
            None => local,
        }
    }

    /// Fetches every peer concurrently. Results arriving after the deadline
    /// are dropped. Returned configurations are namespaced and in peer order.
    async fn fetch_peers(&self) -> Vec<Configuration> {
        let deadline = Instant::now() + self.deadline;
        let mut pending = self
            .peers
            .iter()
            .enumerate()
            .map(|(idx, peer)| async move { (idx, peer, self.fetcher.fetch(peer).await) })
            .collect::<FuturesUnordered<_>>();

        let mut fetched = Vec::with_capacity(self.peers.len());
        loop {
            match time::timeout_at(deadline, pending.next()).await {
                Ok(Some((idx, peer, Ok(config)))) => {
                    fetched.push((idx, rewrite(&config, &peer.name)));
                }
                Ok(Some((_, peer, Err(error)))) => {
                    warn!(peer = %peer.name, url = %peer.url, %error, "Failed to fetch configuration");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = pending.len(),
                        "Aggregation deadline elapsed; omitting outstanding peers"
                    );
                    break;
                }
            }
        }

        fetched.sort_by_key(|(idx, _)| *idx);
        fetched.into_iter().map(|(_, config)| config).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fetch::FetchError, peers::DEFAULT_TIMEOUT};
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tooc_controller_core::config::{Router, Service};

    struct StubLocal(Option<Configuration>);

    #[async_trait::async_trait]
    impl LocalSnapshot for StubLocal {
        async fn snapshot(&self) -> Result<Arc<Configuration>> {
            match &self.0 {
                Some(config) => Ok(Arc::new(config.clone())),
                None => anyhow::bail!("cluster unreachable"),
            }
        }
    }

    /// Returns a canned configuration per peer URL after a delay. Peers
    /// without an entry fail.
    #[derive(Default)]
    struct StubFetcher(HashMap<String, (Duration, Configuration)>);

    impl StubFetcher {
        fn with(mut self, peer: &Peer, delay: Duration, config: Configuration) -> Self {
            self.0.insert(peer.url.clone(), (delay, config));
            self
        }
    }

    #[async_trait::async_trait]
    impl FetchConfiguration for StubFetcher {
        async fn fetch(&self, peer: &Peer) -> Result<Configuration, FetchError> {
            match self.0.get(&peer.url) {
                Some((delay, config)) => {
                    time::sleep(*delay).await;
                    Ok(config.clone())
                }
                None => Err(FetchError::Status {
                    status: reqwest::StatusCode::BAD_GATEWAY,
                    body: String::new(),
                }),
            }
        }
    }

    fn mk_config(router: &str, host: &str) -> Configuration {
        let mut config = Configuration::default();
        config.http.routers.insert(
            router.to_string(),
            Router {
                entry_points: vec!["web".to_string()],
                service: "svc".to_string(),
                rule: format!("Host(`{host}`)"),
                ..Default::default()
            },
        );
        config.http.services.insert(
            "svc".to_string(),
            Service::load_balancer(vec![format!("http://{host}:80/")]),
        );
        config
    }

    fn mk_peer(name: &str) -> Peer {
        Peer::new(name, format!("https://{name}.example.com/"), DEFAULT_TIMEOUT, None)
    }

    fn router_keys(config: &Configuration) -> Vec<&str> {
        config.http.routers.keys().map(String::as_str).collect()
    }

    #[tokio::test]
    async fn local_only_passes_through() {
        let local = mk_config("r", "a.example.com");
        let aggregator = Aggregator::new(
            StubLocal(Some(local.clone())),
            StubFetcher::default(),
            vec![],
            DEFAULT_DEADLINE,
        );
        let config = aggregator.configuration().await.expect("must aggregate");
        assert_eq!(*config, local);
    }

    #[tokio::test]
    async fn local_only_propagates_error() {
        let aggregator = Aggregator::new(
            StubLocal(None),
            StubFetcher::default(),
            vec![],
            DEFAULT_DEADLINE,
        );
        let err = aggregator.configuration().await.expect_err("must fail");
        assert!(matches!(err, AggregateError::Local(_)), "{err}");
    }

    #[tokio::test]
    async fn tolerates_partial_failure() {
        let (east, west) = (mk_peer("east"), mk_peer("west"));
        let fetcher =
            StubFetcher::default().with(&west, Duration::ZERO, mk_config("r", "w.example.com"));
        let aggregator =
            Aggregator::new(StubLocal(None), fetcher, vec![east, west], DEFAULT_DEADLINE);

        let config = aggregator.configuration().await.expect("must aggregate");
        assert_eq!(router_keys(&config), vec!["west-r"]);
        assert_eq!(config.http.routers["west-r"].service, "west-svc");
    }

    #[tokio::test]
    async fn merges_local_with_surviving_peers() {
        let (p1, p2, p3) = (mk_peer("p1"), mk_peer("p2"), mk_peer("p3"));
        let local = mk_config("r", "local.example.com");
        let c1 = mk_config("r", "one.example.com");
        let c3 = mk_config("r", "three.example.com");
        let fetcher = StubFetcher::default()
            .with(&p1, Duration::ZERO, c1.clone())
            .with(&p3, Duration::ZERO, c3.clone());
        let aggregator = Aggregator::new(
            StubLocal(Some(local.clone())),
            fetcher,
            vec![p1, p2, p3],
            DEFAULT_DEADLINE,
        );

        let config = aggregator.configuration().await.expect("must aggregate");
        let expected = merge([
            Some(&local),
            Some(&rewrite(&c1, "p1")),
            Some(&rewrite(&c3, "p3")),
        ]);
        assert_eq!(*config, expected);
        assert_eq!(router_keys(&config), vec!["p1-r", "p3-r", "r"]);
    }

    #[tokio::test]
    async fn exhausted_without_any_configuration() {
        let aggregator = Aggregator::new(
            StubLocal(None),
            StubFetcher::default(),
            vec![mk_peer("east"), mk_peer("west")],
            DEFAULT_DEADLINE,
        );
        let err = aggregator.configuration().await.expect_err("must fail");
        assert!(matches!(err, AggregateError::Exhausted), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn merges_in_peer_order() {
        // Both peers share a tag, so their keys collide. The first peer
        // completes last but the second still wins.
        let one = Peer::new("dup", "https://one.example.com/", DEFAULT_TIMEOUT, None);
        let two = Peer::new("dup", "https://two.example.com/", DEFAULT_TIMEOUT, None);
        let fetcher = StubFetcher::default()
            .with(&one, Duration::from_secs(2), mk_config("r", "one.example.com"))
            .with(&two, Duration::from_secs(1), mk_config("r", "two.example.com"));
        let aggregator = Aggregator::new(
            StubLocal(Some(mk_config("r", "local.example.com"))),
            fetcher,
            vec![one, two],
            DEFAULT_DEADLINE,
        );

        let config = aggregator.configuration().await.expect("must aggregate");
        assert_eq!(router_keys(&config), vec!["dup-r", "r"]);
        assert_eq!(config.http.routers["dup-r"].rule, "Host(`two.example.com`)");
        assert_eq!(config.http.routers["r"].service, "svc");
    }

    #[tokio::test(start_paused = true)]
    async fn drops_late_peers() {
        let (slow, fast) = (mk_peer("slow"), mk_peer("fast"));
        let fetcher = StubFetcher::default()
            .with(&slow, Duration::from_secs(60), mk_config("r", "s.example.com"))
            .with(&fast, Duration::from_secs(1), mk_config("r", "f.example.com"));
        let aggregator = Aggregator::new(
            StubLocal(None),
            fetcher,
            vec![slow, fast],
            Duration::from_secs(5),
        );

        let config = aggregator.configuration().await.expect("must aggregate");
        assert_eq!(router_keys(&config), vec!["fast-r"]);
    }

    #[tokio::test]
    async fn namespaces_local_when_named() {
        let aggregator = Aggregator::new(
            StubLocal(Some(mk_config("r", "local.example.com"))),
            StubFetcher::default(),
            vec![],
            DEFAULT_DEADLINE,
        )
        .with_local_name(Some("home".to_string()));

        let config = aggregator.configuration().await.expect("must aggregate");
        assert_eq!(router_keys(&config), vec!["home-r"]);
        assert_eq!(config.http.routers["home-r"].service, "home-svc");
    }
}
