use crate::{
    aggregate::Aggregator,
    cache::LocalConfig,
    cluster::KubeConnect,
    fetch::HttpsFetcher,
    metrics::Metrics,
    peers::Peer,
    server::{self, Handler},
};
use anyhow::{Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::time::Duration;
use tooc_controller_core::{RoutingConfig, Synthesizer, Upstream};
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "tooc",
    about = "Publishes exported ingresses as Traefik dynamic configuration"
)]
pub struct Args {
    #[clap(long, default_value = "tooc=info,warn", env = "TOOC_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain", env = "TOOC_LOG_FORMAT")]
    log_format: kubert::LogFormat,

    #[clap(long, default_value = "0.0.0.0:8080", env = "TOOC_ADDR")]
    addr: SocketAddr,

    /// Path to a kubeconfig. When unset, the configuration is inferred.
    #[clap(long, env = "TOOC_CLUSTER_KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Address used for ingresses that have no load balancer status.
    #[clap(long, env = "TOOC_CLUSTER_INGRESS_ADDRESS")]
    ingress_address: Option<String>,

    #[clap(long, default_value = "80", env = "TOOC_CLUSTER_INGRESS_HTTP_PORT")]
    http_port: u16,

    #[clap(long, default_value = "http", env = "TOOC_CLUSTER_INGRESS_HTTP_PROTOCOL")]
    http_protocol: String,

    #[clap(long, default_value = "443", env = "TOOC_CLUSTER_INGRESS_HTTPS_PORT")]
    https_port: u16,

    #[clap(
        long,
        default_value = "https",
        env = "TOOC_CLUSTER_INGRESS_HTTPS_PROTOCOL"
    )]
    https_protocol: String,

    /// HTTP port used for backends whose hostname is rewritten.
    #[clap(long, env = "TOOC_CLUSTER_INGRESS_ALT_HTTP_PORT")]
    alt_http_port: Option<u16>,

    /// HTTPS port used for backends whose hostname is rewritten.
    #[clap(long, env = "TOOC_CLUSTER_INGRESS_ALT_HTTPS_PORT")]
    alt_https_port: Option<u16>,

    /// CA bundle, as seen by Traefik, for re-encrypting transports. Empty
    /// disables it.
    #[clap(
        long,
        default_value = "/etc/traefik/root.crt",
        env = "TOOC_CLUSTER_ROOTCAFILENAME"
    )]
    root_ca_file: String,

    #[clap(long, default_value = "web", env = "TOOC_TRAEFIK_HTTP_ENTRYPOINT_NAME")]
    http_entrypoint: String,

    #[clap(
        long,
        default_value = "websecure",
        env = "TOOC_TRAEFIK_HTTPS_ENTRYPOINT_NAME"
    )]
    https_entrypoint: String,

    /// How long a synthesized local configuration is reused.
    #[clap(long, default_value = "5", env = "TOOC_CACHE_TTL")]
    cache_ttl_secs: u64,

    /// Upper bound on the time spent fetching all peers.
    #[clap(long, default_value = "30", env = "TOOC_AGGREGATION_TIMEOUT")]
    aggregation_timeout_secs: u64,

    /// Namespaces the local configuration when set.
    #[clap(long, env = "TOOC_CLUSTER_NAME")]
    cluster_name: Option<String>,

    /// Disables the metrics endpoint.
    #[clap(long, env = "TOOC_PROMETHEUS_DISABLED")]
    metrics_disabled: bool,

    #[clap(long, default_value = "/metrics", env = "TOOC_PROMETHEUS_ENDPOINT")]
    metrics_path: String,

    #[clap(long, default_value = "/health", env = "TOOC_HEALTH_ENDPOINT")]
    health_path: String,
}

impl Args {
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            addr,
            kubeconfig,
            ingress_address,
            http_port,
            http_protocol,
            https_port,
            https_protocol,
            alt_http_port,
            alt_https_port,
            root_ca_file,
            http_entrypoint,
            https_entrypoint,
            cache_ttl_secs,
            aggregation_timeout_secs,
            cluster_name,
            metrics_disabled,
            metrics_path,
            health_path,
        } = self;

        log_format
            .try_init(log_level)
            .expect("must configure logging");

        let peers = Peer::from_env(std::env::vars());
        for peer in &peers {
            info!(
                peer = %peer.name,
                url = %peer.url,
                timeout = ?peer.timeout,
                ca = ?peer.root_ca_file,
                "Registered child controller"
            );
        }

        let mut prom = Registry::default();
        let metrics = Metrics::register(&mut prom);

        let routing = RoutingConfig {
            default_address: ingress_address.filter(|a| !a.trim().is_empty()),
            http: Upstream {
                port: http_port,
                protocol: http_protocol,
            },
            https: Upstream {
                port: https_port,
                protocol: https_protocol,
            },
            alt_http_port,
            alt_https_port,
            http_entrypoint,
            https_entrypoint,
            root_ca_file: Some(root_ca_file).filter(|f| !f.is_empty()),
        };
        let cache_ttl = Duration::from_secs(cache_ttl_secs);
        let local = LocalConfig::new(
            KubeConnect::new(kubeconfig, cache_ttl),
            Synthesizer::new(routing),
            cache_ttl,
            metrics.synthesis.clone(),
        );

        // A peer-only deployment may start without a reachable cluster.
        match local.get().await {
            Ok(config) => info!(routers = config.router_count(), "Initial configuration built"),
            Err(error) if peers.is_empty() => {
                return Err(error.context("failed to build initial configuration"));
            }
            Err(error) => {
                warn!(error = %format!("{error:#}"), "Failed to build initial configuration")
            }
        }

        let aggregator = Aggregator::new(
            local,
            HttpsFetcher::new(metrics.fetch.clone()),
            peers,
            Duration::from_secs(aggregation_timeout_secs),
        )
        .with_local_name(cluster_name);

        let registry = if metrics_disabled {
            None
        } else {
            Some(Arc::new(prom))
        };
        let handler = Handler::new(
            Arc::new(aggregator),
            registry,
            metrics.requests.clone(),
            &health_path,
            &metrics_path,
        );

        let (drain_tx, drain_rx) = drain::channel();
        let mut server =
            tokio::spawn(server::serve(addr, handler, drain_rx).instrument(info_span!("http")));

        tokio::select! {
            res = &mut server => {
                res.context("HTTP server panicked")??;
                anyhow::bail!("HTTP server exited unexpectedly");
            }
            res = shutdown_signal() => res?,
        }

        info!("Shutting down");
        drain_tx.drain().await;
        server.await.context("HTTP server panicked")??;
        Ok(())
    }
}

async fn shutdown_signal() -> Result<()> {
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = term.recv() => {}
    }
    Ok(())
}
