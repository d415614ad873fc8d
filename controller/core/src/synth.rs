use crate::{
    config::{Configuration, Router, RouterTcpTlsConfig, RouterTlsConfig, TcpRouter},
    ingress::{IngressRecord, SslForward},
    naming::{BackendIdentity, Registry, ServiceRefs},
    warn::WarnLimiter,
};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Static settings that shape synthesized routes and services.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingConfig {
    /// Used when an ingress has no load balancer address on its status.
    pub default_address: Option<String>,

    pub http: Upstream,
    pub https: Upstream,

    /// Ports used instead of the primary ones while a hostname rewrite is
    /// active.
    pub alt_http_port: Option<u16>,
    pub alt_https_port: Option<u16>,

    pub http_entrypoint: String,
    pub https_entrypoint: String,

    /// Trust bundle handed to re-encrypt transports.
    pub root_ca_file: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upstream {
    pub port: u16,
    pub protocol: String,
}

/// Counters describing a synthesis pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    pub exported: usize,
    pub routers: usize,
    pub broken: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Synthesis {
    pub config: Configuration,
    pub counts: Counts,
}

/// Translates exported ingresses into a dynamic configuration.
#[derive(Debug)]
pub struct Synthesizer {
    routing: RoutingConfig,
    warnings: WarnLimiter,
}

// === impl RoutingConfig ===

impl RoutingConfig {
    pub(crate) fn http_port(&self, rewrite: bool) -> u16 {
        match self.alt_http_port {
            Some(port) if rewrite => port,
            _ => self.http.port,
        }
    }

    pub(crate) fn https_port(&self, rewrite: bool) -> u16 {
        match self.alt_https_port {
            Some(port) if rewrite => port,
            _ => self.https.port,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_address: None,
            http: Upstream {
                port: 80,
                protocol: "http".to_string(),
            },
            https: Upstream {
                port: 443,
                protocol: "https".to_string(),
            },
            alt_http_port: None,
            alt_https_port: None,
            http_entrypoint: "web".to_string(),
            https_entrypoint: "websecure".to_string(),
            root_ca_file: Some("/etc/traefik/root.crt".to_string()),
        }
    }
}

// === impl Synthesizer ===

impl Synthesizer {
    pub fn new(routing: RoutingConfig) -> Self {
        Self::with_warnings(routing, WarnLimiter::default())
    }

    pub fn with_warnings(routing: RoutingConfig, warnings: WarnLimiter) -> Self {
        Self { routing, warnings }
    }

    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }

    /// Builds a configuration from `records`, skipping those that are not
    /// exported.
    ///
    /// Service and transport names are allocated afresh on every call.
    pub fn synthesize<'r>(
        &mut self,
        records: impl IntoIterator<Item = &'r IngressRecord>,
    ) -> Synthesis {
        let mut registry = Registry::default();
        let mut config = Configuration::default();
        let mut counts = Counts::default();

        for record in records.into_iter().filter(|r| r.is_exported()) {
            counts.exported += 1;

            let address = match record
                .status_address()
                .or_else(|| record.class_address())
                .or(self.routing.default_address.as_deref())
                .filter(|a| !a.is_empty())
            {
                Some(address) => address.to_string(),
                None => {
                    warn!(
                        namespace = %record.namespace,
                        name = %record.name,
                        "Ingress has no load balancer address and no default address is configured"
                    );
                    counts.broken += 1;
                    continue;
                }
            };
            if record.status_address().is_none() {
                let source = if record.class_address().is_some() {
                    "ingress class"
                } else {
                    "default"
                };
                info!(
                    namespace = %record.namespace,
                    name = %record.name,
                    %address,
                    source,
                    "Ingress has no load balancer address; using fallback"
                );
            }

            let mode = record.ssl_forward();
            if let SslForward::Unsupported(ref value) = mode {
                if self
                    .warnings
                    .check(&format!("ssl-forward-type/{value}"), Instant::now())
                {
                    warn!(
                        namespace = %record.namespace,
                        name = %record.name,
                        %value,
                        "Unsupported SSL forward type; only HTTP routes are created"
                    );
                }
            }

            let rewrite = record.rewrite_hostname();
            let id = BackendIdentity {
                address,
                rewrite_hostname: rewrite.map(Into::into),
            };

            // Allocated on the first usable rule so that ruleless ingresses
            // contribute nothing.
            let mut services: Option<ServiceRefs> = None;

            for (i, rule) in record.rules.iter().enumerate() {
                let hostname = match rewrite.or(rule.host.as_deref()).filter(|h| !h.is_empty()) {
                    Some(hostname) => hostname,
                    None => {
                        debug!(
                            namespace = %record.namespace,
                            name = %record.name,
                            rule = i,
                            "Skipping rule without a host"
                        );
                        continue;
                    }
                };

                let svc = services.get_or_insert_with(|| {
                    registry.service(&mut config, &self.routing, &id)
                });
                let key = format!("{}-{}-{}", record.namespace, record.name, i);

                config.http.routers.insert(
                    key.clone(),
                    Router {
                        entry_points: vec![self.routing.http_entrypoint.clone()],
                        service: svc.http.clone(),
                        rule: format!("Host(`{hostname}`)"),
                        ..Default::default()
                    },
                );
                counts.routers += 1;

                match &mode {
                    SslForward::Passthrough => {
                        config.tcp.routers.insert(
                            key,
                            TcpRouter {
                                entry_points: vec![self.routing.https_entrypoint.clone()],
                                service: svc.tcp.clone(),
                                rule: format!("HostSNI(`{hostname}`)"),
                                tls: Some(RouterTcpTlsConfig {
                                    passthrough: true,
                                    ..Default::default()
                                }),
                                ..Default::default()
                            },
                        );
                        counts.routers += 1;
                    }
                    SslForward::ReEncrypt => {
                        config.http.routers.insert(
                            format!("{key}-tls"),
                            Router {
                                entry_points: vec![self.routing.https_entrypoint.clone()],
                                service: svc.https.clone(),
                                rule: format!("Host(`{hostname}`)"),
                                tls: Some(RouterTlsConfig::default()),
                                ..Default::default()
                            },
                        );
                        counts.routers += 1;
                    }
                    SslForward::Unsupported(_) => {}
                }
            }
        }

        debug!(?counts, "Synthesized configuration");
        Synthesis { config, counts }
    }
}
