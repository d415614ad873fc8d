use crate::{
    config::{Configuration, Service, ServersTransport, TcpService},
    synth::RoutingConfig,
};
use ahash::AHashMap as HashMap;

/// Prefix shared by every synthesized service and transport name.
pub const NAME_PREFIX: &str = "tooc";

/// Identifies a backend. Rules resolving to the same identity share services.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct BackendIdentity {
    pub address: String,
    pub rewrite_hostname: Option<String>,
}

/// Names of the services synthesized for a backend identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRefs {
    pub http: String,
    pub https: String,
    pub tcp: String,
    pub transport: Option<String>,
}

/// Allocates names for synthesized services and transports.
///
/// A registry lives for a single synthesis pass. Names are only unique within
/// that pass.
#[derive(Debug, Default)]
pub struct Registry {
    services: HashMap<BackendIdentity, ServiceRefs>,
    transports: HashMap<String, String>,
    next_service: usize,
    next_transport: usize,
}

// === impl Registry ===

impl Registry {
    /// Returns the services for `id`, inserting them into `config` the first
    /// time the identity is seen.
    pub fn service(
        &mut self,
        config: &mut Configuration,
        routing: &RoutingConfig,
        id: &BackendIdentity,
    ) -> ServiceRefs {
        if let Some(refs) = self.services.get(id) {
            return refs.clone();
        }

        let transport = id
            .rewrite_hostname
            .as_deref()
            .map(|hostname| self.transport(config, routing, hostname));

        let n = self.next_service;
        self.next_service += 1;
        let refs = ServiceRefs {
            http: format!("{NAME_PREFIX}-http-{n}"),
            https: format!("{NAME_PREFIX}-https-{n}"),
            tcp: format!("{NAME_PREFIX}-tcp-{n}"),
            transport,
        };

        let rewrite = id.rewrite_hostname.is_some();
        let http_port = routing.http_port(rewrite);
        let https_port = routing.https_port(rewrite);

        config.http.services.insert(
            refs.http.clone(),
            Service::load_balancer([format!(
                "{}://{}:{}/",
                routing.http.protocol, id.address, http_port
            )]),
        );

        let mut https = Service::load_balancer([format!(
            "{}://{}:{}/",
            routing.https.protocol, id.address, https_port
        )]);
        if let Some(lb) = https.load_balancer.as_mut() {
            lb.servers_transport = refs.transport.clone();
        }
        config.http.services.insert(refs.https.clone(), https);

        config.tcp.services.insert(
            refs.tcp.clone(),
            TcpService::load_balancer([format!("{}:{}", id.address, https_port)]),
        );

        self.services.insert(id.clone(), refs.clone());
        refs
    }

    /// Returns the transport presenting `hostname` to backends, inserting it
    /// into `config` the first time the hostname is seen.
    pub fn transport(
        &mut self,
        config: &mut Configuration,
        routing: &RoutingConfig,
        hostname: &str,
    ) -> String {
        if let Some(name) = self.transports.get(hostname) {
            return name.clone();
        }

        let name = format!("{NAME_PREFIX}-transport-{}", self.next_transport);
        self.next_transport += 1;

        config.http.servers_transports.insert(
            name.clone(),
            ServersTransport {
                server_name: Some(hostname.to_string()),
                root_cas: routing.root_ca_file.iter().cloned().collect(),
                insecure_skip_verify: None,
            },
        );
        self.transports.insert(hostname.to_string(), name.clone());
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(address: &str, rewrite: Option<&str>) -> BackendIdentity {
        BackendIdentity {
            address: address.to_string(),
            rewrite_hostname: rewrite.map(Into::into),
        }
    }

    #[test]
    fn reuses_services_for_identity() {
        let routing = RoutingConfig::default();
        let mut config = Configuration::default();
        let mut registry = Registry::default();

        let a = registry.service(&mut config, &routing, &identity("10.0.0.1", None));
        let b = registry.service(&mut config, &routing, &identity("10.0.0.2", None));
        let snapshot = config.clone();
        let again = registry.service(&mut config, &routing, &identity("10.0.0.1", None));

        assert_eq!(a, again);
        assert_ne!(a.http, b.http);
        assert_eq!(config, snapshot, "a known identity must not touch the config");
        assert_eq!(config.http.services.len(), 4);
        assert_eq!(config.tcp.services.len(), 2);
        assert!(config.http.servers_transports.is_empty());
    }

    #[test]
    fn rewrite_identities_share_transports_by_hostname() {
        let routing = RoutingConfig {
            alt_https_port: Some(8443),
            ..Default::default()
        };
        let mut config = Configuration::default();
        let mut registry = Registry::default();

        let a = registry.service(
            &mut config,
            &routing,
            &identity("10.0.0.1", Some("backend.example.com")),
        );
        let b = registry.service(
            &mut config,
            &routing,
            &identity("10.0.0.2", Some("backend.example.com")),
        );

        assert_ne!(a.https, b.https);
        assert_eq!(a.transport, b.transport);
        assert_eq!(config.http.servers_transports.len(), 1);

        let lb = config.http.services[&a.https].load_balancer.as_ref().unwrap();
        assert_eq!(lb.servers[0].url, "https://10.0.0.1:8443/");
        assert_eq!(lb.servers_transport, a.transport);

        let tcp = config.tcp.services[&a.tcp].load_balancer.as_ref().unwrap();
        assert_eq!(tcp.servers[0].address, "10.0.0.1:8443");
    }
}
