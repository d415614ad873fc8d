//! Dynamic configuration consumed by Traefik's file/HTTP providers.
//!
//! Only the subset of the schema that this controller produces or needs to
//! carry through from peers is modeled. Middlewares and TLS material are kept
//! as opaque JSON values since they are never inspected, only relocated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Map<T> = BTreeMap<String, T>;

/// Middleware definitions are passed through verbatim.
pub type Middleware = serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Configuration {
    #[serde(default)]
    pub http: HttpConfiguration,

    #[serde(default)]
    pub tcp: TcpConfiguration,

    #[serde(default, skip_serializing_if = "UdpConfiguration::is_empty")]
    pub udp: UdpConfiguration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfiguration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfiguration {
    #[serde(default)]
    pub routers: Map<Router>,

    #[serde(default)]
    pub services: Map<Service>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub middlewares: Map<Middleware>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub servers_transports: Map<ServersTransport>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TcpConfiguration {
    #[serde(default)]
    pub routers: Map<TcpRouter>,

    #[serde(default)]
    pub services: Map<TcpService>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub middlewares: Map<Middleware>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UdpConfiguration {
    #[serde(default)]
    pub routers: Map<UdpRouter>,

    #[serde(default)]
    pub services: Map<UdpService>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsConfiguration {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: Map<serde_json::Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stores: Map<serde_json::Value>,
}

// === HTTP ===

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Router {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_points: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middlewares: Vec<String>,

    pub service: String,

    pub rule: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<RouterTlsConfig>,
}

/// An empty TLS block enables TLS termination on a router with the default
/// certificate store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterTlsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_resolver: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<ServersLoadBalancer>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighted: Option<WeightedRoundRobin>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServersLoadBalancer {
    #[serde(default)]
    pub servers: Vec<Server>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_host_header: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servers_transport: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Server {
    pub url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct WeightedRoundRobin {
    #[serde(default)]
    pub services: Vec<WeightedService>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct WeightedService {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServersTransport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    #[serde(default, rename = "rootCAs", skip_serializing_if = "Vec::is_empty")]
    pub root_cas: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_skip_verify: Option<bool>,
}

// === TCP ===

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpRouter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_points: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middlewares: Vec<String>,

    pub service: String,

    pub rule: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<RouterTcpTlsConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterTcpTlsConfig {
    #[serde(default)]
    pub passthrough: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_resolver: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<TcpServersLoadBalancer>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighted: Option<WeightedRoundRobin>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TcpServersLoadBalancer {
    #[serde(default)]
    pub servers: Vec<TcpServer>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TcpServer {
    pub address: String,
}

// === UDP ===

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UdpRouter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_points: Vec<String>,

    pub service: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UdpService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<UdpServersLoadBalancer>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UdpServersLoadBalancer {
    #[serde(default)]
    pub servers: Vec<UdpServer>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UdpServer {
    pub address: String,
}

// === impl Configuration ===

impl Configuration {
    /// Counts routers across all protocols.
    pub fn router_count(&self) -> usize {
        self.http.routers.len() + self.tcp.routers.len() + self.udp.routers.len()
    }
}

impl UdpConfiguration {
    pub fn is_empty(&self) -> bool {
        self.routers.is_empty() && self.services.is_empty()
    }
}

impl Service {
    pub fn load_balancer(servers: impl IntoIterator<Item = String>) -> Self {
        Self {
            load_balancer: Some(ServersLoadBalancer {
                servers: servers.into_iter().map(|url| Server { url }).collect(),
                ..Default::default()
            }),
            weighted: None,
        }
    }
}

impl TcpService {
    pub fn load_balancer(addresses: impl IntoIterator<Item = String>) -> Self {
        Self {
            load_balancer: Some(TcpServersLoadBalancer {
                servers: addresses
                    .into_iter()
                    .map(|address| TcpServer { address })
                    .collect(),
            }),
            weighted: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_traefik_json() {
        let json = serde_json::json!({
            "http": {
                "routers": {
                    "r": {
                        "entryPoints": ["websecure"],
                        "rule": "Host(`a.example.com`)",
                        "service": "s",
                        "tls": {}
                    }
                },
                "services": {
                    "s": {
                        "loadBalancer": {
                            "servers": [{ "url": "https://10.0.0.1:443/" }],
                            "serversTransport": "t"
                        }
                    }
                },
                "serversTransports": {
                    "t": { "serverName": "a.example.com", "rootCAs": ["/ca.crt"] }
                }
            },
            "tcp": {
                "routers": {
                    "r": {
                        "entryPoints": ["websecure"],
                        "rule": "HostSNI(`a.example.com`)",
                        "service": "s",
                        "tls": { "passthrough": true }
                    }
                }
            }
        });

        let config: Configuration = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(config.http.routers["r"].tls, Some(RouterTlsConfig::default()));
        assert_eq!(
            config.http.servers_transports["t"].root_cas,
            vec!["/ca.crt".to_string()]
        );
        assert!(config.tcp.routers["r"].tls.as_ref().unwrap().passthrough);
        assert!(config.udp.is_empty());

        // Empty sections are omitted again on the way out.
        let out = serde_json::to_value(&config).unwrap();
        assert!(out.get("udp").is_none());
        assert!(out.get("tls").is_none());
        assert_eq!(out["http"]["routers"], json["http"]["routers"]);
    }

    #[test]
    fn missing_sections_default() {
        let config: Configuration = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Configuration::default());
        assert_eq!(config.router_count(), 0);
    }
}
