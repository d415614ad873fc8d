use std::collections::BTreeMap;

/// Label that opts an ingress into export.
pub const EXPORT_LABEL: &str = "export";
pub const EXPORT_VALUE: &str = "true";

/// Label selecting how TLS traffic is forwarded to the backend.
pub const SSL_FORWARD_LABEL: &str = "ssl-forward-type";

/// Label overriding the hostname used toward the backend.
pub const REWRITE_HOSTNAME_LABEL: &str = "rewrite-hostname";

/// The subset of an ingress resource needed to synthesize routes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngressRecord {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub load_balancer: Vec<LoadBalancerAddress>,
    pub rules: Vec<IngressRule>,

    /// Name of the ingress class handling this ingress.
    pub ingress_class: Option<String>,

    /// Address published by the service behind the ingress class, consulted
    /// when the ingress status carries no address.
    pub class_address: Option<String>,
}

/// An address assigned to an ingress by its load balancer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadBalancerAddress {
    pub ip: Option<String>,
    pub hostname: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngressRule {
    pub host: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SslForward {
    /// TLS is terminated by the backend; the proxy routes on SNI only.
    Passthrough,

    /// TLS is terminated by the proxy and re-established toward the backend.
    ReEncrypt,

    Unsupported(String),
}

// === impl IngressRecord ===

impl IngressRecord {
    pub fn is_exported(&self) -> bool {
        self.labels.get(EXPORT_LABEL).map(String::as_str) == Some(EXPORT_VALUE)
    }

    pub fn ssl_forward(&self) -> SslForward {
        match self.labels.get(SSL_FORWARD_LABEL).map(String::as_str) {
            None | Some("passthrough") => SslForward::Passthrough,
            Some("re-encrypt") => SslForward::ReEncrypt,
            Some(other) => SslForward::Unsupported(other.to_string()),
        }
    }

    pub fn rewrite_hostname(&self) -> Option<&str> {
        self.labels
            .get(REWRITE_HOSTNAME_LABEL)
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
    }

    /// Returns the first address published on the ingress status, preferring
    /// the entry's IP over its hostname.
    pub fn status_address(&self) -> Option<&str> {
        let lb = self.load_balancer.first()?;
        lb.ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .or_else(|| lb.hostname.as_deref().filter(|h| !h.is_empty()))
    }

    /// Returns the ingress class address, if one was resolved.
    pub fn class_address(&self) -> Option<&str> {
        self.class_address.as_deref().filter(|a| !a.is_empty())
    }
}
