
use crate::{IngressRecord, IngressRule, LoadBalancerAddress, RoutingConfig, Synthesizer};

pub fn mk_ingress<'h>(
    ns: impl ToString,
    name: impl ToString,
    ip: Option<&str>,
    hosts: impl IntoIterator<Item = &'h str>,
    labels: impl IntoIterator<Item = (&'static str, &'static str)>,
) -> IngressRecord {
    IngressRecord {
        namespace: ns.to_string(),
        name: name.to_string(),
        labels: std::iter::once(("export", "true"))
            .chain(labels)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        load_balancer: ip
            .map(|ip| LoadBalancerAddress {
                ip: Some(ip.to_string()),
                hostname: None,
            })
            .into_iter()
            .collect(),
        rules: hosts
            .into_iter()
            .map(|h| IngressRule {
                host: Some(h.to_string()),
            })
            .collect(),
        ..Default::default()
    }
}

pub fn mk_synthesizer() -> (Synthesizer, tracing::subscriber::DefaultGuard) {
    let tracing = tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .finish(),
    );
    (Synthesizer::new(RoutingConfig::default()), tracing)
}
