use crate::config::{Configuration, TlsConfiguration};

/// Combines configurations into a new one.
///
/// Objects are copied by key; when two inputs define the same key, the later
/// input wins. Callers are expected to namespace inputs beforehand so that
/// keys from different sources are disjoint. TLS certificates are
/// concatenated and TLS options and stores are merged by key.
pub fn merge<'c>(configs: impl IntoIterator<Item = Option<&'c Configuration>>) -> Configuration {
    let mut merged = Configuration::default();

    for config in configs.into_iter().flatten() {
        let Configuration {
            http,
            tcp,
            udp,
            tls,
        } = config;

        extend(&mut merged.http.routers, &http.routers);
        extend(&mut merged.http.services, &http.services);
        extend(&mut merged.http.middlewares, &http.middlewares);
        extend(&mut merged.http.servers_transports, &http.servers_transports);

        extend(&mut merged.tcp.routers, &tcp.routers);
        extend(&mut merged.tcp.services, &tcp.services);
        extend(&mut merged.tcp.middlewares, &tcp.middlewares);

        extend(&mut merged.udp.routers, &udp.routers);
        extend(&mut merged.udp.services, &udp.services);

        if let Some(tls) = tls {
            let into = merged.tls.get_or_insert_with(TlsConfiguration::default);
            into.certificates.extend(tls.certificates.iter().cloned());
            extend(&mut into.options, &tls.options);
            extend(&mut into.stores, &tls.stores);
        }
    }

    merged
}

fn extend<T: Clone>(into: &mut crate::config::Map<T>, from: &crate::config::Map<T>) {
    into.extend(from.iter().map(|(k, v)| (k.clone(), v.clone())));
}
