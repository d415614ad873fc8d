use crate::config::{
    Configuration, HttpConfiguration, Map, Service, TcpConfiguration, TcpService,
    UdpConfiguration, WeightedRoundRobin,
};

/// Returns a copy of `config` with every object name prefixed by `tag`.
///
/// References between objects are renamed along with the objects they point
/// to, except for provider-qualified references (`name@provider`), which
/// resolve outside of this configuration. TLS settings are global and are
/// copied unchanged.
pub fn rewrite(config: &Configuration, tag: &str) -> Configuration {
    let name = |n: &str| prefixed(tag, n);

    let http = HttpConfiguration {
        routers: rename_keys(&config.http.routers, tag, |router| {
            let mut router = router.clone();
            router.service = name(&router.service);
            router.middlewares = router.middlewares.iter().map(|m| name(m)).collect();
            router
        }),
        services: rename_keys(&config.http.services, tag, |svc| Service {
            load_balancer: svc.load_balancer.clone().map(|mut lb| {
                lb.servers_transport = lb.servers_transport.as_deref().map(|t| name(t));
                lb
            }),
            weighted: svc.weighted.as_ref().map(|w| weighted(w, tag)),
        }),
        middlewares: rename_keys(&config.http.middlewares, tag, Clone::clone),
        servers_transports: rename_keys(&config.http.servers_transports, tag, Clone::clone),
    };

    let tcp = TcpConfiguration {
        routers: rename_keys(&config.tcp.routers, tag, |router| {
            let mut router = router.clone();
            router.service = name(&router.service);
            router.middlewares = router.middlewares.iter().map(|m| name(m)).collect();
            router
        }),
        services: rename_keys(&config.tcp.services, tag, |svc| TcpService {
            load_balancer: svc.load_balancer.clone(),
            weighted: svc.weighted.as_ref().map(|w| weighted(w, tag)),
        }),
        middlewares: rename_keys(&config.tcp.middlewares, tag, Clone::clone),
    };

    let udp = UdpConfiguration {
        routers: rename_keys(&config.udp.routers, tag, |router| {
            let mut router = router.clone();
            router.service = name(&router.service);
            router
        }),
        services: rename_keys(&config.udp.services, tag, Clone::clone),
    };

    Configuration {
        http,
        tcp,
        udp,
        tls: config.tls.clone(),
    }
}

fn prefixed(tag: &str, name: &str) -> String {
    if name.contains('@') {
        return name.to_string();
    }
    format!("{tag}-{name}")
}

fn rename_keys<T>(map: &Map<T>, tag: &str, f: impl Fn(&T) -> T) -> Map<T> {
    map.iter().map(|(k, v)| (prefixed(tag, k), f(v))).collect()
}

fn weighted(w: &WeightedRoundRobin, tag: &str) -> WeightedRoundRobin {
    let mut w = w.clone();
    for svc in w.services.iter_mut() {
        svc.name = prefixed(tag, &svc.name);
    }
    w
}
