use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use tooc_controller_core::Counts;

/// Handles to every metric exported by the controller.
#[derive(Clone, Debug)]
pub struct Metrics {
    pub requests: RequestMetrics,
    pub synthesis: SynthesisMetrics,
    pub fetch: FetchMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct RequestMetrics {
    requests: Family<RequestLabels, Counter>,
}

/// Gauges describing the most recent synthesis pass.
#[derive(Clone, Debug, Default)]
pub struct SynthesisMetrics {
    exported: Gauge,
    routers: Gauge,
    broken: Gauge,
}

#[derive(Clone, Debug, Default)]
pub struct FetchMetrics {
    errors: Family<PeerLabels, Counter>,
    successes: Family<PeerLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabels {
    endpoint: String,
    method: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct PeerLabels {
    child_name: String,
}

// === impl Metrics ===

impl Metrics {
    pub fn register(prom: &mut Registry) -> Self {
        let requests = Family::default();
        prom.register(
            "http_endpoint_requests",
            "The amount of requests to an endpoint",
            requests.clone(),
        );

        let exported = Gauge::default();
        prom.register(
            "exported_ingress_count",
            "Amount of exported ingresses found in cluster",
            exported.clone(),
        );

        let routers = Gauge::default();
        prom.register(
            "routes_created_count",
            "Amount of routes created in the config",
            routers.clone(),
        );

        let broken = Gauge::default();
        prom.register(
            "broken_ingress_count",
            "Amount of exported ingresses without a usable load balancer address",
            broken.clone(),
        );

        let errors = Family::default();
        prom.register(
            "child_controller_fetch_errors",
            "Total number of errors fetching from child controllers",
            errors.clone(),
        );

        let successes = Family::default();
        prom.register(
            "child_controller_fetch_success",
            "Total number of successful fetches from child controllers",
            successes.clone(),
        );

        Self {
            requests: RequestMetrics { requests },
            synthesis: SynthesisMetrics {
                exported,
                routers,
                broken,
            },
            fetch: FetchMetrics { errors, successes },
        }
    }
}

impl RequestMetrics {
    /// Callers must pass an endpoint from a fixed set. Nonstandard methods
    /// are folded into `OTHER`.
    pub(crate) fn observe(&self, endpoint: &str, method: &http::Method) {
        use http::Method;
        const KNOWN: [Method; 9] = [
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
            Method::CONNECT,
            Method::TRACE,
        ];
        let method = if KNOWN.contains(method) {
            method.as_str()
        } else {
            "OTHER"
        };
        self.requests
            .get_or_create(&RequestLabels {
                endpoint: endpoint.to_string(),
                method: method.to_string(),
            })
            .inc();
    }
}

impl SynthesisMetrics {
    pub(crate) fn observe(&self, counts: Counts) {
        self.exported.set(counts.exported as i64);
        self.routers.set(counts.routers as i64);
        self.broken.set(counts.broken as i64);
    }
}

impl FetchMetrics {
    pub(crate) fn success(&self, peer: &str) {
        self.successes
            .get_or_create(&PeerLabels {
                child_name: peer.to_string(),
            })
            .inc();
    }

    pub(crate) fn error(&self, peer: &str) {
        self.errors
            .get_or_create(&PeerLabels {
                child_name: peer.to_string(),
            })
            .inc();
    }
}
