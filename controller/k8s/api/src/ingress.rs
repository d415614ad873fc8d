use k8s_openapi::api::{
    core::v1::Service,
    networking::v1::{Ingress, IngressClass},
};
use kube::ResourceExt;
use tooc_controller_core::{
    ingress::{EXPORT_LABEL, EXPORT_VALUE},
    IngressRecord, IngressRule, LoadBalancerAddress,
};

/// Label selector matching ingresses that opt into export.
pub fn exported_selector() -> String {
    format!("{EXPORT_LABEL}={EXPORT_VALUE}")
}

/// Legacy annotation naming an ingress class.
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

/// Annotations Helm places on the resources of a release.
pub const HELM_RELEASE_NAMESPACE_ANNOTATION: &str = "meta.helm.sh/release-namespace";
pub const HELM_RELEASE_NAME_ANNOTATION: &str = "meta.helm.sh/release-name";

/// Extracts the routing-relevant parts of an ingress.
///
/// The class address is left unset; it has to be resolved through the
/// cluster.
pub fn to_record(ingress: &Ingress) -> IngressRecord {
    let load_balancer = ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .into_iter()
        .flatten()
        .map(|lb| LoadBalancerAddress {
            ip: lb.ip.clone(),
            hostname: lb.hostname.clone(),
        })
        .collect();

    let rules = ingress
        .spec
        .as_ref()
        .and_then(|s| s.rules.as_ref())
        .into_iter()
        .flatten()
        .map(|r| IngressRule {
            host: r.host.clone(),
        })
        .collect();

    IngressRecord {
        namespace: ingress.namespace().unwrap_or_default(),
        name: ingress.name_any(),
        labels: ingress.labels().clone(),
        load_balancer,
        rules,
        ingress_class: ingress_class_name(ingress),
        class_address: None,
    }
}

/// Returns the class of an ingress from its spec or, failing that, the
/// legacy annotation.
pub fn ingress_class_name(ingress: &Ingress) -> Option<String> {
    ingress
        .spec
        .as_ref()
        .and_then(|s| s.ingress_class_name.clone())
        .or_else(|| ingress.annotations().get(INGRESS_CLASS_ANNOTATION).cloned())
        .filter(|c| !c.is_empty())
}

/// Returns the namespace and name of the Helm release that installed an
/// ingress class. The release's service shares its name.
pub fn helm_release(class: &IngressClass) -> Option<(String, String)> {
    let annotations = class.annotations();
    let namespace = annotations.get(HELM_RELEASE_NAMESPACE_ANNOTATION)?;
    let name = annotations.get(HELM_RELEASE_NAME_ANNOTATION)?;
    if namespace.is_empty() || name.is_empty() {
        return None;
    }
    Some((namespace.clone(), name.clone()))
}

/// Returns the first load balancer address of a service, preferring the IP
/// over the hostname.
pub fn service_address(service: &Service) -> Option<String> {
    let lb = service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()?;
    lb.ip
        .clone()
        .filter(|ip| !ip.is_empty())
        .or_else(|| lb.hostname.clone().filter(|h| !h.is_empty()))
}
