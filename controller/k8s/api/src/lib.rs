#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod ingress;

pub use self::ingress::{
    exported_selector, helm_release, ingress_class_name, service_address, to_record,
};
pub use k8s_openapi::api::{
    self,
    core::v1::Service,
    networking::v1::{
        Ingress, IngressClass, IngressLoadBalancerIngress, IngressRule, IngressSpec, IngressStatus,
    },
};
pub use kube::{
    api::{Api, ListParams, ObjectMeta, ResourceExt},
    Client,
};
