//! Synthesis and aggregation of Traefik dynamic configuration.
//!
//! Exported ingresses are translated into routers and services by the
//! [`Synthesizer`]. Each pass allocates service names through a fresh
//! [`naming::Registry`], so that every distinct backend (address plus optional
//! rewrite hostname) is described exactly once and shared by all routes that
//! target it:
//!
//! ```text
//! [ Ingress rule ] -> [ Router ] -> [ Service ] -> ( ServersTransport )
//! ```
//!
//! Configurations from other controllers are renamed with [`rewrite`] so that
//! their keys cannot collide with ours, and then combined with [`merge`].

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod config;
pub mod ingress;
mod merge;
mod namespace;
pub mod naming;
mod synth;
mod warn;

#[cfg(test)]
mod tests;

pub use self::{
    config::Configuration,
    ingress::{IngressRecord, IngressRule, LoadBalancerAddress, SslForward},
    merge::merge,
    namespace::rewrite,
    synth::{Counts, RoutingConfig, Synthesis, Synthesizer, Upstream},
    warn::WarnLimiter,
};
