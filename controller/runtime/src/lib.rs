//! Process wiring for the tooc controller: the cluster-backed snapshot cache,
//! peer fetching and aggregation, and the HTTP surface that serves the result.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod aggregate;
mod args;
pub mod cache;
pub mod cluster;
pub mod fetch;
pub mod metrics;
pub mod peers;
pub mod server;

pub use self::args::Args;
