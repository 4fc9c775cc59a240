//! Export Kubernetes objects from a namespace or a cluster into a tree of
//! sanitized YAML manifests.

pub mod catalog;
pub mod commands;
pub mod config;
pub mod context;
pub mod export;
pub mod k8s;
pub mod manifest;
pub mod resolve;
pub mod sanitize;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
pub mod yaml;
