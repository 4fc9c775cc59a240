//! Kubernetes access for the exporter.
//!
//! Cluster calls go through the [`query::ClusterQuery`] seam so the export
//! pipeline can run against kube-rs in production and an in-memory fake in tests.

pub mod client;
pub mod diff;
pub mod output;
pub mod query;

use std::fmt;

/// Kubernetes API resource scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceScope {
	/// Resource is namespaced (e.g., Deployment, ConfigMap).
	Namespaced,

	/// Resource is cluster-wide (e.g., ClusterRole, StorageClass).
	ClusterWide,
}

impl fmt::Display for ResourceScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ResourceScope::Namespaced => write!(f, "namespace"),
			ResourceScope::ClusterWide => write!(f, "cluster"),
		}
	}
}
