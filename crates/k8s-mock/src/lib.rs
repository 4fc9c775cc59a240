//! Mock Kubernetes API server for testing.
//!
//! Serves read-only GET endpoints for a fixed set of objects over real HTTP, so
//! tests can connect through a kubeconfig like against a live cluster.

pub mod http;
pub mod table;

pub use http::{HttpMockK8sServer, RunningHttpMockK8sServer};
pub use table::{MockApiResource, ResourceTable};
