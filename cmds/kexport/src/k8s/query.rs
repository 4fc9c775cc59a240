//! Cluster query interface consumed by the export pipeline.

use kube::api::{Api, DynamicObject, ListParams};
use thiserror::Error;
use tracing::instrument;

use super::client::ClusterConnection;
use crate::{catalog::ResourceKind, manifest::RawManifest};

/// Boxed source error, so fakes can report failures without a kube error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by cluster queries. Both are fatal to an export run.
#[derive(Debug, Error)]
pub enum QueryError {
	#[error("{kind}/{name} not found{}", in_namespace(.namespace.as_deref()))]
	ObjectNotFound {
		kind: String,
		name: String,
		namespace: Option<String>,
	},

	#[error("cluster query failed: {operation}")]
	ClusterQueryFailed {
		operation: String,
		#[source]
		source: BoxError,
	},
}

fn in_namespace(namespace: Option<&str>) -> String {
	namespace
		.map(|ns| format!(" in namespace {ns}"))
		.unwrap_or_default()
}

impl QueryError {
	pub fn failed(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
		Self::ClusterQueryFailed {
			operation: operation.into(),
			source: source.into(),
		}
	}
}

/// Read-only access to cluster objects.
///
/// Calls are awaited one at a time by the exporter; implementations need no
/// internal synchronization.
#[allow(async_fn_in_trait)]
pub trait ClusterQuery {
	/// Names of all objects of a kind, in the order the server returns them.
	async fn list_object_names(
		&self,
		kind: &ResourceKind,
		namespace: Option<&str>,
	) -> Result<Vec<String>, QueryError>;

	/// Full definition of one object.
	async fn get_object_manifest(
		&self,
		kind: &ResourceKind,
		name: &str,
		namespace: Option<&str>,
	) -> Result<RawManifest, QueryError>;

	async fn namespace_exists(&self, name: &str) -> Result<bool, QueryError>;
}

impl ClusterConnection {
	/// Create a dynamic API for a catalog kind.
	///
	/// Cluster-wide API objects (such as `pv`) ignore the namespace.
	fn dynamic_api(&self, kind: &ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
		let ar = kind.api.api_resource();
		match namespace {
			Some(ns) if kind.api.namespaced => Api::namespaced_with(self.client().clone(), ns, &ar),
			_ => Api::all_with(self.client().clone(), &ar),
		}
	}
}

impl ClusterQuery for ClusterConnection {
	#[instrument(skip(self, kind), fields(kind = kind.name))]
	async fn list_object_names(
		&self,
		kind: &ResourceKind,
		namespace: Option<&str>,
	) -> Result<Vec<String>, QueryError> {
		let list = self
			.dynamic_api(kind, namespace)
			.list(&ListParams::default())
			.await
			.map_err(|e| QueryError::failed(format!("listing {}", kind.name), e))?;

		Ok(list
			.items
			.into_iter()
			.filter_map(|obj| obj.metadata.name)
			.collect())
	}

	#[instrument(skip(self, kind), fields(kind = kind.name))]
	async fn get_object_manifest(
		&self,
		kind: &ResourceKind,
		name: &str,
		namespace: Option<&str>,
	) -> Result<RawManifest, QueryError> {
		let object = self
			.dynamic_api(kind, namespace)
			.get_opt(name)
			.await
			.map_err(|e| QueryError::failed(format!("fetching {}/{}", kind.name, name), e))?
			.ok_or_else(|| QueryError::ObjectNotFound {
				kind: kind.name.to_string(),
				name: name.to_string(),
				namespace: namespace.map(str::to_string),
			})?;

		let value = serde_json::to_value(&object)
			.map_err(|e| QueryError::failed(format!("decoding {}/{}", kind.name, name), e))?;
		Ok(RawManifest::new(value))
	}

	#[instrument(skip(self))]
	async fn namespace_exists(&self, name: &str) -> Result<bool, QueryError> {
		use k8s_openapi::api::core::v1::Namespace;
		let api: Api<Namespace> = Api::all(self.client().clone());
		let found = api
			.get_opt(name)
			.await
			.map_err(|e| QueryError::failed(format!("checking namespace {name}"), e))?;
		Ok(found.is_some())
	}
}
