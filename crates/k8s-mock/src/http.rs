//! HTTP-based mock Kubernetes server using wiremock.
//!
//! This is a real HTTP server, so it works with kubeconfig-based connections
//! exactly like a live API server would.

use std::sync::Arc;

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde_json::{json, Value};
use tracing::{debug, trace};
use wiremock::{
	matchers::{method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::table::ResourceTable;

/// Namespace that always exists on the mock server.
pub const DEFAULT_NAMESPACE: &str = "default";

/// A served object.
#[derive(Debug, Clone)]
struct StoredObject {
	/// Collection path within the object's namespace.
	collection: String,
	/// Collection path across all namespaces.
	cluster_collection: String,
	name: String,
	body: Value,
}

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	/// Objects to serve as raw manifests. API paths are derived from
	/// apiVersion/kind; list responses keep this order.
	#[builder(default)]
	resources: Vec<Value>,
	/// Object names whose GET fails with 500.
	#[builder(default)]
	failing_names: Vec<String>,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		let table = ResourceTable::default();
		debug!(uri = %server.uri(), "started mock K8s server");

		let mut objects: Vec<StoredObject> = self
			.resources
			.into_iter()
			.filter_map(|manifest| store(&table, manifest))
			.collect();

		let has_default_ns = objects
			.iter()
			.any(|o| o.collection == "/api/v1/namespaces" && o.name == DEFAULT_NAMESPACE);
		if !has_default_ns {
			objects.extend(store(
				&table,
				json!({
					"apiVersion": "v1",
					"kind": "Namespace",
					"metadata": {"name": DEFAULT_NAMESPACE}
				}),
			));
		}

		mount_version(&server).await;
		mount_resources(&server, Arc::new(objects), Arc::new(self.failing_names), table).await;

		RunningHttpMockK8sServer { server }
	}
}

/// Place a manifest at its API path. Unknown kinds are ignored.
fn store(table: &ResourceTable, manifest: Value) -> Option<StoredObject> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.pointer("/metadata/name")?.as_str()?.to_string();
	let namespace = manifest
		.pointer("/metadata/namespace")
		.and_then(Value::as_str)
		.unwrap_or(DEFAULT_NAMESPACE);

	let resource = table.find(api_version, kind)?;
	let collection = resource.collection_path(Some(namespace));
	trace!(collection = %collection, name = %name, "registered resource");

	Some(StoredObject {
		collection,
		cluster_collection: resource.collection_path(None),
		name,
		body: manifest,
	})
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Paths of every request received so far, in order.
	pub async fn requested_paths(&self) -> Vec<String> {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.iter()
			.map(|r| r.url.path().to_string())
			.collect()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some(DEFAULT_NAMESPACE.to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}
}

async fn mount_version(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path("/version"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"major": "1",
			"minor": "28",
			"gitVersion": "v1.28.0",
			"gitCommit": "fake",
			"gitTreeState": "clean",
			"buildDate": "2024-01-01T00:00:00Z",
			"goVersion": "go1.21.0",
			"compiler": "gc",
			"platform": "linux/amd64"
		})))
		.mount(server)
		.await;
}

async fn mount_resources(
	server: &MockServer,
	objects: Arc<Vec<StoredObject>>,
	failing_names: Arc<Vec<String>>,
	table: ResourceTable,
) {
	Mock::given(method("GET"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let Some(target) = parse_request_path(req.url.path(), &table) else {
				return status(404, "NotFound", "unknown path");
			};

			match target.name {
				Some(name) => {
					if failing_names.iter().any(|f| f == name) {
						return status(500, "InternalError", "injected failure");
					}
					objects
						.iter()
						.find(|o| o.collection == target.collection && o.name == name)
						.map(|o| ResponseTemplate::new(200).set_body_json(o.body.clone()))
						.unwrap_or_else(|| status(404, "NotFound", "not found"))
				}
				None => {
					let items: Vec<_> = objects
						.iter()
						.filter(|o| {
							o.collection == target.collection
								|| o.cluster_collection == target.collection
						})
						.map(|o| o.body.clone())
						.collect();
					ResponseTemplate::new(200).set_body_json(json!({
						"kind": "List",
						"apiVersion": "v1",
						"metadata": {"resourceVersion": "1"},
						"items": items
					}))
				}
			}
		})
		.mount(server)
		.await;
}

fn status(code: u16, reason: &str, message: &str) -> ResponseTemplate {
	ResponseTemplate::new(code).set_body_json(json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	}))
}

/// A request against a collection, optionally naming one object in it.
#[derive(Debug, PartialEq, Eq)]
struct RequestTarget<'a> {
	collection: String,
	name: Option<&'a str>,
}

/// Split an API path into collection and object name.
///
/// Examples:
/// - `/api/v1/namespaces/shop/configmaps/app` -> (`/api/v1/namespaces/shop/configmaps`, `app`)
/// - `/api/v1/namespaces/shop/secrets` -> (`/api/v1/namespaces/shop/secrets`, none)
/// - `/api/v1/namespaces/shop` -> (`/api/v1/namespaces`, `shop`)
/// - `/apis/storage.k8s.io/v1/storageclasses/fast` ->
///   (`/apis/storage.k8s.io/v1/storageclasses`, `fast`)
fn parse_request_path<'a>(path: &'a str, table: &ResourceTable) -> Option<RequestTarget<'a>> {
	let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
	let prefix_len = match segments.first()? {
		&"api" => 2,
		&"apis" => 3,
		_ => return None,
	};
	let rest = segments.get(prefix_len..)?;

	// `namespaces/<ns>/<plural>` addresses a namespaced collection; a bare
	// `namespaces/<ns>` is a get on the namespace itself.
	let collection_len = match rest {
		["namespaces", _, plural, ..] if table.is_collection(plural) => prefix_len + 3,
		[_, ..] => prefix_len + 1,
		[] => return None,
	};

	Some(RequestTarget {
		collection: format!("/{}", segments[..collection_len].join("/")),
		name: segments.get(collection_len).copied(),
	})
}
