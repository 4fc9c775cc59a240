//! End-to-end export runs against the HTTP mock server.

use std::path::{Path, PathBuf};

use assert_matches::assert_matches;
use k8s_mock::HttpMockK8sServer;
use kexport::{
	catalog::Catalog,
	context::{ExportContext, SourceScope},
	export::{check_prerequisites, ExportError, Exporter, PrerequisiteError, SkipReason},
	k8s::{client::ClusterConnection, query::QueryError},
};
use serde_json::{json, Value};
use tempfile::TempDir;
use walkdir::WalkDir;

fn namespaced(kind: &str, api_version: &str, name: &str) -> Value {
	json!({
		"apiVersion": api_version,
		"kind": kind,
		"metadata": {
			"name": name,
			"namespace": "shop",
			"uid": "0b6c3f5e-1d2a-4c1e-9f00-000000000001",
			"resourceVersion": "4711",
			"creationTimestamp": "2024-01-01T00:00:00Z"
		}
	})
}

fn shop_fixture() -> Vec<Value> {
	let mut claim_a = namespaced("PersistentVolumeClaim", "v1", "data-a");
	claim_a["spec"] = json!({"volumeName": "pv-001", "storageClassName": "fast"});
	claim_a["status"] = json!({"phase": "Bound"});
	let mut claim_b = namespaced("PersistentVolumeClaim", "v1", "data-b");
	claim_b["spec"] = json!({"storageClassName": "fast"});
	claim_b["status"] = json!({"phase": "Pending"});

	let mut web = namespaced("Service", "v1", "web");
	web["spec"] = json!({
		"clusterIP": "10.0.0.12",
		"clusterIPs": ["10.0.0.12"],
		"ports": [{"port": 80, "nodePort": 30080}]
	});
	let mut headless = namespaced("Service", "v1", "db-headless");
	headless["spec"] = json!({"clusterIP": "None", "clusterIPs": ["None"]});

	let mut sts = namespaced("StatefulSet", "apps/v1", "db");
	sts["metadata"]["generation"] = json!(7);
	sts["spec"] = json!({"replicas": 3, "serviceName": "db-headless"});
	sts["status"] = json!({"replicas": 3, "readyReplicas": 3});

	let mut cm = namespaced("ConfigMap", "v1", "app");
	cm["data"] = json!({"mode": "production"});

	vec![
		json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "shop"}}),
		namespaced("Secret", "v1", "default-token-ab3f9"),
		namespaced("Secret", "v1", "db-credentials"),
		cm,
		claim_a,
		claim_b,
		json!({
			"apiVersion": "v1",
			"kind": "PersistentVolume",
			"metadata": {"name": "pv-001", "uid": "pv-uid"},
			"spec": {
				"capacity": {"storage": "1Gi"},
				"claimRef": {
					"kind": "PersistentVolumeClaim",
					"name": "data-a",
					"namespace": "shop",
					"uid": "claim-uid",
					"resourceVersion": "99"
				}
			},
			"status": {"phase": "Bound"}
		}),
		json!({
			"apiVersion": "v1",
			"kind": "PersistentVolume",
			"metadata": {"name": "pv-999"},
			"spec": {"capacity": {"storage": "5Gi"}}
		}),
		web,
		headless,
		sts,
	]
}

/// Relative paths of every file under `root`, sorted.
fn written_files(root: &Path) -> Vec<String> {
	let mut files: Vec<String> = WalkDir::new(root)
		.into_iter()
		.filter_map(Result::ok)
		.filter(|e| e.file_type().is_file())
		.map(|e| {
			e.path()
				.strip_prefix(root)
				.unwrap()
				.to_string_lossy()
				.into_owned()
		})
		.collect();
	files.sort();
	files
}

fn read_yaml(path: PathBuf) -> Value {
	let content = std::fs::read_to_string(&path)
		.unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
	serde_yaml::from_str(&content).unwrap()
}

#[tokio::test]
async fn test_namespace_export_layout() {
	let server = HttpMockK8sServer::builder()
		.resources(shop_fixture())
		.build()
		.start()
		.await;
	let conn = ClusterConnection::from_kubeconfig(server.kubeconfig(), None)
		.await
		.unwrap();
	let temp = TempDir::new().unwrap();
	let ctx = ExportContext::builder()
		.source(SourceScope::Namespace("shop".to_string()))
		.output_root(temp.path())
		.build();

	check_prerequisites(&conn, &ctx).await.unwrap();
	let kinds = ctx.validate(Catalog::get()).unwrap();
	let summary = Exporter::new(&conn, &ctx).run(&kinds).await.unwrap();

	assert_eq!(
		written_files(temp.path()),
		vec![
			"shop/04_secrets/secrets_db-credentials.yaml",
			"shop/05_cm/cm_app.yaml",
			"shop/08_pvc/pvc_data-a.yaml",
			"shop/08_pvc/pvc_data-b.yaml",
			"shop/09_pv/pv_pv-001.yaml",
			"shop/10_svc/svc_db-headless.yaml",
			"shop/10_svc/svc_web.yaml",
			"shop/12_sts/sts_db.yaml",
		]
	);
	assert_eq!(summary.exported_count(), 8);
	assert_eq!(summary.skipped_count(), 1);

	let secrets = summary.kinds.iter().find(|k| k.kind == "secrets").unwrap();
	assert_eq!(
		secrets.skipped,
		vec![(
			"default-token-ab3f9".to_string(),
			SkipReason::DefaultServiceAccountToken
		)]
	);

	let paths = server.requested_paths().await;
	assert!(!paths
		.iter()
		.any(|p| p.ends_with("/secrets/default-token-ab3f9")));
	assert!(!paths.iter().any(|p| p == "/api/v1/persistentvolumes"));
	assert!(!paths.iter().any(|p| p.ends_with("/pv-999")));
}

#[tokio::test]
async fn test_namespace_export_sanitizes_manifests() {
	let server = HttpMockK8sServer::builder()
		.resources(shop_fixture())
		.build()
		.start()
		.await;
	let conn = ClusterConnection::from_kubeconfig(server.kubeconfig(), None)
		.await
		.unwrap();
	let temp = TempDir::new().unwrap();
	let ctx = ExportContext::builder()
		.source(SourceScope::Namespace("shop".to_string()))
		.destination_namespace("shop-restore")
		.kind_filter(vec![
			"pvc".to_string(),
			"pv".to_string(),
			"svc".to_string(),
			"sts".to_string(),
		])
		.output_root(temp.path())
		.build();

	let kinds = ctx.validate(Catalog::get()).unwrap();
	Exporter::new(&conn, &ctx).run(&kinds).await.unwrap();
	let scope = temp.path().join("shop");

	let claim = read_yaml(scope.join("08_pvc/pvc_data-a.yaml"));
	assert_eq!(claim["metadata"]["namespace"], "shop-restore");
	assert!(claim["metadata"].get("uid").is_none());
	assert!(claim["metadata"].get("resourceVersion").is_none());
	assert!(claim["metadata"].get("creationTimestamp").is_none());
	assert_eq!(claim["status"], json!({}));
	assert_eq!(claim["spec"]["volumeName"], "pv-001");

	let volume = read_yaml(scope.join("09_pv/pv_pv-001.yaml"));
	assert_eq!(volume["spec"]["claimRef"]["namespace"], "shop-restore");
	assert_eq!(volume["spec"]["claimRef"]["name"], "data-a");
	assert!(volume["spec"]["claimRef"].get("uid").is_none());
	assert!(volume["spec"]["claimRef"].get("resourceVersion").is_none());
	assert!(volume.get("status").is_none());

	let web = read_yaml(scope.join("10_svc/svc_web.yaml"));
	assert!(web["spec"].get("clusterIP").is_none());
	assert!(web["spec"].get("clusterIPs").is_none());
	assert!(web["spec"]["ports"][0].get("nodePort").is_none());
	assert_eq!(web["status"], json!({"loadBalancer": {}}));

	let headless = read_yaml(scope.join("10_svc/svc_db-headless.yaml"));
	assert_eq!(headless["spec"]["clusterIP"], "None");

	let sts = read_yaml(scope.join("12_sts/sts_db.yaml"));
	assert_eq!(sts["metadata"]["generation"], 1);
	assert_eq!(sts["status"], json!({"replicas": 0}));
	assert_eq!(sts["spec"]["replicas"], 3);
}

#[tokio::test]
async fn test_cluster_export_layout() {
	let server = HttpMockK8sServer::builder()
		.resources(vec![
			json!({
				"apiVersion": "rbac.authorization.k8s.io/v1",
				"kind": "ClusterRole",
				"metadata": {"name": "view", "uid": "abc", "resourceVersion": "12"},
				"rules": [{"apiGroups": [""], "resources": ["pods"], "verbs": ["get"]}]
			}),
			json!({
				"apiVersion": "storage.k8s.io/v1",
				"kind": "StorageClass",
				"metadata": {"name": "fast"},
				"provisioner": "kubernetes.io/no-provisioner"
			}),
		])
		.build()
		.start()
		.await;
	let conn = ClusterConnection::from_kubeconfig(server.kubeconfig(), None)
		.await
		.unwrap();
	let temp = TempDir::new().unwrap();
	let ctx = ExportContext::builder()
		.source(SourceScope::Cluster)
		.output_root(temp.path())
		.build();

	check_prerequisites(&conn, &ctx).await.unwrap();
	let kinds = ctx.validate(Catalog::get()).unwrap();
	let summary = Exporter::new(&conn, &ctx).run(&kinds).await.unwrap();

	assert_eq!(
		written_files(temp.path()),
		vec![
			"CLUSTER/01_clusterroles/clusterroles_view.yaml",
			"CLUSTER/03_sc/sc_fast.yaml",
		]
	);
	assert_eq!(summary.scope_root, temp.path().join("CLUSTER"));

	let role = read_yaml(temp.path().join("CLUSTER/01_clusterroles/clusterroles_view.yaml"));
	assert!(role["metadata"].get("uid").is_none());
	assert!(role["metadata"].get("namespace").is_none());
	assert_eq!(role["rules"][0]["verbs"], json!(["get"]));
}

#[tokio::test]
async fn test_missing_namespace_fails_prerequisites() {
	let server = HttpMockK8sServer::builder().build().start().await;
	let conn = ClusterConnection::from_kubeconfig(server.kubeconfig(), None)
		.await
		.unwrap();
	let ctx = ExportContext::builder()
		.source(SourceScope::Namespace("shop".to_string()))
		.build();

	assert_matches!(
		check_prerequisites(&conn, &ctx).await,
		Err(PrerequisiteError::NamespaceNotFound(ns)) if ns == "shop"
	);
}

#[tokio::test]
async fn test_server_failure_stops_export() {
	let mut resources = shop_fixture();
	resources.push(namespaced("ConfigMap", "v1", "broken"));
	let server = HttpMockK8sServer::builder()
		.resources(resources)
		.failing_names(vec!["broken".to_string()])
		.build()
		.start()
		.await;
	let conn = ClusterConnection::from_kubeconfig(server.kubeconfig(), None)
		.await
		.unwrap();
	let temp = TempDir::new().unwrap();
	let ctx = ExportContext::builder()
		.source(SourceScope::Namespace("shop".to_string()))
		.output_root(temp.path())
		.build();

	let kinds = ctx.validate(Catalog::get()).unwrap();
	let result = Exporter::new(&conn, &ctx).run(&kinds).await;

	assert_matches!(
		result,
		Err(ExportError::Query(QueryError::ClusterQueryFailed { .. }))
	);
	// Objects written before the failure stay on disk.
	assert!(temp.path().join("shop/05_cm/cm_app.yaml").exists());
	assert!(!temp.path().join("shop/08_pvc").exists());
	assert!(!server
		.requested_paths()
		.await
		.iter()
		.any(|p| p.contains("persistentvolumeclaims")));
}
