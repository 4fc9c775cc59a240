//! API resources the mock server knows how to address.

/// A served API resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockApiResource {
	/// `v1` for the core group, `<group>/<version>` otherwise.
	pub api_version: String,
	pub kind: String,
	pub plural: String,
	pub namespaced: bool,
}

impl MockApiResource {
	pub fn namespaced(api_version: &str, kind: &str, plural: &str) -> Self {
		Self {
			api_version: api_version.to_string(),
			kind: kind.to_string(),
			plural: plural.to_string(),
			namespaced: true,
		}
	}

	pub fn cluster_scoped(api_version: &str, kind: &str, plural: &str) -> Self {
		Self {
			namespaced: false,
			..Self::namespaced(api_version, kind, plural)
		}
	}

	/// URL prefix for the resource's group version: `/api/v1` or `/apis/<g>/<v>`.
	pub fn prefix(&self) -> String {
		if self.api_version.contains('/') {
			format!("/apis/{}", self.api_version)
		} else {
			format!("/api/{}", self.api_version)
		}
	}

	/// Collection path, scoped to a namespace when the resource is namespaced.
	pub fn collection_path(&self, namespace: Option<&str>) -> String {
		match (self.namespaced, namespace) {
			(true, Some(ns)) => format!("{}/namespaces/{}/{}", self.prefix(), ns, self.plural),
			_ => format!("{}/{}", self.prefix(), self.plural),
		}
	}
}

/// Lookup table from `apiVersion` + `kind` to the served resource.
pub struct ResourceTable {
	resources: Vec<MockApiResource>,
}

impl Default for ResourceTable {
	fn default() -> Self {
		use MockApiResource as R;
		Self {
			resources: vec![
				R::cluster_scoped("v1", "Namespace", "namespaces"),
				R::namespaced("v1", "ResourceQuota", "resourcequotas"),
				R::namespaced("v1", "LimitRange", "limitranges"),
				R::namespaced("v1", "ServiceAccount", "serviceaccounts"),
				R::namespaced("v1", "Secret", "secrets"),
				R::namespaced("v1", "ConfigMap", "configmaps"),
				R::namespaced("v1", "PersistentVolumeClaim", "persistentvolumeclaims"),
				R::cluster_scoped("v1", "PersistentVolume", "persistentvolumes"),
				R::namespaced("v1", "Service", "services"),
				R::namespaced("apps/v1", "Deployment", "deployments"),
				R::namespaced("apps/v1", "StatefulSet", "statefulsets"),
				R::namespaced("apps/v1", "DaemonSet", "daemonsets"),
				R::namespaced("batch/v1", "Job", "jobs"),
				R::namespaced("batch/v1", "CronJob", "cronjobs"),
				R::namespaced("networking.k8s.io/v1", "Ingress", "ingresses"),
				R::namespaced("networking.k8s.io/v1", "NetworkPolicy", "networkpolicies"),
				R::namespaced(
					"autoscaling/v2",
					"HorizontalPodAutoscaler",
					"horizontalpodautoscalers",
				),
				R::namespaced("policy/v1", "PodDisruptionBudget", "poddisruptionbudgets"),
				R::namespaced("rbac.authorization.k8s.io/v1", "Role", "roles"),
				R::namespaced("rbac.authorization.k8s.io/v1", "RoleBinding", "rolebindings"),
				R::cluster_scoped("rbac.authorization.k8s.io/v1", "ClusterRole", "clusterroles"),
				R::cluster_scoped(
					"rbac.authorization.k8s.io/v1",
					"ClusterRoleBinding",
					"clusterrolebindings",
				),
				R::cluster_scoped("storage.k8s.io/v1", "StorageClass", "storageclasses"),
				R::cluster_scoped("scheduling.k8s.io/v1", "PriorityClass", "priorityclasses"),
				R::cluster_scoped(
					"apiextensions.k8s.io/v1",
					"CustomResourceDefinition",
					"customresourcedefinitions",
				),
			],
		}
	}
}

impl ResourceTable {
	pub fn find(&self, api_version: &str, kind: &str) -> Option<&MockApiResource> {
		self.resources
			.iter()
			.find(|r| r.api_version == api_version && r.kind == kind)
	}

	/// Whether `plural` names a served collection (used to tell lists from gets).
	pub fn is_collection(&self, plural: &str) -> bool {
		self.resources.iter().any(|r| r.plural == plural)
	}
}
