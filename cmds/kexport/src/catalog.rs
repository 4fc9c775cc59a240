//! Resource catalog: which kinds can be exported, in which order, and how
//! each kind's manifest is cleaned up before it is written.
//!
//! The catalog is the single source of truth for kind scoping. Namespace-scope
//! and cluster-scope kinds are kept in two disjoint tables; the position of a
//! kind in its table is its order index, which prefixes the output directory.

use std::{fmt, sync::OnceLock};

use kube::{core::GroupVersionKind, discovery::ApiResource};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use crate::k8s::ResourceScope;

/// Short name of the persistent volume kind, resolved from PVC links.
pub const PERSISTENT_VOLUME: &str = "pv";

/// Short name of the secret kind, subject to default token filtering.
pub const SECRETS: &str = "secrets";

/// Errors raised by catalog lookups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
	#[error(
		"unknown resource kind `{kind}` for {scope} scope. Supported kinds: {}",
		supported.join(", ")
	)]
	UnknownResourceKind {
		kind: String,
		scope: ResourceScope,
		supported: Vec<String>,
	},
}

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
	/// A mapping key.
	Key(String),
	/// Every element of a sequence, or every value of a mapping.
	Any,
}

/// A path into a manifest, e.g. `spec.ports.*.nodePort`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
	/// Build a path from its segments. A literal `*` becomes a wildcard;
	/// keys may contain dots (annotation names do).
	pub fn new(segments: &[&str]) -> Self {
		Self(
			segments
				.iter()
				.map(|s| match *s {
					"*" => PathSegment::Any,
					key => PathSegment::Key(key.to_string()),
				})
				.collect(),
		)
	}

	pub fn segments(&self) -> &[PathSegment] {
		&self.0
	}
}

impl fmt::Display for FieldPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, segment) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str(".")?;
			}
			match segment {
				PathSegment::Any => f.write_str("*")?,
				PathSegment::Key(key) => f.write_str(&key.replace('.', "\\."))?,
			}
		}
		Ok(())
	}
}

/// What a rule does to the value found at its path.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldAction {
	/// Remove the field. A missing field is not an error.
	Delete,
	/// Remove the field unless it currently holds the given value.
	DeleteUnless(JsonValue),
	/// Write the destination namespace, when one is configured.
	SetNamespace,
	/// Replace the status subtree with a fresh value.
	ResetStatus(JsonValue),
	/// Force the object generation counter.
	SetGeneration(i64),
}

/// A single declarative transformation applied by the sanitizer.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
	pub path: FieldPath,
	pub action: FieldAction,
}

impl FieldRule {
	fn delete(segments: &[&str]) -> Self {
		Self {
			path: FieldPath::new(segments),
			action: FieldAction::Delete,
		}
	}
}

/// Kind-specific behavior beyond plain field rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialBehavior {
	None,
	/// Exported claims feed their bound volume into the `pv` step.
	LinksToPv,
	/// The generation counter is reset to 1.
	ResetsGeneration,
	/// Cluster-assigned service IPs are dropped, except for headless services.
	SetsServiceIpTransient,
}

/// Where a kind lives in the Kubernetes API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCoordinates {
	pub group: &'static str,
	pub version: &'static str,
	pub kind: &'static str,
	pub plural: &'static str,
	/// Whether the API object itself is namespaced. `pv` is exported as part of
	/// a namespace but addressed cluster-wide.
	pub namespaced: bool,
}

impl ApiCoordinates {
	/// Build the kube-rs dynamic resource descriptor.
	pub fn api_resource(&self) -> ApiResource {
		ApiResource::from_gvk_with_plural(
			&GroupVersionKind::gvk(self.group, self.version, self.kind),
			self.plural,
		)
	}
}

/// An exportable resource kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceKind {
	/// Short name used on the command line and in output paths.
	pub name: &'static str,
	pub scope: ResourceScope,
	/// Two-digit position in the scope's export order.
	pub order_index: String,
	pub api: ApiCoordinates,
	pub special: SpecialBehavior,
	rules: Vec<FieldRule>,
}

impl ResourceKind {
	/// Sanitization rules in the order they must be applied.
	pub fn rules(&self) -> &[FieldRule] {
		&self.rules
	}

	/// Output directory name: `<order-index>_<kind>`.
	pub fn dir_name(&self) -> String {
		format!("{}_{}", self.order_index, self.name)
	}

	/// Output file name for one object: `<kind>_<name>.yaml`.
	pub fn file_name(&self, object_name: &str) -> String {
		format!("{}_{}.yaml", self.name, object_name)
	}

	pub fn is_persistent_volume(&self) -> bool {
		self.name == PERSISTENT_VOLUME
	}
}

/// Static description of a kind, expanded into a [`ResourceKind`] at startup.
struct KindDef {
	name: &'static str,
	api: ApiCoordinates,
	special: SpecialBehavior,
	/// Where the destination namespace is written, if anywhere.
	namespace_path: Option<&'static [&'static str]>,
	extra_deletes: &'static [&'static [&'static str]],
	status: StatusPolicy,
}

#[derive(Clone, Copy)]
enum StatusPolicy {
	/// Status stays deleted.
	Drop,
	Empty,
	ZeroReplicas,
	EmptyLoadBalancer,
}

impl StatusPolicy {
	fn reset_value(self) -> Option<JsonValue> {
		match self {
			StatusPolicy::Drop => None,
			StatusPolicy::Empty => Some(json!({})),
			StatusPolicy::ZeroReplicas => Some(json!({ "replicas": 0 })),
			StatusPolicy::EmptyLoadBalancer => Some(json!({ "loadBalancer": {} })),
		}
	}
}

/// Server-managed fields stripped from every kind.
const COMMON_DELETES: &[&[&str]] = &[
	&[
		"metadata",
		"annotations",
		"kubectl.kubernetes.io/last-applied-configuration",
	],
	&["metadata", "creationTimestamp"],
	&["metadata", "selfLink"],
	&["metadata", "resourceVersion"],
	&["metadata", "uid"],
	&["metadata", "managedFields"],
	&["status"],
];

const METADATA_NAMESPACE: &[&str] = &["metadata", "namespace"];
const CLAIM_REF_NAMESPACE: &[&str] = &["spec", "claimRef", "namespace"];

/// Service fields holding cluster-assigned addresses.
const SERVICE_TRANSIENT_IPS: &[&[&str]] = &[&["spec", "clusterIP"], &["spec", "clusterIPs"]];

/// Value of `spec.clusterIP` on a headless service.
const HEADLESS_CLUSTER_IP: &str = "None";

const fn core(kind: &'static str, plural: &'static str, namespaced: bool) -> ApiCoordinates {
	grouped("", "v1", kind, plural, namespaced)
}

const fn grouped(
	group: &'static str,
	version: &'static str,
	kind: &'static str,
	plural: &'static str,
	namespaced: bool,
) -> ApiCoordinates {
	ApiCoordinates {
		group,
		version,
		kind,
		plural,
		namespaced,
	}
}

const fn namespaced_kind(name: &'static str, api: ApiCoordinates) -> KindDef {
	KindDef {
		name,
		api,
		special: SpecialBehavior::None,
		namespace_path: Some(METADATA_NAMESPACE),
		extra_deletes: &[],
		status: StatusPolicy::Drop,
	}
}

const fn cluster_kind(name: &'static str, api: ApiCoordinates) -> KindDef {
	KindDef {
		name,
		api,
		special: SpecialBehavior::None,
		namespace_path: None,
		extra_deletes: &[],
		status: StatusPolicy::Drop,
	}
}

fn namespaced_defs() -> Vec<KindDef> {
	vec![
		KindDef {
			status: StatusPolicy::Empty,
			..namespaced_kind("quota", core("ResourceQuota", "resourcequotas", true))
		},
		KindDef {
			status: StatusPolicy::Empty,
			..namespaced_kind("limits", core("LimitRange", "limitranges", true))
		},
		namespaced_kind("sa", core("ServiceAccount", "serviceaccounts", true)),
		namespaced_kind(SECRETS, core("Secret", "secrets", true)),
		namespaced_kind("cm", core("ConfigMap", "configmaps", true)),
		namespaced_kind(
			"roles",
			grouped("rbac.authorization.k8s.io", "v1", "Role", "roles", true),
		),
		namespaced_kind(
			"rolebindings",
			grouped(
				"rbac.authorization.k8s.io",
				"v1",
				"RoleBinding",
				"rolebindings",
				true,
			),
		),
		KindDef {
			special: SpecialBehavior::LinksToPv,
			extra_deletes: &[
				&["metadata", "annotations", "pv.kubernetes.io/bind-completed"],
				&[
					"metadata",
					"annotations",
					"pv.kubernetes.io/bound-by-controller",
				],
			],
			status: StatusPolicy::Empty,
			..namespaced_kind(
				"pvc",
				core("PersistentVolumeClaim", "persistentvolumeclaims", true),
			)
		},
		KindDef {
			namespace_path: Some(CLAIM_REF_NAMESPACE),
			extra_deletes: &[
				&["spec", "claimRef", "uid"],
				&["spec", "claimRef", "resourceVersion"],
			],
			..namespaced_kind(
				PERSISTENT_VOLUME,
				core("PersistentVolume", "persistentvolumes", false),
			)
		},
		KindDef {
			special: SpecialBehavior::SetsServiceIpTransient,
			extra_deletes: &[&["spec", "ports", "*", "nodePort"], &["spec", "healthCheckNodePort"]],
			status: StatusPolicy::EmptyLoadBalancer,
			..namespaced_kind("svc", core("Service", "services", true))
		},
		KindDef {
			extra_deletes: &[&[
				"metadata",
				"annotations",
				"deployment.kubernetes.io/revision",
			]],
			status: StatusPolicy::Empty,
			..namespaced_kind(
				"deploy",
				grouped("apps", "v1", "Deployment", "deployments", true),
			)
		},
		KindDef {
			special: SpecialBehavior::ResetsGeneration,
			status: StatusPolicy::ZeroReplicas,
			..namespaced_kind(
				"sts",
				grouped("apps", "v1", "StatefulSet", "statefulsets", true),
			)
		},
		namespaced_kind("ds", grouped("apps", "v1", "DaemonSet", "daemonsets", true)),
		namespaced_kind(
			"cronjobs",
			grouped("batch", "v1", "CronJob", "cronjobs", true),
		),
		KindDef {
			extra_deletes: &[
				&["spec", "selector"],
				&["spec", "template", "metadata", "labels", "controller-uid"],
				&[
					"spec",
					"template",
					"metadata",
					"labels",
					"batch.kubernetes.io/controller-uid",
				],
			],
			status: StatusPolicy::Empty,
			..namespaced_kind("job", grouped("batch", "v1", "Job", "jobs", true))
		},
		KindDef {
			status: StatusPolicy::EmptyLoadBalancer,
			..namespaced_kind(
				"ing",
				grouped("networking.k8s.io", "v1", "Ingress", "ingresses", true),
			)
		},
		namespaced_kind(
			"hpa",
			grouped(
				"autoscaling",
				"v2",
				"HorizontalPodAutoscaler",
				"horizontalpodautoscalers",
				true,
			),
		),
		namespaced_kind(
			"netpol",
			grouped(
				"networking.k8s.io",
				"v1",
				"NetworkPolicy",
				"networkpolicies",
				true,
			),
		),
		namespaced_kind(
			"pdb",
			grouped(
				"policy",
				"v1",
				"PodDisruptionBudget",
				"poddisruptionbudgets",
				true,
			),
		),
	]
}

fn cluster_defs() -> Vec<KindDef> {
	vec![
		cluster_kind(
			"clusterroles",
			grouped(
				"rbac.authorization.k8s.io",
				"v1",
				"ClusterRole",
				"clusterroles",
				false,
			),
		),
		cluster_kind(
			"clusterrolebindings",
			grouped(
				"rbac.authorization.k8s.io",
				"v1",
				"ClusterRoleBinding",
				"clusterrolebindings",
				false,
			),
		),
		cluster_kind(
			"sc",
			grouped(
				"storage.k8s.io",
				"v1",
				"StorageClass",
				"storageclasses",
				false,
			),
		),
		cluster_kind(
			"pc",
			grouped(
				"scheduling.k8s.io",
				"v1",
				"PriorityClass",
				"priorityclasses",
				false,
			),
		),
		cluster_kind(
			"crd",
			grouped(
				"apiextensions.k8s.io",
				"v1",
				"CustomResourceDefinition",
				"customresourcedefinitions",
				false,
			),
		),
	]
}

/// Expand a kind definition into its ordered rule list.
///
/// Order: deletes, namespace rewrite, status reset, generation. The status
/// reset writes a fresh key after the original subtree was deleted.
fn build_kind(def: KindDef, scope: ResourceScope, position: usize) -> ResourceKind {
	let mut rules: Vec<FieldRule> = COMMON_DELETES
		.iter()
		.chain(def.extra_deletes)
		.map(|segments| FieldRule::delete(segments))
		.collect();

	if def.special == SpecialBehavior::SetsServiceIpTransient {
		rules.extend(SERVICE_TRANSIENT_IPS.iter().map(|segments| FieldRule {
			path: FieldPath::new(segments),
			action: FieldAction::DeleteUnless(if segments.last() == Some(&"clusterIPs") {
				json!([HEADLESS_CLUSTER_IP])
			} else {
				json!(HEADLESS_CLUSTER_IP)
			}),
		}));
	}

	if let Some(path) = def.namespace_path {
		rules.push(FieldRule {
			path: FieldPath::new(path),
			action: FieldAction::SetNamespace,
		});
	}

	if let Some(value) = def.status.reset_value() {
		rules.push(FieldRule {
			path: FieldPath::new(&["status"]),
			action: FieldAction::ResetStatus(value),
		});
	}

	if def.special == SpecialBehavior::ResetsGeneration {
		rules.push(FieldRule {
			path: FieldPath::new(&["metadata", "generation"]),
			action: FieldAction::SetGeneration(1),
		});
	}

	ResourceKind {
		name: def.name,
		scope,
		order_index: format!("{:02}", position + 1),
		api: def.api,
		special: def.special,
		rules,
	}
}

/// Registry of exportable kinds for both scopes.
#[derive(Debug)]
pub struct Catalog {
	namespaced: Vec<ResourceKind>,
	cluster: Vec<ResourceKind>,
}

static CATALOG: OnceLock<Catalog> = OnceLock::new();

impl Catalog {
	/// The process-wide catalog.
	pub fn get() -> &'static Catalog {
		CATALOG.get_or_init(Self::build)
	}

	fn build() -> Self {
		let expand = |defs: Vec<KindDef>, scope: ResourceScope| -> Vec<ResourceKind> {
			defs.into_iter()
				.enumerate()
				.map(|(i, def)| build_kind(def, scope, i))
				.collect()
		};
		Self {
			namespaced: expand(namespaced_defs(), ResourceScope::Namespaced),
			cluster: expand(cluster_defs(), ResourceScope::ClusterWide),
		}
	}

	/// Kinds of a scope, in export order.
	pub fn kinds_for(&self, scope: ResourceScope) -> &[ResourceKind] {
		match scope {
			ResourceScope::Namespaced => &self.namespaced,
			ResourceScope::ClusterWide => &self.cluster,
		}
	}

	/// Short names of every kind supported in a scope.
	pub fn supported(&self, scope: ResourceScope) -> Vec<String> {
		self.kinds_for(scope)
			.iter()
			.map(|k| k.name.to_string())
			.collect()
	}

	pub fn lookup(&self, scope: ResourceScope, name: &str) -> Result<&ResourceKind, CatalogError> {
		self.kinds_for(scope)
			.iter()
			.find(|k| k.name == name)
			.ok_or_else(|| CatalogError::UnknownResourceKind {
				kind: name.to_string(),
				scope,
				supported: self.supported(scope),
			})
	}

	pub fn rules_for(
		&self,
		scope: ResourceScope,
		name: &str,
	) -> Result<&[FieldRule], CatalogError> {
		self.lookup(scope, name).map(ResourceKind::rules)
	}

	/// Kinds to export for a scope, optionally narrowed by a filter.
	///
	/// The result always follows catalog order, whatever order the filter uses.
	/// Every filter entry must name a kind of this scope.
	pub fn select(
		&self,
		scope: ResourceScope,
		filter: Option<&[String]>,
	) -> Result<Vec<&ResourceKind>, CatalogError> {
		let Some(filter) = filter else {
			return Ok(self.kinds_for(scope).iter().collect());
		};

		for name in filter {
			self.lookup(scope, name)?;
		}

		Ok(self
			.kinds_for(scope)
			.iter()
			.filter(|k| filter.iter().any(|f| f == k.name))
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use assert_matches::assert_matches;
	use rstest::rstest;

	use super::*;

	#[test]
	fn test_scopes_are_disjoint() {
		let catalog = Catalog::get();
		let namespaced: HashSet<_> = catalog
			.supported(ResourceScope::Namespaced)
			.into_iter()
			.collect();
		let cluster: HashSet<_> = catalog
			.supported(ResourceScope::ClusterWide)
			.into_iter()
			.collect();
		assert!(namespaced.is_disjoint(&cluster));
	}

	#[rstest]
	#[case(ResourceScope::Namespaced)]
	#[case(ResourceScope::ClusterWide)]
	fn test_order_index_unique_and_sequential(#[case] scope: ResourceScope) {
		let kinds = Catalog::get().kinds_for(scope);
		let indexes: Vec<_> = kinds.iter().map(|k| k.order_index.as_str()).collect();
		let unique: HashSet<_> = indexes.iter().collect();
		assert_eq!(unique.len(), indexes.len());
		assert_eq!(indexes[0], "01");
		assert!(indexes.iter().all(|i| i.len() == 2));
	}

	#[test]
	fn test_pvc_runs_before_pv() {
		let kinds = Catalog::get().kinds_for(ResourceScope::Namespaced);
		let pvc = kinds.iter().position(|k| k.name == "pvc").unwrap();
		let pv = kinds.iter().position(|k| k.name == "pv").unwrap();
		assert!(pvc < pv);
	}

	#[test]
	fn test_unknown_kind_lists_supported() {
		let err = Catalog::get()
			.lookup(ResourceScope::ClusterWide, "deploy")
			.unwrap_err();
		assert_matches!(
			&err,
			CatalogError::UnknownResourceKind { kind, supported, .. }
				if kind == "deploy" && supported.contains(&"clusterroles".to_string())
		);
		assert!(err.to_string().contains("clusterroles"));
	}

	#[test]
	fn test_select_keeps_catalog_order() {
		let filter = vec!["svc".to_string(), "pvc".to_string(), "cm".to_string()];
		let kinds = Catalog::get()
			.select(ResourceScope::Namespaced, Some(filter.as_slice()))
			.unwrap();
		let names: Vec<_> = kinds.iter().map(|k| k.name).collect();
		assert_eq!(names, vec!["cm", "pvc", "svc"]);
	}

	#[test]
	fn test_select_rejects_kind_of_other_scope() {
		let filter = vec!["clusterroles".to_string()];
		let result = Catalog::get().select(ResourceScope::Namespaced, Some(filter.as_slice()));
		assert_matches!(result, Err(CatalogError::UnknownResourceKind { .. }));
	}

	#[test]
	fn test_rules_order_for_statefulset() {
		let rules = Catalog::get()
			.rules_for(ResourceScope::Namespaced, "sts")
			.unwrap();
		let status_delete = rules
			.iter()
			.position(|r| r.action == FieldAction::Delete && r.path.to_string() == "status")
			.unwrap();
		let status_reset = rules
			.iter()
			.position(|r| matches!(r.action, FieldAction::ResetStatus(_)))
			.unwrap();
		assert!(status_delete < status_reset);
		assert_eq!(
			rules.last().map(|r| &r.action),
			Some(&FieldAction::SetGeneration(1))
		);
	}

	#[test]
	fn test_cluster_kinds_never_set_namespace() {
		for kind in Catalog::get().kinds_for(ResourceScope::ClusterWide) {
			assert!(
				kind.rules().iter().all(|r| r.action != FieldAction::SetNamespace),
				"{} must not rewrite namespaces",
				kind.name
			);
		}
	}

	#[test]
	fn test_pv_rewrites_claim_ref_namespace() {
		let rules = Catalog::get()
			.rules_for(ResourceScope::Namespaced, PERSISTENT_VOLUME)
			.unwrap();
		let target = rules
			.iter()
			.find(|r| r.action == FieldAction::SetNamespace)
			.unwrap();
		assert_eq!(target.path.to_string(), "spec.claimRef.namespace");
	}

	#[test]
	fn test_field_path_display_escapes_dots() {
		let path = FieldPath::new(&[
			"metadata",
			"annotations",
			"kubectl.kubernetes.io/last-applied-configuration",
		]);
		assert_eq!(
			path.to_string(),
			"metadata.annotations.kubectl\\.kubernetes\\.io/last-applied-configuration"
		);
		assert_eq!(
			FieldPath::new(&["spec", "ports", "*", "nodePort"]).to_string(),
			"spec.ports.*.nodePort"
		);
	}

	#[test]
	fn test_layout_names() {
		let kind = Catalog::get()
			.lookup(ResourceScope::Namespaced, "pvc")
			.unwrap();
		assert_eq!(kind.dir_name(), "08_pvc");
		assert_eq!(kind.file_name("data"), "pvc_data.yaml");
	}

	#[test]
	fn test_api_resource_for_grouped_kind() {
		let kind = Catalog::get()
			.lookup(ResourceScope::Namespaced, "deploy")
			.unwrap();
		let ar = kind.api.api_resource();
		assert_eq!(ar.api_version, "apps/v1");
		assert_eq!(ar.plural, "deployments");
	}
}
