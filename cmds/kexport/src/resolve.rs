//! Target resolution: which object names to export for a kind.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::instrument;

use crate::{
	catalog::ResourceKind,
	context::ExportContext,
	k8s::query::{ClusterQuery, QueryError},
};

#[derive(Debug, Error)]
pub enum ResolveError {
	#[error("reading names file for `{kind}`: {}", path.display())]
	NamesFileRead {
		kind: String,
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	Query(#[from] QueryError),
}

/// Claim to volume bindings collected while exporting `pvc`.
///
/// Filled during the claim step and read by the `pv` step of the same run.
#[derive(Debug, Default, Clone)]
pub struct PvLinkSet {
	links: IndexMap<String, String>,
	claims_exported: bool,
}

impl PvLinkSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record that an exported claim is bound to a volume.
	pub fn record(&mut self, claim: impl Into<String>, volume: impl Into<String>) {
		self.links.insert(claim.into(), volume.into());
	}

	/// Mark the claim step as complete.
	pub fn finish_claims(&mut self) {
		self.claims_exported = true;
	}

	pub fn claims_exported(&self) -> bool {
		self.claims_exported
	}

	/// Bound volume names in claim export order, without duplicates.
	pub fn volume_names(&self) -> Vec<String> {
		let mut seen = indexmap::IndexSet::new();
		for volume in self.links.values() {
			seen.insert(volume.clone());
		}
		seen.into_iter().collect()
	}
}

/// How the names for a kind are obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy<'a> {
	/// Volumes bound to claims exported earlier in the run.
	LinkedVolumes,
	/// One name per line of an explicit file.
	NamesFile(&'a Path),
	/// Everything the cluster lists.
	Listing,
}

/// Pick the resolution strategy, in precedence order.
pub fn strategy_for<'a>(kind: &ResourceKind, ctx: &'a ExportContext) -> Strategy<'a> {
	if kind.is_persistent_volume() && ctx.namespace().is_some() {
		return Strategy::LinkedVolumes;
	}
	match ctx.names_file(kind.name) {
		Some(path) => Strategy::NamesFile(path),
		None => Strategy::Listing,
	}
}

/// Parse a names file. Lines are trimmed; blank lines stay as empty entries.
pub fn parse_names(content: &str) -> Vec<String> {
	content.lines().map(|l| l.trim().to_string()).collect()
}

/// Resolve the object names to export for one kind.
#[instrument(skip_all, fields(kind = kind.name))]
pub async fn resolve_targets<Q: ClusterQuery>(
	query: &Q,
	kind: &ResourceKind,
	ctx: &ExportContext,
	links: &PvLinkSet,
) -> Result<Vec<String>, ResolveError> {
	match strategy_for(kind, ctx) {
		Strategy::LinkedVolumes => {
			if !links.claims_exported() {
				tracing::warn!(
					"pv selected without pvc; no volumes are linked, skipping pv export"
				);
			}
			let names = links.volume_names();
			tracing::debug!(count = names.len(), "resolved volumes from exported claims");
			Ok(names)
		}
		Strategy::NamesFile(path) => {
			let content =
				std::fs::read_to_string(path).map_err(|source| ResolveError::NamesFileRead {
					kind: kind.name.to_string(),
					path: path.to_path_buf(),
					source,
				})?;
			let names = parse_names(&content);
			tracing::debug!(
				count = names.len(),
				path = %path.display(),
				"resolved names from file"
			);
			Ok(names)
		}
		Strategy::Listing => {
			let names = query.list_object_names(kind, ctx.namespace()).await?;
			tracing::debug!(count = names.len(), "resolved names from cluster listing");
			Ok(names)
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use assert_matches::assert_matches;
	use tempfile::TempDir;

	use super::*;
	use crate::{
		catalog::Catalog,
		context::SourceScope,
		k8s::ResourceScope,
		test_utils::FakeCluster,
	};

	fn kind(name: &str) -> &'static ResourceKind {
		Catalog::get().lookup(ResourceScope::Namespaced, name).unwrap()
	}

	fn namespace_ctx(names_files: HashMap<String, PathBuf>) -> ExportContext {
		ExportContext::builder()
			.source(SourceScope::Namespace("shop".to_string()))
			.names_files(names_files)
			.build()
	}

	#[test]
	fn test_link_set_dedupes_in_claim_order() {
		let mut links = PvLinkSet::new();
		links.record("b", "pv-002");
		links.record("a", "pv-001");
		links.record("c", "pv-002");
		assert_eq!(links.volume_names(), vec!["pv-002", "pv-001"]);
	}

	#[test]
	fn test_parse_names_keeps_blank_lines() {
		assert_eq!(parse_names("a\n\n  b  \n"), vec!["a", "", "b"]);
	}

	#[test]
	fn test_pv_uses_links_even_with_names_file() {
		let ctx = namespace_ctx(HashMap::from([(
			"pv".to_string(),
			PathBuf::from("pv.txt"),
		)]));
		assert_eq!(strategy_for(kind("pv"), &ctx), Strategy::LinkedVolumes);
	}

	#[test]
	fn test_pv_lists_in_cluster_scope() {
		let ctx = ExportContext::builder().source(SourceScope::Cluster).build();
		assert_eq!(strategy_for(kind("pv"), &ctx), Strategy::Listing);
	}

	#[tokio::test]
	async fn test_pv_without_claim_step_resolves_nothing() {
		let cluster = FakeCluster::new().with_object("pv", "pv-001", serde_json::json!({}));
		let names = resolve_targets(
			&cluster,
			kind("pv"),
			&namespace_ctx(HashMap::new()),
			&PvLinkSet::new(),
		)
		.await
		.unwrap();
		assert!(names.is_empty());
		assert!(cluster.calls().is_empty());
	}

	#[tokio::test]
	async fn test_names_file_wins_over_listing() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("cm.txt");
		std::fs::write(&path, "second\n\nfirst\n").unwrap();

		let cluster = FakeCluster::new().with_object("cm", "listed", serde_json::json!({}));
		let ctx = namespace_ctx(HashMap::from([("cm".to_string(), path)]));

		let names = resolve_targets(&cluster, kind("cm"), &ctx, &PvLinkSet::new())
			.await
			.unwrap();
		assert_eq!(names, vec!["second", "", "first"]);
		assert!(cluster.calls().is_empty());
	}

	#[tokio::test]
	async fn test_listing_when_no_file() {
		let cluster = FakeCluster::new()
			.with_object("cm", "one", serde_json::json!({}))
			.with_object("cm", "two", serde_json::json!({}));
		let names = resolve_targets(
			&cluster,
			kind("cm"),
			&namespace_ctx(HashMap::new()),
			&PvLinkSet::new(),
		)
		.await
		.unwrap();
		assert_eq!(names, vec!["one", "two"]);
	}

	#[tokio::test]
	async fn test_unreadable_names_file() {
		let temp = TempDir::new().unwrap();
		let ctx = namespace_ctx(HashMap::from([(
			"cm".to_string(),
			temp.path().join("gone.txt"),
		)]));
		let result =
			resolve_targets(&FakeCluster::new(), kind("cm"), &ctx, &PvLinkSet::new()).await;
		assert_matches!(result, Err(ResolveError::NamesFileRead { kind, .. }) if kind == "cm");
	}

	#[tokio::test]
	async fn test_listing_failure_propagates() {
		let cluster = FakeCluster::new().failing_list("cm");
		let result = resolve_targets(
			&cluster,
			kind("cm"),
			&namespace_ctx(HashMap::new()),
			&PvLinkSet::new(),
		)
		.await;
		assert_matches!(
			result,
			Err(ResolveError::Query(QueryError::ClusterQueryFailed { .. }))
		);
	}
}
