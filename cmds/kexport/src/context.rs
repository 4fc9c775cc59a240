//! Run-wide export configuration.
//!
//! [`ExportContext`] is assembled once from the command line (and the optional
//! config file), validated against the catalog, and read-only afterwards.

use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	str::FromStr,
};

use bon::Builder;
use thiserror::Error;

use crate::{
	catalog::{Catalog, CatalogError, ResourceKind},
	k8s::ResourceScope,
};

/// Output directory used for cluster-scope exports.
pub const CLUSTER_DIR: &str = "CLUSTER";

/// Invalid or conflicting configuration. Reported before any cluster call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
	#[error("--namespace and --cluster are mutually exclusive")]
	ConflictingScope,

	#[error("either --namespace or --cluster is required")]
	MissingScope,

	#[error("--target-namespace cannot be used with --cluster")]
	TargetNamespaceWithCluster,

	#[error(transparent)]
	UnknownResourceKind(#[from] CatalogError),

	#[error("names file for `{kind}` not found: {}", path.display())]
	MissingNamesFile { kind: String, path: PathBuf },

	#[error(
		"names file `{}` has no kind; use KIND=PATH or select one resource with --resources",
		.0.display()
	)]
	AmbiguousNamesFile(PathBuf),

	#[error("empty entry in resource list")]
	EmptyResourceName,
}

/// Where objects are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceScope {
	Namespace(String),
	Cluster,
}

impl SourceScope {
	/// Combine the two mutually exclusive scope flags.
	pub fn from_flags(namespace: Option<String>, cluster: bool) -> Result<Self, ConfigError> {
		match (namespace, cluster) {
			(Some(_), true) => Err(ConfigError::ConflictingScope),
			(Some(ns), false) => Ok(Self::Namespace(ns)),
			(None, true) => Ok(Self::Cluster),
			(None, false) => Err(ConfigError::MissingScope),
		}
	}
}

/// A `--names-file` argument: `KIND=PATH`, or a bare `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamesFileArg {
	pub kind: Option<String>,
	pub path: PathBuf,
}

impl FromStr for NamesFileArg {
	type Err = std::convert::Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		// Kind names never contain path separators.
		Ok(match s.split_once('=') {
			Some((kind, path)) if !kind.is_empty() && !kind.contains(['/', '\\']) => Self {
				kind: Some(kind.to_string()),
				path: PathBuf::from(path),
			},
			_ => Self {
				kind: None,
				path: PathBuf::from(s),
			},
		})
	}
}

/// Parse a comma-separated resource list, e.g. `pvc,svc`.
pub fn parse_resource_list(list: &str) -> Result<Vec<String>, ConfigError> {
	list.split(',')
		.map(str::trim)
		.map(|s| {
			if s.is_empty() {
				Err(ConfigError::EmptyResourceName)
			} else {
				Ok(s.to_string())
			}
		})
		.collect()
}

/// Attach bare names-file paths to the single selected kind.
pub fn assign_names_files(
	args: Vec<NamesFileArg>,
	kind_filter: Option<&[String]>,
) -> Result<HashMap<String, PathBuf>, ConfigError> {
	let mut files = HashMap::new();
	for arg in args {
		let kind = match (arg.kind, kind_filter) {
			(Some(kind), _) => kind,
			(None, Some([only])) => only.clone(),
			(None, _) => return Err(ConfigError::AmbiguousNamesFile(arg.path)),
		};
		files.insert(kind, arg.path);
	}
	Ok(files)
}

/// Process-wide export configuration.
#[derive(Debug, Clone, Builder)]
pub struct ExportContext {
	source: SourceScope,
	/// Namespace written into exported objects.
	#[builder(into)]
	destination_namespace: Option<String>,
	/// Restrict the export to these kinds (short names).
	kind_filter: Option<Vec<String>>,
	/// Explicit object names per kind, one per line.
	#[builder(default)]
	names_files: HashMap<String, PathBuf>,
	/// Kubeconfig to connect with.
	#[builder(into)]
	credentials_path: Option<PathBuf>,
	/// Kubeconfig context to use instead of the current one.
	#[builder(into)]
	context_name: Option<String>,
	/// Root of the output tree.
	#[builder(into, default = PathBuf::from("."))]
	output_root: PathBuf,
}

impl ExportContext {
	/// Catalog scope the run draws kinds from.
	pub fn scope(&self) -> ResourceScope {
		match self.source {
			SourceScope::Namespace(_) => ResourceScope::Namespaced,
			SourceScope::Cluster => ResourceScope::ClusterWide,
		}
	}

	/// Source namespace, when exporting a namespace.
	pub fn namespace(&self) -> Option<&str> {
		match &self.source {
			SourceScope::Namespace(ns) => Some(ns),
			SourceScope::Cluster => None,
		}
	}

	pub fn destination_namespace(&self) -> Option<&str> {
		self.destination_namespace.as_deref()
	}

	pub fn kind_filter(&self) -> Option<&[String]> {
		self.kind_filter.as_deref()
	}

	pub fn names_file(&self, kind: &str) -> Option<&Path> {
		self.names_files.get(kind).map(PathBuf::as_path)
	}

	pub fn credentials_path(&self) -> Option<&Path> {
		self.credentials_path.as_deref()
	}

	pub fn context_name(&self) -> Option<&str> {
		self.context_name.as_deref()
	}

	/// `<root>/<namespace-or-CLUSTER>`.
	pub fn scope_root(&self) -> PathBuf {
		match &self.source {
			SourceScope::Namespace(ns) => self.output_root.join(ns),
			SourceScope::Cluster => self.output_root.join(CLUSTER_DIR),
		}
	}

	/// `<root>/<scope>/<idx>_<kind>/<kind>_<name>.yaml`.
	pub fn output_path(&self, kind: &ResourceKind, object_name: &str) -> PathBuf {
		self.scope_root()
			.join(kind.dir_name())
			.join(kind.file_name(object_name))
	}

	/// Check the configuration and return the kinds to export, in catalog order.
	pub fn validate<'c>(&self, catalog: &'c Catalog) -> Result<Vec<&'c ResourceKind>, ConfigError> {
		if self.source == SourceScope::Cluster && self.destination_namespace.is_some() {
			return Err(ConfigError::TargetNamespaceWithCluster);
		}

		let kinds = catalog.select(self.scope(), self.kind_filter())?;

		for (kind, path) in &self.names_files {
			catalog.lookup(self.scope(), kind)?;
			if !path.is_file() {
				return Err(ConfigError::MissingNamesFile {
					kind: kind.clone(),
					path: path.clone(),
				});
			}
		}

		Ok(kinds)
	}
}
