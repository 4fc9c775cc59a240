//! Export orchestration: resolve, fetch, sanitize, and write each kind in order.
//!
//! Execution is strictly sequential. Kinds run in catalog order, so the `pvc`
//! step has finished recording volume links before the `pv` step resolves.
//! The first failure aborts the run; files already written stay on disk.

use std::{
	fmt,
	io::{self, Write},
	path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
	catalog::{ResourceKind, SpecialBehavior, SECRETS},
	context::ExportContext,
	k8s::{
		diff::ManifestDiff,
		output::{DiffOutput, OutputError},
		query::{ClusterQuery, QueryError},
	},
	resolve::{resolve_targets, PvLinkSet, ResolveError},
	sanitize::{sanitize, SanitizeError},
	yaml,
};

/// Secrets auto-created for the default service account.
const DEFAULT_TOKEN_PREFIX: &str = "default-token-";
const DEFAULT_TOKEN_SUFFIX_LEN: usize = 5;

/// Why a resolved name was not exported. Skips are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
	EmptyName,
	NullName,
	DefaultServiceAccountToken,
}

impl fmt::Display for SkipReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SkipReason::EmptyName => write!(f, "empty name"),
			SkipReason::NullName => write!(f, "null name"),
			SkipReason::DefaultServiceAccountToken => write!(f, "default service account token"),
		}
	}
}

fn is_default_token(name: &str) -> bool {
	name.strip_prefix(DEFAULT_TOKEN_PREFIX).is_some_and(|suffix| {
		suffix.len() == DEFAULT_TOKEN_SUFFIX_LEN
			&& suffix
				.bytes()
				.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
	})
}

/// Decide whether a resolved name must be skipped for a kind.
pub fn skip_reason(kind: &ResourceKind, name: &str) -> Option<SkipReason> {
	if name.is_empty() {
		Some(SkipReason::EmptyName)
	} else if name == "null" {
		Some(SkipReason::NullName)
	} else if kind.name == SECRETS && is_default_token(name) {
		Some(SkipReason::DefaultServiceAccountToken)
	} else {
		None
	}
}

/// Failures detected before any export work begins.
#[derive(Debug, Error)]
pub enum PrerequisiteError {
	#[error("namespace `{0}` does not exist")]
	NamespaceNotFound(String),

	#[error(transparent)]
	Query(#[from] QueryError),
}

/// Check that the source namespace exists, when exporting a namespace.
#[instrument(skip_all)]
pub async fn check_prerequisites<Q: ClusterQuery>(
	query: &Q,
	ctx: &ExportContext,
) -> Result<(), PrerequisiteError> {
	if let Some(ns) = ctx.namespace() {
		if !query.namespace_exists(ns).await? {
			return Err(PrerequisiteError::NamespaceNotFound(ns.to_string()));
		}
	}
	Ok(())
}

/// Errors that abort an export run.
#[derive(Debug, Error)]
pub enum ExportError {
	#[error(transparent)]
	Resolve(#[from] ResolveError),

	#[error(transparent)]
	Query(#[from] QueryError),

	#[error("sanitizing {kind}/{name}")]
	Sanitize {
		kind: String,
		name: String,
		#[source]
		source: SanitizeError,
	},

	#[error("rendering {kind}/{name} as YAML")]
	Yaml {
		kind: String,
		name: String,
		#[source]
		source: serde_saphyr::ser_error::Error,
	},

	#[error("writing {}", path.display())]
	Write {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("writing preview")]
	Preview(#[from] OutputError),
}

/// Outcome of one kind's export step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KindSummary {
	pub kind: &'static str,
	pub exported: Vec<PathBuf>,
	pub skipped: Vec<(String, SkipReason)>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSummary {
	pub scope_root: PathBuf,
	pub kinds: Vec<KindSummary>,
}

impl ExportSummary {
	pub fn exported_count(&self) -> usize {
		self.kinds.iter().map(|k| k.exported.len()).sum()
	}

	pub fn skipped_count(&self) -> usize {
		self.kinds.iter().map(|k| k.skipped.len()).sum()
	}
}

/// Drives the export pipeline against a cluster.
pub struct Exporter<'a, Q, W: Write> {
	query: &'a Q,
	context: &'a ExportContext,
	preview: Option<DiffOutput<W>>,
}

impl<'a, Q: ClusterQuery> Exporter<'a, Q, io::Sink> {
	/// An exporter without preview output.
	pub fn new(query: &'a Q, context: &'a ExportContext) -> Self {
		Self {
			query,
			context,
			preview: None,
		}
	}
}

impl<'a, Q: ClusterQuery, W: Write> Exporter<'a, Q, W> {
	/// Print a raw-to-sanitized diff after each written object.
	pub fn with_preview<W2: Write>(self, preview: DiffOutput<W2>) -> Exporter<'a, Q, W2> {
		Exporter {
			query: self.query,
			context: self.context,
			preview: Some(preview),
		}
	}

	/// Export the given kinds in order.
	#[instrument(skip_all, fields(scope = %self.context.scope(), kinds = kinds.len()))]
	pub async fn run(&mut self, kinds: &[&ResourceKind]) -> Result<ExportSummary, ExportError> {
		let mut links = PvLinkSet::new();
		let mut summary = ExportSummary {
			scope_root: self.context.scope_root(),
			kinds: Vec::with_capacity(kinds.len()),
		};

		for kind in kinds {
			summary.kinds.push(self.export_kind(kind, &mut links).await?);
		}

		info!(
			exported = summary.exported_count(),
			skipped = summary.skipped_count(),
			"export finished"
		);
		Ok(summary)
	}

	#[instrument(skip_all, fields(kind = kind.name))]
	async fn export_kind(
		&mut self,
		kind: &ResourceKind,
		links: &mut PvLinkSet,
	) -> Result<KindSummary, ExportError> {
		let names = resolve_targets(self.query, kind, self.context, links).await?;
		let mut result = KindSummary {
			kind: kind.name,
			..Default::default()
		};

		for name in names {
			if let Some(reason) = skip_reason(kind, &name) {
				warn!(name = %name, %reason, "skipping target");
				result.skipped.push((name, reason));
				continue;
			}

			let (path, bound_volume) = self.export_object(kind, &name).await?;
			if let Some(volume) = bound_volume {
				links.record(name, volume);
			}
			result.exported.push(path);
		}

		if kind.special == SpecialBehavior::LinksToPv {
			links.finish_claims();
		}

		Ok(result)
	}

	/// Fetch, sanitize, and write one object.
	async fn export_object(
		&mut self,
		kind: &ResourceKind,
		name: &str,
	) -> Result<(PathBuf, Option<String>), ExportError> {
		let raw = self
			.query
			.get_object_manifest(kind, name, self.context.namespace())
			.await?;

		let raw_yaml = match self.preview {
			Some(_) => Some(render(kind, name, raw.as_value())?),
			None => None,
		};

		let sanitized = sanitize(raw, kind, self.context.destination_namespace()).map_err(
			|source| ExportError::Sanitize {
				kind: kind.name.to_string(),
				name: name.to_string(),
				source,
			},
		)?;
		let content = render(kind, name, sanitized.manifest.as_value())?;

		let path = self.context.output_path(kind, name);
		write_file(&path, &content)?;
		info!(path = %path.display(), "exported");

		if let (Some(preview), Some(raw_yaml)) = (self.preview.as_mut(), raw_yaml) {
			preview.write_diff(&ManifestDiff {
				kind: kind.name.to_string(),
				name: name.to_string(),
				raw_yaml,
				sanitized_yaml: content,
			})?;
		}

		Ok((path, sanitized.bound_volume))
	}
}

fn render(
	kind: &ResourceKind,
	name: &str,
	value: &serde_json::Value,
) -> Result<String, ExportError> {
	yaml::to_yaml(value).map_err(|source| ExportError::Yaml {
		kind: kind.name.to_string(),
		name: name.to_string(),
		source,
	})
}

fn write_file(path: &Path, content: &str) -> Result<(), ExportError> {
	let write = || -> io::Result<()> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(path, content)
	};
	write().map_err(|source| ExportError::Write {
		path: path.to_path_buf(),
		source,
	})
}
