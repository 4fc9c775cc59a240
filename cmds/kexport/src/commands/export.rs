//! Export command handler.

use std::{collections::HashMap, io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::instrument;

use crate::{
	catalog::Catalog,
	config::FileConfig,
	context::{
		assign_names_files, parse_resource_list, ConfigError, ExportContext, NamesFileArg,
		SourceScope,
	},
	export::{check_prerequisites, Exporter},
	k8s::{
		client::ClusterConnection,
		output::{ColorMode, DiffOutput},
	},
};

#[derive(Args, Debug, Default)]
pub struct ExportArgs {
	/// Namespace to export
	#[arg(short = 'n', long)]
	pub namespace: Option<String>,

	/// Export cluster-scoped resources instead of a namespace
	#[arg(short = 'c', long)]
	pub cluster: bool,

	/// Comma-separated list of resource kinds to export (default: all for the scope)
	#[arg(short = 'r', long, value_name = "KINDS")]
	pub resources: Option<String>,

	/// File listing object names to export, one per line. Repeatable.
	/// A bare PATH applies to the single kind selected with --resources.
	#[arg(short = 'f', long = "names-file", value_name = "[KIND=]PATH")]
	pub names_files: Vec<NamesFileArg>,

	/// Namespace to write into exported objects
	#[arg(short = 't', long)]
	pub target_namespace: Option<String>,

	/// Path to the kubeconfig file
	#[arg(short = 'k', long)]
	pub kubeconfig: Option<PathBuf>,

	/// Kubeconfig context to use
	#[arg(long)]
	pub context: Option<String>,

	/// Root directory of the output tree (default: .)
	#[arg(short = 'o', long)]
	pub output_dir: Option<PathBuf>,

	/// Controls color in preview output
	#[arg(long, value_enum)]
	pub color: Option<ColorMode>,

	/// Do not print the sanitization preview
	#[arg(long)]
	pub no_diff: bool,
}

/// Run the export command.
pub fn run<W: Write>(args: ExportArgs, writer: W) -> Result<()> {
	let cwd = std::env::current_dir().context("reading current directory")?;
	let file_config = FileConfig::load_from_directory(&cwd)?.unwrap_or_default();

	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")?;

	runtime.block_on(run_async(args, file_config, writer))
}

/// Merge flags over the config file into a run context.
pub fn build_context(args: &ExportArgs, file: &FileConfig) -> Result<ExportContext, ConfigError> {
	let source = SourceScope::from_flags(args.namespace.clone(), args.cluster)?;
	let kind_filter = args
		.resources
		.as_deref()
		.map(parse_resource_list)
		.transpose()?;

	let mut names_files: HashMap<String, PathBuf> = file.names_files.clone();
	names_files.extend(assign_names_files(
		args.names_files.clone(),
		kind_filter.as_deref(),
	)?);

	Ok(ExportContext::builder()
		.source(source)
		.maybe_destination_namespace(args.target_namespace.clone())
		.maybe_kind_filter(kind_filter)
		.names_files(names_files)
		.maybe_credentials_path(args.kubeconfig.clone().or_else(|| file.kubeconfig.clone()))
		.maybe_context_name(args.context.clone().or_else(|| file.context.clone()))
		.maybe_output_root(args.output_dir.clone().or_else(|| file.output_dir.clone()))
		.build())
}

#[instrument(skip_all)]
async fn run_async<W: Write>(args: ExportArgs, file: FileConfig, mut writer: W) -> Result<()> {
	let ctx = build_context(&args, &file).context("configuration error")?;
	let kinds = ctx
		.validate(Catalog::get())
		.context("configuration error")?;

	let connection = ClusterConnection::connect(ctx.credentials_path(), ctx.context_name())
		.await
		.context("prerequisite check failed: connecting to Kubernetes cluster")?;
	let version = connection.server_version();
	tracing::debug!(
		cluster = %connection.cluster_identifier(),
		server_version = %format!("{}.{}", version.major, version.minor),
		"connected to cluster"
	);

	check_prerequisites(&connection, &ctx)
		.await
		.context("prerequisite check failed")?;

	let color = args.color.or(file.color).unwrap_or_default();
	let show_diff = !args.no_diff && file.diff.unwrap_or(true);

	let summary = if show_diff {
		Exporter::new(&connection, &ctx)
			.with_preview(DiffOutput::new(&mut writer, color)?)
			.run(&kinds)
			.await
	} else {
		Exporter::new(&connection, &ctx).run(&kinds).await
	}
	.context("export failed")?;

	DiffOutput::new(&mut writer, color)?.write_summary(&summary)?;
	Ok(())
}
