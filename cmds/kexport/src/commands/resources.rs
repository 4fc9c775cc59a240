//! Resources command handler: list the kinds a scope can export.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use tabwriter::TabWriter;

use crate::{catalog::Catalog, k8s::ResourceScope};

#[derive(Args, Debug, Default)]
pub struct ResourcesArgs {
	/// List cluster-scoped kinds instead of namespaced ones
	#[arg(short = 'c', long)]
	pub cluster: bool,
}

/// Run the resources command.
pub fn run<W: Write>(args: ResourcesArgs, writer: W) -> Result<()> {
	let scope = if args.cluster {
		ResourceScope::ClusterWide
	} else {
		ResourceScope::Namespaced
	};
	write_table(Catalog::get(), scope, writer)
}

fn write_table<W: Write>(catalog: &Catalog, scope: ResourceScope, writer: W) -> Result<()> {
	let mut tw = TabWriter::new(writer);
	writeln!(tw, "INDEX\tKIND\tAPI VERSION\tAPI KIND")?;
	for kind in catalog.kinds_for(scope) {
		let api_version = match kind.api.group {
			"" => kind.api.version.to_string(),
			group => format!("{}/{}", group, kind.api.version),
		};
		writeln!(
			tw,
			"{}\t{}\t{}\t{}",
			kind.order_index, kind.name, api_version, kind.api.kind
		)?;
	}
	tw.flush().context("writing resource table")?;
	Ok(())
}
