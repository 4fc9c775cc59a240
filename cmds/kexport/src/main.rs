use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use kexport::{commands, commands::util::BrokenPipeGuard, telemetry};

#[cfg(all(
	target_os = "linux",
	feature = "mimalloc",
	not(feature = "system-alloc")
))]
#[global_allocator]
static GLOBAL: mimallocator::Mimalloc = mimallocator::Mimalloc;

#[derive(Parser)]
#[command(name = "kexport")]
#[command(about = "Export sanitized Kubernetes manifests", long_about = None)]
#[command(version = env!("KEXPORT_VERSION"))]
struct Cli {
	/// Log level (trace, debug, info, warn, error). Overrides RUST_LOG.
	#[arg(long, global = true)]
	log_level: Option<tracing::Level>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Export a namespace or the cluster-scoped objects into YAML files
	Export(commands::export::ExportArgs),

	/// List the resource kinds that can be exported
	Resources(commands::resources::ResourcesArgs),

	/// Print shell completions
	Completions(commands::completions::CompletionsArgs),
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	let _telemetry = telemetry::init(cli.log_level)?;

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	match cli.command {
		Commands::Export(args) => commands::export::run(args, stdout),
		Commands::Resources(args) => commands::resources::run(args, stdout),
		Commands::Completions(args) => commands::completions::run(args, Cli::command(), stdout),
	}
}
