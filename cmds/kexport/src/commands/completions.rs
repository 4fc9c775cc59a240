//! Completions command handler.

use std::io::Write;

use anyhow::Result;
use clap::{Args, Command};
use clap_complete::Shell;

#[derive(Args, Debug)]
pub struct CompletionsArgs {
	/// Shell to generate completions for
	#[arg(value_enum)]
	pub shell: Shell,
}

/// Print completions for `cmd` to the writer.
pub fn run<W: Write>(args: CompletionsArgs, mut cmd: Command, mut writer: W) -> Result<()> {
	let name = cmd.get_name().to_string();
	clap_complete::generate(args.shell, &mut cmd, name, &mut writer);
	Ok(())
}
