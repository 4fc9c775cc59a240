//! Configuration file support.
//!
//! A `.kexport.yaml` file in the working directory or any parent supplies
//! defaults for the export command. Command-line flags always win.

use std::{
	collections::HashMap,
	fs,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::k8s::output::ColorMode;

/// The name of the config file kexport looks for.
pub const CONFIG_FILE_NAME: &str = ".kexport.yaml";

/// Root configuration structure for `.kexport.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
	/// Root of the output tree.
	#[serde(default)]
	pub output_dir: Option<PathBuf>,

	#[serde(default)]
	pub kubeconfig: Option<PathBuf>,

	#[serde(default)]
	pub context: Option<String>,

	#[serde(default)]
	pub color: Option<ColorMode>,

	/// Print the sanitization preview (default: true).
	#[serde(default)]
	pub diff: Option<bool>,

	/// Names files per kind. Relative paths are resolved against the config
	/// file's directory.
	#[serde(default)]
	pub names_files: HashMap<String, PathBuf>,
}

impl FileConfig {
	/// Load config by searching from the given directory upward.
	pub fn load_from_directory(start_dir: &Path) -> Result<Option<Self>> {
		match find_config_file(start_dir) {
			Some(path) => Ok(Some(Self::load_from_file(&path)?)),
			None => Ok(None),
		}
	}

	/// Load config from a specific file path.
	pub fn load_from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.with_context(|| format!("failed to read config file: {}", path.display()))?;
		let mut config: FileConfig = serde_yaml_with_quirks::from_str(&content)
			.with_context(|| format!("failed to parse config file: {}", path.display()))?;

		if let Some(base) = path.parent() {
			config.rebase(base);
		}
		Ok(config)
	}

	/// Make relative paths relative to `base`.
	fn rebase(&mut self, base: &Path) {
		let join = |p: &mut PathBuf| {
			if p.is_relative() {
				*p = base.join(&*p);
			}
		};
		if let Some(p) = self.output_dir.as_mut() {
			join(p);
		}
		if let Some(p) = self.kubeconfig.as_mut() {
			join(p);
		}
		self.names_files.values_mut().for_each(join);
	}
}

/// Search for a config file starting from `start_dir` and walking up to the filesystem root.
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
	let start = start_dir
		.canonicalize()
		.unwrap_or_else(|_| start_dir.to_path_buf());

	start
		.ancestors()
		.map(|dir| dir.join(CONFIG_FILE_NAME))
		.find(|candidate| candidate.is_file())
}
