//! Preview of what sanitization removed from an object.

use similar::TextDiff;

/// Raw versus sanitized YAML of a single exported object.
#[derive(Debug, Clone)]
pub struct ManifestDiff {
	pub kind: String,
	pub name: String,
	pub raw_yaml: String,
	pub sanitized_yaml: String,
}

impl ManifestDiff {
	/// `<kind>/<name>`, used in diff headers.
	pub fn display_name(&self) -> String {
		format!("{}/{}", self.kind, self.name)
	}

	pub fn has_changes(&self) -> bool {
		self.raw_yaml != self.sanitized_yaml
	}

	/// Generate a unified diff string from cluster state to exported file.
	pub fn unified_diff(&self) -> String {
		let name = self.display_name();
		TextDiff::from_lines(&self.raw_yaml, &self.sanitized_yaml)
			.unified_diff()
			.context_radius(3)
			.header(&format!("a/{name}"), &format!("b/{name}"))
			.to_string()
	}
}
