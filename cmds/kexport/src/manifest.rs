//! Manifest wrappers tracking whether an object has been sanitized.

use serde_json::Value as JsonValue;

/// An object definition exactly as the cluster returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawManifest(JsonValue);

/// An object definition after the sanitization pipeline ran.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedManifest(JsonValue);

impl RawManifest {
	pub fn new(value: JsonValue) -> Self {
		Self(value)
	}

	pub fn as_value(&self) -> &JsonValue {
		&self.0
	}

	pub fn into_value(self) -> JsonValue {
		self.0
	}

	/// `metadata.name`, if present.
	pub fn name(&self) -> Option<&str> {
		self.0.pointer("/metadata/name").and_then(JsonValue::as_str)
	}
}

impl SanitizedManifest {
	pub(crate) fn new(value: JsonValue) -> Self {
		Self(value)
	}

	pub fn as_value(&self) -> &JsonValue {
		&self.0
	}

	pub fn into_value(self) -> JsonValue {
		self.0
	}
}

impl From<JsonValue> for RawManifest {
	fn from(value: JsonValue) -> Self {
		Self::new(value)
	}
}

/// Re-run sanitization on an already exported object.
impl From<SanitizedManifest> for RawManifest {
	fn from(manifest: SanitizedManifest) -> Self {
		Self::new(manifest.into_value())
	}
}
