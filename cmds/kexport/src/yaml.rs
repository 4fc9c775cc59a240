//! YAML rendering for exported manifests.
//!
//! Output is deterministic: mapping keys are sorted recursively, so exporting
//! the same object twice yields byte-identical files.

use serde_json::Value as JsonValue;
use tracing::instrument;

/// Sort all object keys recursively, in plain lexicographic order.
///
/// Relies on `serde_json`'s `preserve_order`, so the rebuilt map keeps the
/// sorted insertion order.
pub fn sort_keys(value: JsonValue) -> JsonValue {
	match value {
		JsonValue::Object(map) => {
			let mut entries: Vec<(String, JsonValue)> = map.into_iter().collect();
			entries.sort_by(|(a, _), (b, _)| a.cmp(b));
			JsonValue::Object(
				entries
					.into_iter()
					.map(|(k, v)| (k, sort_keys(v)))
					.collect(),
			)
		}
		JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(sort_keys).collect()),
		other => other,
	}
}

/// Serialize a manifest as a YAML document.
#[instrument(skip_all)]
pub fn to_yaml(value: &JsonValue) -> Result<String, serde_saphyr::ser_error::Error> {
	let sorted = sort_keys(value.clone());

	let options = serde_saphyr::SerializerOptions {
		indent_step: 2,
		indent_array: Some(0),
		prefer_block_scalars: true,
		empty_map_as_braces: true,
		empty_array_as_brackets: true,
		line_width: Some(80),
		quote_ambiguous_keys: true,
		quote_numeric_strings: true,
		..Default::default()
	};

	let mut output = String::new();
	serde_saphyr::to_fmt_writer_with_options(&mut output, &sorted, options)?;
	Ok(output)
}
