//! Generic sanitization engine.
//!
//! A fetched manifest is turned into an exportable one by running the kind's
//! [`FieldRule`]s from the catalog in declared order. The engine knows nothing
//! about individual kinds beyond what the rules and [`SpecialBehavior`] say.

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{instrument, trace};

use crate::{
	catalog::{FieldAction, FieldRule, PathSegment, ResourceKind, SpecialBehavior},
	manifest::{RawManifest, SanitizedManifest},
};

/// Errors that can occur while sanitizing a manifest.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SanitizeError {
	#[error("{kind} manifest is not a mapping")]
	NotAnObject { kind: String },
}

/// Result of sanitizing one object.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
	pub manifest: SanitizedManifest,
	/// Volume bound to an exported claim (`spec.volumeName`), for kinds that link to PVs.
	pub bound_volume: Option<String>,
}

/// Apply the kind's rules to a raw manifest.
///
/// Running this again on the output yields the same manifest.
#[instrument(skip_all, fields(kind = kind.name, name = raw.name().unwrap_or("unknown")))]
pub fn sanitize(
	raw: RawManifest,
	kind: &ResourceKind,
	destination_namespace: Option<&str>,
) -> Result<Sanitized, SanitizeError> {
	let mut value = raw.into_value();
	if !value.is_object() {
		return Err(SanitizeError::NotAnObject {
			kind: kind.name.to_string(),
		});
	}

	let bound_volume = match kind.special {
		SpecialBehavior::LinksToPv => value
			.pointer("/spec/volumeName")
			.and_then(JsonValue::as_str)
			.filter(|v| !v.is_empty())
			.map(str::to_string),
		_ => None,
	};

	for rule in kind.rules() {
		trace!(path = %rule.path, action = ?rule.action, "applying rule");
		apply_rule(&mut value, rule, destination_namespace);
	}

	Ok(Sanitized {
		manifest: SanitizedManifest::new(value),
		bound_volume,
	})
}

fn apply_rule(value: &mut JsonValue, rule: &FieldRule, destination_namespace: Option<&str>) {
	let segments = rule.path.segments();
	match &rule.action {
		FieldAction::Delete => remove_at(value, segments, None),
		FieldAction::DeleteUnless(keep) => remove_at(value, segments, Some(keep)),
		FieldAction::SetNamespace => {
			if let Some(ns) = destination_namespace {
				set_at(value, segments, &JsonValue::String(ns.to_string()));
			}
		}
		FieldAction::ResetStatus(status) => set_at(value, segments, status),
		FieldAction::SetGeneration(generation) => {
			set_at(value, segments, &JsonValue::from(*generation));
		}
	}
}

/// Remove the value(s) at `path`. With `keep`, values equal to it survive.
fn remove_at(value: &mut JsonValue, path: &[PathSegment], keep: Option<&JsonValue>) {
	let Some((head, rest)) = path.split_first() else {
		return;
	};

	if rest.is_empty() {
		match (head, value) {
			(PathSegment::Key(key), JsonValue::Object(map)) => {
				if keep.is_none() || map.get(key) != keep {
					map.remove(key);
				}
			}
			(PathSegment::Any, JsonValue::Object(map)) => {
				map.retain(|_, v| keep == Some(&*v));
			}
			(PathSegment::Any, JsonValue::Array(items)) => {
				items.retain(|v| keep == Some(v));
			}
			_ => {}
		}
		return;
	}

	for child in children_mut(value, head) {
		remove_at(child, rest, keep);
	}
}

/// Write `new` at `path`. Missing intermediate mappings are not created, so a
/// rule never invents structure the object did not have, except at the top level.
fn set_at(value: &mut JsonValue, path: &[PathSegment], new: &JsonValue) {
	let Some((head, rest)) = path.split_first() else {
		return;
	};

	if rest.is_empty() {
		match (head, value) {
			(PathSegment::Key(key), JsonValue::Object(map)) => {
				map.insert(key.clone(), new.clone());
			}
			(PathSegment::Any, JsonValue::Object(map)) => {
				map.values_mut().for_each(|v| *v = new.clone());
			}
			(PathSegment::Any, JsonValue::Array(items)) => {
				items.iter_mut().for_each(|v| *v = new.clone());
			}
			_ => {}
		}
		return;
	}

	for child in children_mut(value, head) {
		set_at(child, rest, new);
	}
}

fn children_mut<'a>(value: &'a mut JsonValue, segment: &PathSegment) -> Vec<&'a mut JsonValue> {
	match (segment, value) {
		(PathSegment::Key(key), JsonValue::Object(map)) => map.get_mut(key).into_iter().collect(),
		(PathSegment::Any, JsonValue::Object(map)) => map.values_mut().collect(),
		(PathSegment::Any, JsonValue::Array(items)) => items.iter_mut().collect(),
		_ => Vec::new(),
	}
}
