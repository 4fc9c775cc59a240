//! Common test utilities.

use std::{
	cell::RefCell,
	collections::HashSet,
	io::{self, ErrorKind, Write},
};

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::{
	catalog::ResourceKind,
	k8s::query::{ClusterQuery, QueryError},
	manifest::RawManifest,
};

/// A writer that simulates a broken pipe (SIGPIPE scenario).
pub struct BrokenPipeWriter;

impl Write for BrokenPipeWriter {
	fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
		Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"))
	}

	fn flush(&mut self) -> io::Result<()> {
		Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"))
	}
}

/// An in-memory cluster keyed by catalog kind name.
///
/// Records every call so tests can assert what was (not) fetched.
#[derive(Default)]
pub struct FakeCluster {
	objects: IndexMap<String, IndexMap<String, JsonValue>>,
	namespaces: HashSet<String>,
	failing_lists: HashSet<String>,
	failing_gets: HashSet<(String, String)>,
	calls: RefCell<Vec<String>>,
}

impl FakeCluster {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add an object. Listing returns objects in insertion order.
	pub fn with_object(mut self, kind: &str, name: &str, manifest: JsonValue) -> Self {
		self.objects
			.entry(kind.to_string())
			.or_default()
			.insert(name.to_string(), manifest);
		self
	}

	pub fn with_namespace(mut self, name: &str) -> Self {
		self.namespaces.insert(name.to_string());
		self
	}

	pub fn failing_list(mut self, kind: &str) -> Self {
		self.failing_lists.insert(kind.to_string());
		self
	}

	pub fn failing_get(mut self, kind: &str, name: &str) -> Self {
		self.failing_gets.insert((kind.to_string(), name.to_string()));
		self
	}

	/// Calls made so far, as `list <kind>` / `get <kind>/<name>`.
	pub fn calls(&self) -> Vec<String> {
		self.calls.borrow().clone()
	}

	pub fn fetched(&self) -> Vec<String> {
		self.calls()
			.into_iter()
			.filter_map(|c| c.strip_prefix("get ").map(str::to_string))
			.collect()
	}
}

impl ClusterQuery for FakeCluster {
	async fn list_object_names(
		&self,
		kind: &ResourceKind,
		_namespace: Option<&str>,
	) -> Result<Vec<String>, QueryError> {
		self.calls.borrow_mut().push(format!("list {}", kind.name));
		if self.failing_lists.contains(kind.name) {
			return Err(QueryError::failed(format!("listing {}", kind.name), "injected failure"));
		}
		Ok(self
			.objects
			.get(kind.name)
			.map(|objects| objects.keys().cloned().collect())
			.unwrap_or_default())
	}

	async fn get_object_manifest(
		&self,
		kind: &ResourceKind,
		name: &str,
		namespace: Option<&str>,
	) -> Result<RawManifest, QueryError> {
		self.calls
			.borrow_mut()
			.push(format!("get {}/{}", kind.name, name));
		if self
			.failing_gets
			.contains(&(kind.name.to_string(), name.to_string()))
		{
			return Err(QueryError::failed(
				format!("fetching {}/{}", kind.name, name),
				"injected failure",
			));
		}
		self.objects
			.get(kind.name)
			.and_then(|objects| objects.get(name))
			.cloned()
			.map(RawManifest::new)
			.ok_or_else(|| QueryError::ObjectNotFound {
				kind: kind.name.to_string(),
				name: name.to_string(),
				namespace: namespace.map(str::to_string),
			})
	}

	async fn namespace_exists(&self, name: &str) -> Result<bool, QueryError> {
		Ok(self.namespaces.contains(name))
	}
}
