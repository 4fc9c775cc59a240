//! Kubernetes cluster connection management.

use std::{path::Path, time::Duration};

use k8s_openapi::apimachinery::pkg::version::Info;
use kube::{
	config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
	Client, Config,
};
use thiserror::Error;
use tracing::instrument;

/// Default timeout for Kubernetes API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when connecting to a Kubernetes cluster.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("no context named `{0}` was found. Please check your kubeconfig")]
	ContextNotFound(String),

	#[error("kubeconfig has no current context; pass --context")]
	NoCurrentContext,

	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error(transparent)]
	Kube(#[from] kube::Error),
}

/// Represents a connection to a Kubernetes cluster.
#[derive(Clone)]
pub struct ClusterConnection {
	client: Client,
	server_version: Info,
	/// Human-readable identifier for the cluster (context name and API server URL).
	cluster_identifier: String,
}

impl std::fmt::Debug for ClusterConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClusterConnection")
			.field("cluster_identifier", &self.cluster_identifier)
			.field("server_version", &self.server_version)
			.finish_non_exhaustive()
	}
}

impl ClusterConnection {
	/// Connect using a kubeconfig file.
	///
	/// Without an explicit path the standard lookup applies (`$KUBECONFIG`, then
	/// `~/.kube/config`). Without an explicit context the kubeconfig's current
	/// context is used.
	#[instrument(skip_all, fields(credentials = ?credentials, context = ?context))]
	pub async fn connect(
		credentials: Option<&Path>,
		context: Option<&str>,
	) -> Result<Self, ConnectionError> {
		let kubeconfig = match credentials {
			Some(path) => Kubeconfig::read_from(path)?,
			None => Kubeconfig::read()?,
		};
		Self::from_kubeconfig(kubeconfig, context).await
	}

	/// Connect using an already loaded kubeconfig.
	#[instrument(skip_all)]
	pub async fn from_kubeconfig(
		kubeconfig: Kubeconfig,
		context: Option<&str>,
	) -> Result<Self, ConnectionError> {
		let context_name = select_context(&kubeconfig, context)?;
		let server = server_for_context(&kubeconfig, &context_name);

		tracing::debug!(context = %context_name, server = ?server, "using kubeconfig context");

		let mut config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context: Some(context_name.clone()),
				..Default::default()
			},
		)
		.await?;
		config.read_timeout = Some(DEFAULT_API_TIMEOUT);

		let client = Client::try_from(config)?;
		let server_version = client.apiserver_version().await?;

		let cluster_identifier = match server {
			Some(server) => format!("{server}  (context:{context_name})"),
			None => format!("context:{context_name}"),
		};

		Ok(Self {
			client,
			server_version,
			cluster_identifier,
		})
	}

	/// Get a reference to the underlying kube client.
	pub fn client(&self) -> &Client {
		&self.client
	}

	pub fn server_version(&self) -> &Info {
		&self.server_version
	}

	pub fn cluster_identifier(&self) -> &str {
		&self.cluster_identifier
	}
}

/// Pick the requested context, or the kubeconfig's current one.
fn select_context(
	kubeconfig: &Kubeconfig,
	requested: Option<&str>,
) -> Result<String, ConnectionError> {
	let name = match requested {
		Some(name) => name.to_string(),
		None => kubeconfig
			.current_context
			.clone()
			.ok_or(ConnectionError::NoCurrentContext)?,
	};

	if kubeconfig.contexts.iter().any(|c| c.name == name) {
		Ok(name)
	} else {
		Err(ConnectionError::ContextNotFound(name))
	}
}

/// API server URL of the cluster a context points at.
fn server_for_context(kubeconfig: &Kubeconfig, context_name: &str) -> Option<String> {
	let cluster_name = kubeconfig
		.contexts
		.iter()
		.find(|c| c.name == context_name)?
		.context
		.as_ref()?
		.cluster
		.clone();

	kubeconfig
		.clusters
		.iter()
		.find(|c| c.name == cluster_name)?
		.cluster
		.as_ref()?
		.server
		.clone()
}
