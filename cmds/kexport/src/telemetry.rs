//! Logging and trace export for kexport.
//!
//! An export run traces as one `run` span with an `export_kind` child per
//! resource kind, so OTLP backends show the pipeline as a single trace.

use std::io::IsTerminal;

use anyhow::Result;
use opentelemetry::{trace::TracerProvider as _, KeyValue};
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "kexport";

/// Client stack crates that log every request at debug level. They stay at
/// `warn` unless tracing is requested explicitly.
const CHATTY_TARGETS: &[&str] = &["hyper", "hyper_util", "h2", "tower", "rustls", "kube_client"];

/// Shuts down the tracer provider on drop, flushing pending spans.
pub struct TelemetryGuard {
	tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
	fn drop(&mut self) {
		if let Some(provider) = self.tracer_provider.take() {
			if let Err(e) = provider.shutdown() {
				eprintln!("failed to flush traces: {e}");
			}
		}
	}
}

/// Initialize tracing.
///
/// `--log-level` wins over `RUST_LOG`; the default is info. Logs go to stderr,
/// pretty on a terminal and JSON otherwise. Spans are exported over OTLP when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` or `OTEL_EXPORTER_OTLP_TRACES_ENDPOINT` is set.
pub fn init(log_level: Option<Level>) -> Result<TelemetryGuard> {
	let fmt_layer = if std::io::stderr().is_terminal() {
		tracing_subscriber::fmt::layer()
			.with_writer(std::io::stderr)
			.pretty()
			.boxed()
	} else {
		tracing_subscriber::fmt::layer()
			.with_writer(std::io::stderr)
			.json()
			.boxed()
	};

	let tracer_provider = otel_export_enabled()
		.then(build_tracer_provider)
		.transpose()?;
	let otel_layer = tracer_provider.as_ref().map(|provider| {
		tracing_opentelemetry::layer()
			.with_error_records_to_exceptions(true)
			.with_tracer(provider.tracer(SERVICE_NAME))
	});

	tracing_subscriber::registry()
		.with(build_filter(log_level))
		.with(fmt_layer)
		.with(otel_layer)
		.init();

	Ok(TelemetryGuard { tracer_provider })
}

fn build_filter(log_level: Option<Level>) -> EnvFilter {
	let mut filter = match log_level {
		Some(level) => EnvFilter::new(level.as_str()),
		None => EnvFilter::builder()
			.with_default_directive(Level::INFO.into())
			.from_env_lossy(),
	};
	if log_level != Some(Level::TRACE) {
		for target in CHATTY_TARGETS {
			if let Ok(directive) = format!("{target}=warn").parse() {
				filter = filter.add_directive(directive);
			}
		}
	}
	filter
}

fn otel_export_enabled() -> bool {
	std::env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_ENDPOINT).is_ok()
		|| std::env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_TRACES_ENDPOINT).is_ok()
}

fn build_tracer_provider() -> Result<SdkTracerProvider> {
	// Resource::builder() already honors OTEL_SERVICE_NAME and OTEL_RESOURCE_ATTRIBUTES.
	let mut resource = Resource::builder()
		.with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")));
	if std::env::var("OTEL_SERVICE_NAME").is_err() {
		resource = resource.with_service_name(SERVICE_NAME);
	}

	let protocol = std::env::var(opentelemetry_otlp::OTEL_EXPORTER_OTLP_PROTOCOL);
	let exporter = match protocol
		.as_deref()
		.unwrap_or(opentelemetry_otlp::OTEL_EXPORTER_OTLP_PROTOCOL_DEFAULT)
	{
		"grpc" => opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.build()?,
		_ => opentelemetry_otlp::SpanExporter::builder()
			.with_http()
			.build()?,
	};

	let provider = SdkTracerProvider::builder()
		.with_resource(resource.build())
		.with_batch_exporter(exporter)
		.build();
	opentelemetry::global::set_tracer_provider(provider.clone());
	Ok(provider)
}
