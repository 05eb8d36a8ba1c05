//! Logging and optional OTLP trace export.
//!
//! The fmt layer is always installed. Spans are additionally exported over
//! gRPC when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

use anyhow::{Context, Result, anyhow};
use base64::{Engine, engine::general_purpose};
use once_cell::sync::OnceCell;
use opentelemetry::{
    KeyValue, global,
    propagation::TextMapCompositePropagator,
    trace::TracerProvider as _,
};
use opentelemetry_otlp::{Compression, SpanExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::SdkTracerProvider,
};
use std::time::Duration;
use tonic::{
    metadata::{AsciiMetadataKey, BinaryMetadataKey, MetadataMap, MetadataValue},
    transport::ClientTlsConfig,
};
use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};
use ulid::Ulid;

const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

/// Exporter settings read from the standard `OTEL_*` variables.
#[derive(Debug, PartialEq, Eq)]
struct OtlpSettings {
    endpoint: String,
    headers: Vec<(String, String)>,
    instance_id: String,
}

impl OtlpSettings {
    /// `None` unless an endpoint is configured.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT")?;

        if let Some(protocol) = lookup("OTEL_EXPORTER_OTLP_PROTOCOL").filter(|p| p != "grpc") {
            debug!("ignoring OTEL_EXPORTER_OTLP_PROTOCOL={protocol}, exporting over grpc");
        }

        Some(Self {
            endpoint: with_scheme(&endpoint),
            headers: lookup("OTEL_EXPORTER_OTLP_HEADERS")
                .map(|raw| header_pairs(&raw))
                .unwrap_or_default(),
            instance_id: lookup("OTEL_SERVICE_INSTANCE_ID")
                .unwrap_or_else(|| Ulid::new().to_string()),
        })
    }

    fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// TLS with native roots for `https://` endpoints, keyed on the host name.
    fn tls(&self) -> Option<ClientTlsConfig> {
        let authority = self.endpoint.strip_prefix("https://")?.split('/').next()?;
        let host = authority.split(':').next().filter(|host| !host.is_empty())?;

        Some(
            ClientTlsConfig::new()
                .domain_name(host)
                .with_native_roots(),
        )
    }

    fn metadata(&self) -> Result<MetadataMap> {
        self.headers
            .iter()
            .try_fold(MetadataMap::new(), |mut metadata, (key, value)| {
                insert_metadata(&mut metadata, key, value)?;
                Ok(metadata)
            })
    }

    fn exporter(&self) -> Result<SpanExporter> {
        let mut exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&self.endpoint)
            .with_compression(Compression::Gzip)
            .with_timeout(EXPORT_TIMEOUT)
            .with_metadata(self.metadata()?);

        if let Some(tls) = self.tls() {
            exporter = exporter.with_tls_config(tls);
        }

        exporter.build().context("failed to build OTLP span exporter")
    }

    fn resource(&self) -> Resource {
        Resource::builder_empty()
            .with_attributes([
                KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                KeyValue::new("service.instance.id", self.instance_id.clone()),
            ])
            .build()
    }
}

/// Comma separated `key=value` pairs; entries without `=` are skipped.
fn header_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect()
}

// `-bin` keys carry base64 and go in as binary metadata.
fn insert_metadata(metadata: &mut MetadataMap, key: &str, value: &str) -> Result<()> {
    if key.ends_with("-bin") {
        let bytes = general_purpose::STANDARD
            .decode(value)
            .map_err(|e| anyhow!("OTLP header {key} is not valid base64: {e}"))?;
        let key = BinaryMetadataKey::from_bytes(key.as_bytes())
            .map_err(|e| anyhow!("OTLP header name {key} is invalid: {e}"))?;
        metadata.insert_bin(key, MetadataValue::from_bytes(&bytes));
    } else {
        let name = AsciiMetadataKey::from_bytes(key.as_bytes())
            .map_err(|e| anyhow!("OTLP header name {key} is invalid: {e}"))?;
        let value = value
            .parse()
            .map_err(|e| anyhow!("OTLP header {key} has an invalid value: {e}"))?;
        metadata.insert(name, value);
    }
    Ok(())
}

fn with_scheme(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint.trim_end_matches('/'))
    }
}

fn install_provider(settings: &OtlpSettings) -> Result<SdkTracerProvider> {
    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(settings.exporter()?)
        .with_resource(settings.resource())
        .build();

    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    if TRACER_PROVIDER.set(provider.clone()).is_err() {
        debug!("tracer provider already installed");
    }

    Ok(provider)
}

fn env_filter(default_level: Level) -> Result<EnvFilter> {
    ["hyper=error", "tokio=error", "sqlx=warn", "opentelemetry_sdk=warn"]
        .into_iter()
        .try_fold(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
            |filter, directive| Ok(filter.add_directive(directive.parse()?)),
        )
}

/// Initialize logging and, if `OTEL_EXPORTER_OTLP_ENDPOINT` is set, trace export.
///
/// `RUST_LOG` directives take precedence over `verbosity_level`.
///
/// # Errors
///
/// Returns an error if the exporter or the global subscriber cannot be installed.
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .compact();

    let otel_layer = match OtlpSettings::from_env() {
        Some(settings) => {
            let tracer = install_provider(&settings)?.tracer(env!("CARGO_PKG_NAME"));
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let subscriber = Registry::default()
        .with(fmt_layer)
        .with(otel_layer)
        .with(env_filter(verbosity_level.unwrap_or(Level::ERROR))?);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Flush and stop the tracer provider, if one was installed.
pub fn shutdown_tracer() {
    let Some(provider) = TRACER_PROVIDER.get() else {
        return;
    };
    if let Err(err) = provider.shutdown() {
        debug!("tracer provider shutdown failed: {err}");
    }
}
