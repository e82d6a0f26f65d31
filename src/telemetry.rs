use opentelemetry::trace::TraceId;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// Fetch the opentelemetry trace id of the current tracing span.
pub fn get_trace_id() -> TraceId {
    use opentelemetry::trace::TraceContextExt as _;
    use tracing_opentelemetry::OpenTelemetrySpanExt as _;

    tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
}

async fn init_tracer() -> opentelemetry_sdk::trace::Tracer {
    use opentelemetry::trace::TracerProvider;
    #[cfg(feature = "telemetry")]
    use opentelemetry_otlp::SpanExporter;
    use opentelemetry_sdk::trace::SdkTracerProvider;

    // Spans are only exported somewhere with the telemetry feature on; the
    // provider itself is always built so span contexts stay populated.
    #[cfg(feature = "telemetry")]
    let exporter = SpanExporter::builder().with_tonic().build().unwrap();
    let builder = SdkTracerProvider::builder();
    #[cfg(feature = "telemetry")]
    let builder = builder.with_batch_exporter(exporter);
    builder.build().tracer("fleet-manager")
}

/// Initialize the tracing stack: otel layer, compact log formatter and an
/// env-driven filter defaulting to `info`.
pub async fn init() {
    let otel = tracing_opentelemetry::layer().with_tracer(init_tracer().await);
    let logger = tracing_subscriber::fmt::layer().compact();
    let env_filter = EnvFilter::try_from_default_env()
        .or(EnvFilter::try_new("info"))
        .unwrap();

    let collector = Registry::default()
        .with(otel)
        .with(logger)
        .with(env_filter);

    tracing::subscriber::set_global_default(collector).unwrap();
}
