//! Prometheus registry for per-path invocation outcomes.
use lakeapps_core::{QueryResult, QueryStatus};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

pub struct ApiMetrics {
    registry: Registry,
    invocations: IntCounterVec,
    latency: HistogramVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let invocations = IntCounterVec::new(
            Opts::new("lakeapps_invocations_total", "Invocation paths by outcome"),
            &["operation", "mode", "status"],
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new(
                "lakeapps_invocation_latency_seconds",
                "Wall time of one invocation path",
            ),
            &["operation", "mode"],
        )?;
        registry.register(Box::new(invocations.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        Ok(Self {
            registry,
            invocations,
            latency,
        })
    }

    pub fn observe(&self, result: &QueryResult) {
        let status = match result.status {
            QueryStatus::Success => "success",
            QueryStatus::Empty => "empty",
            QueryStatus::Error => "error",
        };
        let mode = result.mode.as_str();
        self.invocations
            .with_label_values(&[result.operation.as_str(), mode, status])
            .inc();
        self.latency
            .with_label_values(&[result.operation.as_str(), mode])
            .observe(result.latency_ms as f64 / 1000.0);
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
