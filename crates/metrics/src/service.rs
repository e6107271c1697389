use fc_local_models::{ErrorClass, InvocationResult, LocalError};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use tracing::debug;

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

pub struct MetricsService {
    registry: Registry,
    invocations_total: IntCounter,
    cold_starts_total: IntCounter,
    warm_reuses_total: IntCounter,
    application_errors_total: IntCounter,
    process_crashes_total: IntCounter,
    signal_kills_total: IntCounter,
    duration_ms: Histogram,
}

impl MetricsService {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let invocations_total = counter(
            &registry,
            "fc_local_invocations_total",
            "Total number of local invocations",
        )?;
        let cold_starts_total = counter(
            &registry,
            "fc_local_cold_starts_total",
            "Invocations that had to create a container",
        )?;
        let warm_reuses_total = counter(
            &registry,
            "fc_local_warm_reuses_total",
            "Invocations served by an existing container",
        )?;
        let application_errors_total = counter(
            &registry,
            "fc_local_application_errors_total",
            "Invocations that returned a handled or unhandled function error",
        )?;
        let process_crashes_total = counter(
            &registry,
            "fc_local_process_crashes_total",
            "Invocations whose process died without a response",
        )?;
        let signal_kills_total = counter(
            &registry,
            "fc_local_signal_kills_total",
            "Invocations whose process was OOM or force killed",
        )?;

        let duration_ms = Histogram::with_opts(
            HistogramOpts::new(
                "fc_local_duration_ms",
                "Invocation wall time in milliseconds",
            )
            .buckets(vec![
                5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
            ]),
        )?;
        registry.register(Box::new(duration_ms.clone()))?;

        Ok(Self {
            registry,
            invocations_total,
            cold_starts_total,
            warm_reuses_total,
            application_errors_total,
            process_crashes_total,
            signal_kills_total,
            duration_ms,
        })
    }

    pub fn record_invocation(&self, function_name: &str, cold_start: bool) {
        self.invocations_total.inc();
        if cold_start {
            self.cold_starts_total.inc();
        } else {
            self.warm_reuses_total.inc();
        }
        debug!(function_name = %function_name, cold_start, "recorded invocation");
    }

    pub fn record_duration(&self, duration_ms: f64) {
        self.duration_ms.observe(duration_ms);
    }

    /// Counts the outcome under its error class. Successful results only count
    /// when the function reported an application error.
    pub fn record_outcome(&self, outcome: &Result<InvocationResult, LocalError>) {
        match outcome {
            Ok(result) if result.error_type.is_error() => self.application_errors_total.inc(),
            Ok(_) => {}
            Err(e) => match e.class() {
                ErrorClass::SignalKilled => self.signal_kills_total.inc(),
                ErrorClass::ProcessCrash => self.process_crashes_total.inc(),
                ErrorClass::Application => self.application_errors_total.inc(),
                ErrorClass::Setup => {}
            },
        }
    }

    pub fn render(&self) -> prometheus::Result<String> {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
