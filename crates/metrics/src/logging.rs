use fc_local_models::{ErrorType, InvocationResult, LocalError};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct TracingService;

impl TracingService {
    /// Installs the global subscriber. `RUST_LOG` overrides the `info` default.
    pub fn init(json: bool) -> anyhow::Result<()> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .with_writer(std::io::stderr);

        if json {
            builder
                .json()
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
        } else {
            builder
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
        }
    }

    pub fn log_invocation_started(function_name: &str, container_id: Option<&str>, is_cold_start: bool) {
        info!(
            function_name = %function_name,
            container_id = %container_id.unwrap_or("none"),
            is_cold_start = is_cold_start,
            "Invocation started"
        );
    }

    pub fn log_invocation_completed(function_name: &str, duration_ms: u64, result: &InvocationResult) {
        let request_id = result.request_id.as_deref().unwrap_or("none");
        match result.error_type {
            ErrorType::None => info!(
                function_name = %function_name,
                request_id = %request_id,
                status = result.status_code.unwrap_or(0),
                duration_ms = duration_ms,
                billed_ms = result.billed_time_ms.unwrap_or(0),
                memory_used_mb = result.memory_usage_mb.unwrap_or(0),
                "Invocation completed"
            ),
            error_type => warn!(
                function_name = %function_name,
                request_id = %request_id,
                error_type = ?error_type,
                duration_ms = duration_ms,
                billed_ms = result.billed_time_ms.unwrap_or(0),
                memory_used_mb = result.memory_usage_mb.unwrap_or(0),
                "Invocation returned an application error"
            ),
        }
    }

    pub fn log_container_created(function_name: &str, container_id: &str, image: &str, name: &str) {
        info!(
            function_name = %function_name,
            container_id = %container_id,
            image = %image,
            container_name = %name,
            "Container created"
        );
    }

    pub fn log_container_stopped(container_id: &str, reason: &str) {
        info!(
            container_id = %container_id,
            reason = %reason,
            "Container stopped"
        );
    }

    pub fn log_container_promoted(function_name: &str, container_id: &str, name: &str) {
        info!(
            function_name = %function_name,
            container_id = %container_id,
            container_name = %name,
            "Container marked as initialized"
        );
    }

    pub fn log_process_crash(function_name: &str, container_id: Option<&str>, error: &LocalError) {
        error!(
            function_name = %function_name,
            container_id = %container_id.unwrap_or("none"),
            error_message = %error,
            "Function process crashed"
        );
    }

    pub fn log_signal_killed(function_name: &str, container_id: Option<&str>, code: i64, oom_killed: bool) {
        error!(
            function_name = %function_name,
            container_id = %container_id.unwrap_or("none"),
            exit_code = code,
            oom_killed = oom_killed,
            "Function process was killed, check the memory size or whether the container was stopped"
        );
    }

    /// Routes a failed invocation to the matching helper.
    pub fn log_failure(function_name: &str, container_id: Option<&str>, error: &LocalError) {
        match error {
            LocalError::SignalKilled { code, oom_killed } => {
                Self::log_signal_killed(function_name, container_id, *code, *oom_killed)
            }
            e if e.is_process_failure() => Self::log_process_crash(function_name, container_id, e),
            e => error!(
                function_name = %function_name,
                error_class = ?e.class(),
                error_message = %e,
                "Invocation failed"
            ),
        }
    }
}
