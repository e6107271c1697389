use fc_local_control::HttpInvoker;
use fc_local_metrics::MetricsService;
use fc_local_models::Credentials;
use std::sync::Arc;

/// Which HTTP surface the server exposes for its function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeMode {
    /// Any method under `prefix` reaches the function as an HTTP trigger.
    HttpTrigger { prefix: String },
    /// `POST` to the invocation path.
    Api { path: String },
}

impl ServeMode {
    pub fn http_trigger(service: &str, function: &str) -> Self {
        ServeMode::HttpTrigger {
            prefix: format!("/2016-08-15/proxy/{service}/{function}"),
        }
    }

    pub fn api(service: &str, function: &str) -> Self {
        ServeMode::Api {
            path: format!("/2016-08-15/services/{service}/functions/{function}/invocations"),
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            ServeMode::HttpTrigger { prefix } => prefix,
            ServeMode::Api { path } => path,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub invoker: Arc<dyn HttpInvoker>,
    pub metrics: Arc<MetricsService>,
    pub credentials: Credentials,
    pub mode: ServeMode,
    /// Skip signature checks, as for an `ANONYMOUS` trigger.
    pub anonymous: bool,
}

impl AppState {
    pub fn new(
        invoker: Arc<dyn HttpInvoker>,
        metrics: Arc<MetricsService>,
        credentials: Credentials,
        mode: ServeMode,
    ) -> Self {
        Self {
            invoker,
            metrics,
            credentials,
            mode,
            anonymous: false,
        }
    }

    pub fn with_anonymous(mut self, anonymous: bool) -> Self {
        self.anonymous = anonymous;
        self
    }
}
