use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ErrorType {
    #[default]
    None,
    HandledInvocationError,
    UnhandledInvocationError,
}

impl ErrorType {
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            ErrorType::None => None,
            ErrorType::HandledInvocationError => Some("HandledInvocationError"),
            ErrorType::UnhandledInvocationError => Some("UnhandledInvocationError"),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, ErrorType::None)
    }
}

/// Contents of the execution-info region.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionInfo {
    pub request_id: Option<String>,
    pub billed_time_ms: Option<u64>,
    pub memory_limit_mb: Option<u64>,
    pub memory_usage_mb: Option<u64>,
}

/// Decoded outcome of one invocation. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    pub status_code: Option<u16>,
    pub status_message: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub request_id: Option<String>,
    pub billed_time_ms: Option<u64>,
    pub memory_limit_mb: Option<u64>,
    pub memory_usage_mb: Option<u64>,
    pub error_type: ErrorType,
}

impl InvocationResult {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn unexpected_exit_message(&self) -> String {
        unexpected_exit_message(self.billed_time_ms, self.memory_usage_mb)
    }

    /// Body for error replies: an unhandled error with nothing written gets a
    /// synthesized `{"errorMessage": ...}` document.
    pub fn error_body(&self) -> Bytes {
        if self.error_type == ErrorType::UnhandledInvocationError && self.body.is_empty() {
            let shape = crate::ErrorShape {
                error_message: self.unexpected_exit_message(),
            };
            return Bytes::from(serde_json::to_vec(&shape).unwrap_or_default());
        }
        self.body.clone()
    }
}

pub fn unexpected_exit_message(billed_time_ms: Option<u64>, memory_usage_mb: Option<u64>) -> String {
    format!(
        "Process exited unexpectedly before completing request (duration: {}ms, maxMemoryUsage: {}MB)",
        billed_time_ms.unwrap_or(0),
        memory_usage_mb.unwrap_or(0)
    )
}

/// Outer HTTP response produced by an adapter, independent of any server framework.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpReply {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn json_error(status: u16, message: impl Into<String>) -> Self {
        let shape = crate::ErrorShape {
            error_message: message.into(),
        };
        let body = serde_json::to_vec(&shape).unwrap_or_default();
        Self::new(status)
            .header("content-type", "application/json")
            .body(body)
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
