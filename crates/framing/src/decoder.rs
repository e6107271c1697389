use crate::{
    parse_http_response, OutputSink, RawHttpResponse, EXECUTION_INFO_BEGIN, EXECUTION_INFO_END,
    LENIENT_BASE64, RESPONSE_BEGIN, RESPONSE_END,
};
use base64::Engine;
use bytes::Bytes;
use fc_local_models::{ErrorType, ExecutionInfo, InvocationResult, LocalError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Outside,
    Response,
    ExecutionInfo,
}

/// Push-style decoder for the framing envelope. Chunk boundaries are arbitrary.
pub struct FramingDecoder {
    region: Region,
    partial: Vec<u8>,
    response_lines: Vec<String>,
    saw_response: bool,
    execution_info_line: Option<String>,
    stderr: Vec<u8>,
    sink: Box<dyn OutputSink>,
}

/// Everything the decoder learnt from one invocation's output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FramedOutput {
    pub response: Option<RawHttpResponse>,
    pub execution_info: Option<ExecutionInfo>,
    /// Raw bytes the function wrote to stderr.
    pub stderr: Bytes,
}

impl FramingDecoder {
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            region: Region::Outside,
            partial: Vec::new(),
            response_lines: Vec::new(),
            saw_response: false,
            execution_info_line: None,
            stderr: Vec::new(),
            sink,
        }
    }

    pub fn feed_stdout(&mut self, chunk: &[u8]) {
        self.partial.extend_from_slice(chunk);
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line[..line.len() - 1]));
        }
    }

    pub fn feed_stderr(&mut self, chunk: &[u8]) {
        self.stderr.extend_from_slice(chunk);
        self.sink.error_output(chunk);
    }

    fn handle_line(&mut self, line: &str) {
        if line.starts_with(RESPONSE_BEGIN) {
            self.region = Region::Response;
            self.saw_response = true;
            return;
        }
        if line.starts_with(RESPONSE_END) {
            self.region = Region::Outside;
            return;
        }
        if line.starts_with(EXECUTION_INFO_BEGIN) {
            self.region = Region::ExecutionInfo;
            return;
        }
        if line.starts_with(EXECUTION_INFO_END) {
            self.region = Region::Outside;
            return;
        }

        match self.region {
            Region::Response => self.response_lines.push(line.to_string()),
            // only the last line of the region counts
            Region::ExecutionInfo => self.execution_info_line = Some(line.to_string()),
            Region::Outside => self.sink.log_line(line),
        }
    }

    /// Flushes a trailing unterminated line and decodes both regions.
    pub fn finish(mut self) -> FramedOutput {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.handle_line(&String::from_utf8_lossy(&line));
        }

        let response = if self.saw_response {
            let encoded: String = self
                .response_lines
                .join("\n")
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            match LENIENT_BASE64.decode(encoded.as_bytes()) {
                Ok(raw) => Some(parse_http_response(&raw)),
                Err(e) => {
                    warn!("response region is not valid base64: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let execution_info = self
            .execution_info_line
            .as_deref()
            .and_then(decode_execution_info);

        debug!(?execution_info, has_response = response.is_some(), "decoded framing envelope");

        FramedOutput {
            response,
            execution_info,
            stderr: Bytes::from(self.stderr),
        }
    }
}

/// requestId, billedTime, memoryLimit, memoryUsage, one per line.
pub fn decode_execution_info(line: &str) -> Option<ExecutionInfo> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let raw = LENIENT_BASE64.decode(trimmed.as_bytes()).ok()?;
    let text = String::from_utf8_lossy(&raw);
    let mut fields = text.split('\n').map(str::trim);

    let request_id = fields.next().filter(|s| !s.is_empty()).map(String::from);
    let mut number = || fields.next().and_then(|s| s.parse::<u64>().ok());
    let billed_time_ms = number();
    let memory_limit_mb = number();
    let memory_usage_mb = number();

    Some(ExecutionInfo {
        request_id,
        billed_time_ms,
        memory_limit_mb,
        memory_usage_mb,
    })
}

impl FramedOutput {
    pub fn has_error_output(&self) -> bool {
        !self.stderr.is_empty()
    }

    /// Classifies the decoded output.
    ///
    /// No response and no execution info means the process died out of band.
    /// Output on stderr, or metadata without a response, is an application
    /// error; a non-empty body makes it handled, otherwise unhandled. The
    /// body is kept as decoded.
    pub fn into_result(self) -> Result<InvocationResult, LocalError> {
        let has_error_output = self.has_error_output();
        let FramedOutput {
            response,
            execution_info,
            stderr,
        } = self;

        if response.is_none() && execution_info.is_none() {
            let reason = String::from_utf8_lossy(&stderr).trim().to_string();
            return Err(LocalError::ProcessCrash {
                reason: if reason.is_empty() {
                    "no response and no execution info in container output".to_string()
                } else {
                    reason
                },
            });
        }

        let info = execution_info.unwrap_or_default();
        let application_error = has_error_output || response.is_none();
        let response = response.unwrap_or_default();

        let mut result = InvocationResult {
            status_code: response.status_code,
            status_message: response.status_message,
            headers: response.headers,
            body: response.body,
            request_id: info.request_id,
            billed_time_ms: info.billed_time_ms,
            memory_limit_mb: info.memory_limit_mb,
            memory_usage_mb: info.memory_usage_mb,
            error_type: ErrorType::None,
        };

        if application_error {
            result.error_type = if result.body.is_empty() {
                ErrorType::UnhandledInvocationError
            } else {
                ErrorType::HandledInvocationError
            };
        }

        Ok(result)
    }
}
