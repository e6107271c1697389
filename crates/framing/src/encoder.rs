use crate::{
    render_http_response, EXECUTION_INFO_BEGIN, EXECUTION_INFO_END, RESPONSE_BEGIN, RESPONSE_END,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use fc_local_models::ExecutionInfo;

/// Column width of coreutils `base64`, which the runtime mock pipes through.
const WRAP: usize = 76;

fn wrapped_base64(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / WRAP + 1);
    for (i, chunk) in encoded.as_bytes().chunks(WRAP).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&String::from_utf8_lossy(chunk));
    }
    out
}

/// Builds a framing envelope as the runtime mock prints it on stdout.
#[derive(Debug, Default, Clone)]
pub struct EnvelopeBuilder {
    out: String,
}

impl EnvelopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(mut self, line: &str) -> Self {
        self.out.push_str(line);
        self.out.push('\n');
        self
    }

    pub fn raw_response(mut self, raw_http: &[u8]) -> Self {
        self.out.push_str(RESPONSE_BEGIN);
        self.out.push('\n');
        self.out.push_str(&wrapped_base64(raw_http));
        self.out.push('\n');
        self.out.push_str(RESPONSE_END);
        self.out.push('\n');
        self
    }

    pub fn response(
        self,
        status_code: u16,
        status_message: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Self {
        let raw = render_http_response(status_code, status_message, headers, body);
        self.raw_response(&raw)
    }

    pub fn execution_info(mut self, info: &ExecutionInfo) -> Self {
        let fields = [
            info.request_id.clone().unwrap_or_default(),
            info.billed_time_ms.map(|v| v.to_string()).unwrap_or_default(),
            info.memory_limit_mb.map(|v| v.to_string()).unwrap_or_default(),
            info.memory_usage_mb.map(|v| v.to_string()).unwrap_or_default(),
        ]
        .join("\n");
        self.out.push_str(EXECUTION_INFO_BEGIN);
        self.out.push('\n');
        self.out.push_str(&STANDARD.encode(fields));
        self.out.push('\n');
        self.out.push_str(EXECUTION_INFO_END);
        self.out.push('\n');
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.out.into_bytes()
    }
}
