use std::io::Write;

/// Receives whatever the function printed outside the framing regions.
pub trait OutputSink: Send {
    fn log_line(&mut self, line: &str);
    fn error_output(&mut self, chunk: &[u8]);
}

/// Forwards function output verbatim to this process's stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn log_line(&mut self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{line}");
    }

    fn error_output(&mut self, chunk: &[u8]) {
        let _ = std::io::stderr().lock().write_all(chunk);
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub lines: Vec<String>,
    pub errors: Vec<u8>,
}

impl OutputSink for CollectingSink {
    fn log_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn error_output(&mut self, chunk: &[u8]) {
        self.errors.extend_from_slice(chunk);
    }
}

/// Drops everything, used for runner containers whose exec output is captured elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn log_line(&mut self, _line: &str) {}
    fn error_output(&mut self, _chunk: &[u8]) {}
}

/// Lets a caller keep a handle on collected output after the decoder is consumed.
impl OutputSink for std::sync::Arc<std::sync::Mutex<CollectingSink>> {
    fn log_line(&mut self, line: &str) {
        if let Ok(mut inner) = self.lock() {
            inner.log_line(line);
        }
    }

    fn error_output(&mut self, chunk: &[u8]) {
        if let Ok(mut inner) = self.lock() {
            inner.error_output(chunk);
        }
    }
}
