use base64::{engine::general_purpose::STANDARD, Engine};
use fc_local_models::FunctionSpec;

/// How an event reaches the runtime and which phases run.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvokeRequest<'a> {
    pub http_mode: bool,
    pub invoke_initializer: bool,
    /// Passed as a base64 argument instead of through stdin.
    pub inline_event: Option<&'a [u8]>,
}

impl<'a> InvokeRequest<'a> {
    pub fn stdin(http_mode: bool) -> Self {
        Self {
            http_mode,
            invoke_initializer: true,
            inline_event: None,
        }
    }
}

/// Argument used to keep a runtime container alive as an exec target.
pub const SERVER_COMMAND: &str = "--server";

pub fn server_command() -> Vec<String> {
    vec![SERVER_COMMAND.to_string()]
}

pub(crate) fn standard_invoke_command(function: &FunctionSpec, request: &InvokeRequest<'_>) -> Vec<String> {
    let mut cmd = vec!["-h".to_string(), function.handler.clone()];

    match request.inline_event {
        Some(event) => {
            cmd.push("--event".to_string());
            cmd.push(STANDARD.encode(event));
            cmd.push("--event-decode".to_string());
        }
        None => cmd.push("--stdin".to_string()),
    }

    if request.http_mode {
        cmd.push("--http".to_string());
    }

    if let Some(initializer) = function.initializer.as_ref().filter(|i| !i.is_empty()) {
        if request.invoke_initializer {
            cmd.push("-i".to_string());
            cmd.push(initializer.clone());
        }
    }

    if let Some(timeout) = function.initialization_timeout_seconds {
        cmd.push("--initializationTimeout".to_string());
        cmd.push(timeout.to_string());
    }

    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family_for;
    use fc_local_models::Runtime;
    use std::collections::BTreeMap;

    fn spec(initializer: Option<&str>, init_timeout: Option<u64>) -> FunctionSpec {
        FunctionSpec {
            name: "hello".into(),
            runtime: Runtime::Nodejs10,
            handler: "index.handler".into(),
            initializer: initializer.map(String::from),
            timeout_seconds: None,
            initialization_timeout_seconds: init_timeout,
            memory_mb: None,
            environment_variables: BTreeMap::new(),
            code_uri: "/code".into(),
            ca_port: None,
            custom_container: None,
        }
    }

    #[test]
    fn stdin_mode_with_initializer() {
        let f = spec(Some("index.init"), Some(5));
        let cmd = family_for(f.runtime).build_invoke_command(&f, &InvokeRequest::stdin(false));
        assert_eq!(
            cmd,
            vec!["-h", "index.handler", "--stdin", "-i", "index.init", "--initializationTimeout", "5"]
        );
    }

    #[test]
    fn inline_event_skipping_initializer_in_http_mode() {
        let f = spec(Some("index.init"), None);
        let req = InvokeRequest {
            http_mode: true,
            invoke_initializer: false,
            inline_event: Some(b"{}"),
        };
        let cmd = family_for(f.runtime).build_invoke_command(&f, &req);
        assert_eq!(
            cmd,
            vec!["-h", "index.handler", "--event", "e30=", "--event-decode", "--http"]
        );
    }
}
