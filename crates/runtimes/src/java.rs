use crate::{unsupported_runtime, vscode_config, IdeContext, RuntimeFamily};
use fc_local_models::{DebugIde, IdeConfig, LocalError, Runtime};
use serde_json::json;

pub(crate) struct Java;

impl RuntimeFamily for Java {
    fn runtimes(&self) -> &'static [Runtime] {
        &[Runtime::Java8, Runtime::Java11]
    }

    fn build_debug_env(
        &self,
        runtime: Runtime,
        port: u16,
        _ide: DebugIde,
        _host_ip: &str,
    ) -> Result<Vec<(String, String)>, LocalError> {
        // the java11 image ships without a jdwp-enabled mock
        if runtime != Runtime::Java8 {
            return Err(unsupported_runtime(runtime));
        }
        Ok(vec![(
            "DEBUG_OPTIONS".to_string(),
            format!(
                "-agentlib:jdwp=transport=dt_socket,server=y,suspend=y,quiet=y,address={port}"
            ),
        )])
    }

    fn build_ide_config(
        &self,
        runtime: Runtime,
        _ide: DebugIde,
        ctx: &IdeContext,
    ) -> Result<IdeConfig, LocalError> {
        if runtime != Runtime::Java8 {
            return Err(unsupported_runtime(runtime));
        }
        Ok(vscode_config(json!({
            "name": ctx.configuration_name(),
            "type": "java",
            "request": "attach",
            "hostName": "localhost",
            "port": ctx.port,
        })))
    }
}
