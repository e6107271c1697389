use crate::{vscode_config, IdeContext, RuntimeFamily};
use fc_local_models::{DebugIde, IdeConfig, LocalError, Runtime};
use serde_json::json;

pub(crate) struct Dotnet;

impl RuntimeFamily for Dotnet {
    fn runtimes(&self) -> &'static [Runtime] {
        &[Runtime::Dotnetcore21]
    }

    fn build_debug_env(
        &self,
        _runtime: Runtime,
        _port: u16,
        _ide: DebugIde,
        _host_ip: &str,
    ) -> Result<Vec<(String, String)>, LocalError> {
        Ok(vec![("DEBUG_OPTIONS".to_string(), "true".to_string())])
    }

    fn build_ide_config(
        &self,
        _runtime: Runtime,
        _ide: DebugIde,
        ctx: &IdeContext,
    ) -> Result<IdeConfig, LocalError> {
        let attach = format!(
            "docker exec -i $(docker ps -q -f publish={}) ${{debuggerCommand}}",
            ctx.port
        );
        Ok(vscode_config(json!({
            "name": ctx.configuration_name(),
            "type": "coreclr",
            "request": "attach",
            "processName": "dotnet",
            "pipeTransport": {
                "pipeProgram": "sh",
                "pipeArgs": ["-c", attach],
                "debuggerPath": "/vsdbg/vsdbg",
                "pipeCwd": "${workspaceFolder}",
            },
            "windows": {
                "pipeTransport": {
                    "pipeProgram": "powershell",
                    "pipeArgs": ["-c", attach],
                    "debuggerPath": "/vsdbg/vsdbg",
                    "pipeCwd": "${workspaceFolder}",
                }
            },
            "sourceFileMap": {
                "/code": ctx.code_dir_str(),
            },
        })))
    }
}
