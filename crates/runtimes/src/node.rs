use crate::{vscode_config, IdeContext, RuntimeFamily};
use fc_local_models::{DebugIde, IdeConfig, LocalError, Runtime};
use serde_json::json;

pub(crate) struct Node;

impl RuntimeFamily for Node {
    fn runtimes(&self) -> &'static [Runtime] {
        &[
            Runtime::Nodejs6,
            Runtime::Nodejs8,
            Runtime::Nodejs10,
            Runtime::Nodejs12,
        ]
    }

    fn build_debug_env(
        &self,
        runtime: Runtime,
        port: u16,
        _ide: DebugIde,
        _host_ip: &str,
    ) -> Result<Vec<(String, String)>, LocalError> {
        let options = match runtime {
            Runtime::Nodejs6 => format!("--debug-brk={port}"),
            _ => format!("--inspect-brk=0.0.0.0:{port}"),
        };
        Ok(vec![("DEBUG_OPTIONS".to_string(), options)])
    }

    fn build_ide_config(
        &self,
        runtime: Runtime,
        _ide: DebugIde,
        ctx: &IdeContext,
    ) -> Result<IdeConfig, LocalError> {
        // node 6 only speaks the legacy debugger protocol
        let protocol = if runtime == Runtime::Nodejs6 {
            "legacy"
        } else {
            "inspector"
        };
        Ok(vscode_config(json!({
            "name": ctx.configuration_name(),
            "type": "node",
            "request": "attach",
            "address": "localhost",
            "port": ctx.port,
            "localRoot": ctx.code_dir_str(),
            "remoteRoot": "/code",
            "protocol": protocol,
            "stopOnEntry": false,
        })))
    }
}
