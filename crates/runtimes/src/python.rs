use crate::{vscode_config, IdeContext, RuntimeFamily};
use fc_local_models::{DebugIde, IdeConfig, LocalError, PortPublish, Runtime};
use serde_json::json;

pub(crate) struct Python;

impl RuntimeFamily for Python {
    fn runtimes(&self) -> &'static [Runtime] {
        &[Runtime::Python27, Runtime::Python3]
    }

    fn build_debug_env(
        &self,
        _runtime: Runtime,
        port: u16,
        ide: DebugIde,
        _host_ip: &str,
    ) -> Result<Vec<(String, String)>, LocalError> {
        match ide {
            // pydevd connects back to the IDE, nothing to configure in the container
            DebugIde::PyCharm => Ok(Vec::new()),
            DebugIde::VsCode => Ok(vec![(
                "DEBUG_OPTIONS".to_string(),
                format!("-m ptvsd --host 0.0.0.0 --port {port} --wait"),
            )]),
        }
    }

    fn build_docker_opts(&self, _runtime: Runtime, port: u16, ide: DebugIde) -> Vec<PortPublish> {
        match ide {
            DebugIde::PyCharm => Vec::new(),
            DebugIde::VsCode => vec![PortPublish::same(port)],
        }
    }

    fn build_ide_config(
        &self,
        _runtime: Runtime,
        ide: DebugIde,
        ctx: &IdeContext,
    ) -> Result<IdeConfig, LocalError> {
        match ide {
            DebugIde::VsCode => Ok(vscode_config(json!({
                "name": ctx.configuration_name(),
                "type": "python",
                "request": "attach",
                "host": "localhost",
                "port": ctx.port,
                "pathMappings": [
                    {
                        "localRoot": ctx.code_dir_str(),
                        "remoteRoot": "/code",
                    }
                ],
            }))),
            DebugIde::PyCharm => Ok(IdeConfig::PyCharm(format!(
                "========= Tips for PyCharm remote debug =========\n\
                 Local host name: {host}\n\
                 Port           : {port}\n\
                 Path mappings  : {code}=/code\n\
                 \n\
                 Debug Code needed to copy to your function code:\n\
                 \n\
                 import pydevd\n\
                 pydevd.settrace('{host}', port={port}, stdoutToServer=True, stderrToServer=True)\n\
                 \n\
                 =========================================================================",
                host = ctx.host_ip,
                port = ctx.port,
                code = ctx.code_dir_str(),
            ))),
        }
    }

    fn supports_ide(&self, _ide: DebugIde) -> bool {
        true
    }
}
