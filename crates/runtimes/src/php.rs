use crate::{vscode_config, IdeContext, RuntimeFamily};
use fc_local_models::{DebugIde, IdeConfig, LocalError, PortPublish, Runtime};
use serde_json::json;

pub(crate) struct Php;

impl RuntimeFamily for Php {
    fn runtimes(&self) -> &'static [Runtime] {
        &[Runtime::Php72]
    }

    fn build_debug_env(
        &self,
        _runtime: Runtime,
        port: u16,
        _ide: DebugIde,
        host_ip: &str,
    ) -> Result<Vec<(String, String)>, LocalError> {
        Ok(vec![(
            "XDEBUG_CONFIG".to_string(),
            format!(
                "remote_enable=1 remote_autostart=1 remote_port={port} remote_host={host_ip}"
            ),
        )])
    }

    /// Xdebug dials out to the IDE, so nothing is published.
    fn build_docker_opts(&self, _runtime: Runtime, _port: u16, _ide: DebugIde) -> Vec<PortPublish> {
        Vec::new()
    }

    fn build_ide_config(
        &self,
        _runtime: Runtime,
        _ide: DebugIde,
        ctx: &IdeContext,
    ) -> Result<IdeConfig, LocalError> {
        Ok(vscode_config(json!({
            "name": ctx.configuration_name(),
            "type": "php",
            "request": "launch",
            "port": ctx.port,
            "stopOnEntry": false,
            "pathMappings": {
                "/code": ctx.code_dir_str(),
            },
            "ignore": ["/var/fc/runtime/**"],
        })))
    }
}
