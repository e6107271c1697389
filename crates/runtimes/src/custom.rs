use crate::{custom_container_command, unsupported_runtime, IdeContext, InvokeRequest, RuntimeFamily};
use fc_local_models::{DebugIde, FunctionSpec, IdeConfig, LocalError, Runtime};

/// `custom` runtime: a bootstrap script driven by the standard mock.
pub(crate) struct Custom;

impl RuntimeFamily for Custom {
    fn runtimes(&self) -> &'static [Runtime] {
        &[Runtime::Custom]
    }

    fn build_debug_env(
        &self,
        runtime: Runtime,
        _port: u16,
        _ide: DebugIde,
        _host_ip: &str,
    ) -> Result<Vec<(String, String)>, LocalError> {
        Err(unsupported_runtime(runtime))
    }

    fn build_ide_config(
        &self,
        runtime: Runtime,
        _ide: DebugIde,
        _ctx: &IdeContext,
    ) -> Result<IdeConfig, LocalError> {
        Err(unsupported_runtime(runtime))
    }
}

/// The function is its own image with an embedded HTTP server.
pub(crate) struct CustomContainer;

impl RuntimeFamily for CustomContainer {
    fn runtimes(&self) -> &'static [Runtime] {
        &[Runtime::CustomContainer]
    }

    fn build_debug_env(
        &self,
        runtime: Runtime,
        _port: u16,
        _ide: DebugIde,
        _host_ip: &str,
    ) -> Result<Vec<(String, String)>, LocalError> {
        Err(unsupported_runtime(runtime))
    }

    fn build_ide_config(
        &self,
        runtime: Runtime,
        _ide: DebugIde,
        _ctx: &IdeContext,
    ) -> Result<IdeConfig, LocalError> {
        Err(unsupported_runtime(runtime))
    }

    fn build_invoke_command(&self, function: &FunctionSpec, _request: &InvokeRequest<'_>) -> Vec<String> {
        custom_container_command(function.custom_container.as_ref())
    }
}
