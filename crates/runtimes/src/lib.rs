//! Per-runtime behaviour lives behind [`RuntimeFamily`]. Supporting a new
//! runtime means adding a table entry, not another branch at a call site.

use fc_local_models::{
    CustomContainerConfig, DebugIde, FunctionSpec, IdeConfig, LocalError, PortPublish, Runtime,
};
use std::path::PathBuf;

mod command;
mod custom;
pub mod debug;
mod dotnet;
mod image;
mod java;
mod node;
mod php;
mod python;

pub use command::*;
pub use debug::resolve_debug;
pub use image::*;

/// Inputs shared by every IDE attach artifact.
#[derive(Debug, Clone)]
pub struct IdeContext {
    pub service_name: String,
    pub function_name: String,
    /// Code directory on the host (the parent dir when the artifact is a file).
    pub code_dir: PathBuf,
    pub port: u16,
    pub host_ip: String,
}

impl IdeContext {
    pub fn configuration_name(&self) -> String {
        format!("fc/{}/{}", self.service_name, self.function_name)
    }

    pub fn code_dir_str(&self) -> String {
        self.code_dir.display().to_string()
    }
}

pub trait RuntimeFamily: Send + Sync {
    fn runtimes(&self) -> &'static [Runtime];

    /// Debug environment injected into the container.
    fn build_debug_env(
        &self,
        runtime: Runtime,
        port: u16,
        ide: DebugIde,
        host_ip: &str,
    ) -> Result<Vec<(String, String)>, LocalError>;

    /// Ports the debugger needs published. Empty when the debugger dials out.
    fn build_docker_opts(&self, _runtime: Runtime, port: u16, _ide: DebugIde) -> Vec<PortPublish> {
        vec![PortPublish::same(port)]
    }

    fn build_ide_config(
        &self,
        runtime: Runtime,
        ide: DebugIde,
        ctx: &IdeContext,
    ) -> Result<IdeConfig, LocalError>;

    fn build_invoke_command(&self, function: &FunctionSpec, request: &InvokeRequest<'_>) -> Vec<String> {
        standard_invoke_command(function, request)
    }

    fn supports_ide(&self, ide: DebugIde) -> bool {
        ide == DebugIde::VsCode
    }
}

static FAMILIES: &[&dyn RuntimeFamily] = &[
    &node::Node,
    &python::Python,
    &java::Java,
    &php::Php,
    &dotnet::Dotnet,
    &custom::Custom,
    &custom::CustomContainer,
];

pub fn family_for(runtime: Runtime) -> &'static dyn RuntimeFamily {
    FAMILIES
        .iter()
        .copied()
        .find(|family| family.runtimes().contains(&runtime))
        .unwrap_or(&custom::Custom)
}

/// Command for a custom-container function: `command ++ args`, or whichever is present.
pub fn custom_container_command(config: Option<&CustomContainerConfig>) -> Vec<String> {
    match config {
        Some(c) => c.command.iter().chain(c.args.iter()).cloned().collect(),
        None => Vec::new(),
    }
}

pub(crate) fn unsupported_runtime(runtime: Runtime) -> LocalError {
    LocalError::UnsupportedDebugConfiguration {
        reason: format!("debugging is not supported for runtime {runtime}"),
    }
}

pub(crate) fn vscode_config(configuration: serde_json::Value) -> IdeConfig {
    IdeConfig::VsCode(serde_json::json!({
        "version": "0.2.0",
        "configurations": [configuration],
    }))
}
