use crate::{family_for, IdeContext};
use fc_local_models::{DebugConfig, DebugIde, LocalError, Runtime};
use tracing::debug;

/// Derives env, published ports and the IDE attach artifact for a debug session.
///
/// Pure with respect to `(runtime, ctx.port, ide)`; the host address only
/// feeds runtimes whose debugger connects back to the developer machine.
pub fn resolve_debug(
    runtime: Runtime,
    ide: DebugIde,
    ctx: &IdeContext,
) -> Result<DebugConfig, LocalError> {
    let family = family_for(runtime);

    if !family.supports_ide(ide) {
        return Err(LocalError::UnsupportedDebugConfiguration {
            reason: format!("{ide} debug config only support for runtime [python2.7, python3]"),
        });
    }

    let env = family.build_debug_env(runtime, ctx.port, ide, &ctx.host_ip)?;
    let ports = family.build_docker_opts(runtime, ctx.port, ide);
    let ide_config = family.build_ide_config(runtime, ide, ctx)?;

    debug!(runtime = %runtime, ide = %ide, port = ctx.port, ?env, "resolved debug config");

    Ok(DebugConfig {
        ide,
        port: ctx.port,
        env,
        ports,
        ide_config,
    })
}
