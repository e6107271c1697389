use fc_local_invoker::{
    build_env, code_mount, container_name, debugger_mount, docker_user, host_identity,
    nas_mounts, passwd_mount, tmp_mount, ContainerPlan, EnvContext, HostPlatform,
};
use fc_local_models::{
    Credentials, DebugConfig, DebugSettings, FunctionDefinition, FunctionSpec, IdeConfig,
    LocalError, ServiceSpec, DEFAULT_IMAGE_VERSION,
};
use fc_local_runtimes::{resolve_debug, resolve_image, IdeContext};
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::debug;

/// Per-command options that are not part of the function definition.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub debug: DebugSettings,
    pub tmp_dir: Option<PathBuf>,
    pub image_version: String,
    /// Address the container can reach the host on, used by debuggers that dial out.
    pub host_ip: String,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            debug: DebugSettings::default(),
            tmp_dir: None,
            image_version: DEFAULT_IMAGE_VERSION.to_string(),
            host_ip: "127.0.0.1".to_string(),
        }
    }
}

/// Environment extras that differ between adapters.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvExtras<'a> {
    pub http_params: Option<&'a str>,
    pub http_trigger: bool,
}

#[derive(Debug, Clone)]
pub struct PreparedPlan {
    pub plan: ContainerPlan,
    pub debug: Option<DebugConfig>,
}

/// Everything the adapters need to know about the function under test.
pub struct FunctionContext {
    pub service: ServiceSpec,
    pub function: FunctionSpec,
    pub credentials: Credentials,
    pub options: InvokeOptions,
    scratch: TempDir,
}

impl FunctionContext {
    pub fn new(
        definition: FunctionDefinition,
        credentials: Credentials,
        options: InvokeOptions,
    ) -> Result<Self, LocalError> {
        let scratch = tempfile::Builder::new().prefix("fc-local-").tempdir()?;
        Ok(Self {
            service: definition.service,
            function: definition.function,
            credentials,
            options,
            scratch,
        })
    }

    pub fn function_name(&self) -> &str {
        &self.function.name
    }

    pub fn is_debug(&self) -> bool {
        self.options.debug.is_enabled()
    }

    pub fn image(&self) -> Result<String, LocalError> {
        resolve_image(&self.function, &self.options.image_version)
    }

    /// Deterministic name shared by event-start servers and warm reuse.
    pub fn container_name(&self) -> String {
        container_name(&self.service.name, &self.function.name, self.is_debug())
    }

    pub fn debug_config(&self) -> Result<Option<DebugConfig>, LocalError> {
        let Some(port) = self.options.debug.port else {
            return Ok(None);
        };
        let code_dir = if self.function.code_uri.is_dir() {
            self.function.code_uri.clone()
        } else {
            self.function
                .code_uri
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_default()
        };
        let ctx = IdeContext {
            service_name: self.service.name.clone(),
            function_name: self.function.name.clone(),
            code_dir,
            port,
            host_ip: self.options.host_ip.clone(),
        };
        resolve_debug(self.function.runtime, self.options.debug.ide(), &ctx).map(Some)
    }

    /// Resolves image, env, user and mounts for a container called `name`.
    pub fn plan(
        &self,
        platform: HostPlatform,
        name: String,
        extras: EnvExtras<'_>,
    ) -> Result<PreparedPlan, LocalError> {
        let debug = self.debug_config()?;
        let nas = self.service.nas.as_ref();
        let custom_container = self.function.runtime.is_custom_container();

        let env = build_env(&EnvContext {
            service: &self.service,
            function: &self.function,
            credentials: &self.credentials,
            debug: debug.as_ref(),
            debug_args: self.options.debug.debug_args.as_deref(),
            http_params: extras.http_params,
            http_trigger: extras.http_trigger,
        });

        let mut mounts = Vec::new();
        if !custom_container {
            // a code dir that doubles as NAS staging must stay writable
            let staged = nas
                .map(|n| n.mount_points.iter().any(|mp| mp.local_dir == self.function.code_uri))
                .unwrap_or(false);
            mounts.push(code_mount(&self.function.code_uri, !staged)?);
        }
        let identity = host_identity();
        if let (HostPlatform::Linux, Some((uid, gid)), false) = (platform, identity, custom_container) {
            mounts.push(passwd_mount(self.scratch.path(), uid, gid)?);
        }
        mounts.extend(nas_mounts(nas));
        if let Some(tmp_dir) = &self.options.tmp_dir {
            mounts.push(tmp_mount(tmp_dir));
        }
        if let Some(debugger) = &self.options.debug.debugger_path {
            mounts.push(debugger_mount(debugger));
        }

        let user = if custom_container {
            None
        } else {
            Some(docker_user(platform, identity, nas))
        };

        let plan = ContainerPlan {
            image: self.image()?,
            name,
            env,
            user,
            mounts,
            debug_ports: debug.as_ref().map(|d| d.ports.clone()).unwrap_or_default(),
        };
        debug!(name = %plan.name, image = %plan.image, mounts = plan.mounts.len(), "container plan ready");

        Ok(PreparedPlan { plan, debug })
    }
}

/// IDE attach artifact for a debug session, framed for the IDE it targets.
pub fn debug_tips(debug: &DebugConfig) -> String {
    match &debug.ide_config {
        IdeConfig::VsCode(_) => format!(
            "you can paste these config to .vscode/launch.json, and then attach to your running function\n\
             ///////////////// config begin /////////////////\n\
             {}\n\
             ///////////////// config end /////////////////",
            debug.ide_config
        ),
        IdeConfig::PyCharm(tips) => format!("\n{tips}\n"),
    }
}

pub fn print_debug_tips(debug: Option<&DebugConfig>) {
    if let Some(debug) = debug {
        println!("{}", debug_tips(debug));
    }
}
