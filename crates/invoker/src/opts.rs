//! Builders turning a function description into container create requests.

use crate::CreateSpec;
use fc_local_models::{
    Credentials, DebugConfig, FunctionSpec, LocalError, MountSpec, NasConfig, PortPublish,
    Runtime, ServiceSpec,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Path, PathBuf};

/// Run-stage uid/gid used when the host identity is not forwarded.
pub const NAS_UID: i64 = 10003;
pub const NAS_GID: i64 = 10003;

pub const CODE_MOUNT_DIR: &str = "/code";
pub const DEBUGGER_MOUNT_DIR: &str = "/tmp/debugger_files";

/// Docker Desktop file-sharing roots on macOS.
const MACOS_SHARED_ROOTS: [&str; 4] = ["/Users", "/Volumes", "/private", "/tmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Linux,
    MacOs,
    Windows,
}

impl HostPlatform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            HostPlatform::MacOs
        } else if cfg!(target_os = "windows") {
            HostPlatform::Windows
        } else {
            HostPlatform::Linux
        }
    }
}

/// Deterministic name shared by event-start servers and warm reuse.
pub fn container_name(service_name: &str, function_name: &str, debug: bool) -> String {
    let base: String = format!("fun-local-{service_name}-{function_name}")
        .chars()
        .filter(|c| *c != ' ')
        .collect();
    if debug {
        format!("{base}-debug")
    } else {
        format!("{base}-run")
    }
}

pub fn random_container_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!(
        "fun_local_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        suffix
    )
}

/// Inputs of the ordered environment construction.
#[derive(Debug, Clone, Copy)]
pub struct EnvContext<'a> {
    pub service: &'a ServiceSpec,
    pub function: &'a FunctionSpec,
    pub credentials: &'a Credentials,
    pub debug: Option<&'a DebugConfig>,
    /// Explicit debugger arguments, replacing the runtime's debug env.
    pub debug_args: Option<&'a str>,
    /// Base64 `FC_HTTP_PARAMS` for HTTP invocations.
    pub http_params: Option<&'a str>,
    pub http_trigger: bool,
}

/// Where `fun install` style dependencies live inside the code mount.
const FUN_PREFIX: &str = "/code/.fun";
const SYS_LIB_DIRS: [&str; 6] = [
    "/usr/local/lib",
    "/usr/lib",
    "/usr/lib/x86_64-linux-gnu",
    "/usr/lib64",
    "/lib",
    "/lib/x86_64-linux-gnu",
];
const FC_LIB_DIRS: [&str; 3] = ["/code", "/code/lib", "/usr/local/lib"];
const SYS_BIN_DIRS: [&str; 6] = [
    "/usr/local/bin",
    "/usr/local/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/sbin",
    "/bin",
];
const FC_BIN_DIRS: [&str; 2] = ["/code", "/code/node_modules/.bin"];
const FUN_BIN_DIRS: [&str; 2] = ["/python/bin", "/node_modules/.bin"];
const PYTHON_SITE_PACKAGES: [&str; 2] = [
    "/python/lib/python2.7/site-packages",
    "/python/lib/python3.6/site-packages",
];

fn get_env<'a>(env: &'a [(String, String)], key: &str) -> Option<&'a str> {
    env.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// Joins path lists with `:`, keeping the first occurrence of each entry.
fn join_paths(existing: Option<&str>, entries: impl IntoIterator<Item = String>) -> String {
    let mut seen: Vec<String> = Vec::new();
    let existing = existing.into_iter().flat_map(|e| e.split(':').map(str::to_string));
    for entry in existing.chain(entries) {
        if !seen.contains(&entry) {
            seen.push(entry);
        }
    }
    seen.join(":")
}

/// Prepends the variable's current value to the search paths rooted at `prefix`.
fn extend_search_paths(env: &mut Vec<(String, String)>, prefix: &str, node_root: &str) {
    let lib = join_paths(
        get_env(env, "LD_LIBRARY_PATH"),
        SYS_LIB_DIRS
            .iter()
            .map(|d| format!("{prefix}/root{d}"))
            .chain(FC_LIB_DIRS.iter().map(|d| d.to_string())),
    );
    set_env(env, "LD_LIBRARY_PATH", lib);

    let path = join_paths(
        get_env(env, "PATH"),
        SYS_BIN_DIRS
            .iter()
            .map(|d| format!("{prefix}/root{d}"))
            .chain(FC_BIN_DIRS.iter().map(|d| d.to_string()))
            .chain(FUN_BIN_DIRS.iter().map(|d| format!("{prefix}{d}")))
            .chain(SYS_BIN_DIRS.iter().map(|d| d.to_string())),
    );
    set_env(env, "PATH", path);

    let node = join_paths(
        get_env(env, "NODE_PATH"),
        [
            format!("{node_root}/node_modules"),
            "/usr/local/lib/node_modules".to_string(),
        ],
    );
    set_env(env, "NODE_PATH", node);
}

/// Library, binary, node and python search paths for dependencies installed
/// into the code directory or onto NAS mounts.
fn add_install_paths(env: &mut Vec<(String, String)>, nas: Option<&NasConfig>) {
    extend_search_paths(env, FUN_PREFIX, CODE_MOUNT_DIR);

    let python_base = format!("{FUN_PREFIX}/python");
    if get_env(env, "PYTHONUSERBASE").is_none() {
        set_env(env, "PYTHONUSERBASE", python_base.as_str());
    }
    if get_env(env, "PYTHONPATH").is_none() {
        set_env(env, "PYTHONPATH", format!("{python_base}/lib/python/site-packages"));
    }

    for mount in nas.map(|n| n.mount_points.as_slice()).unwrap_or_default() {
        let dir = mount.mount_dir.as_str();
        extend_search_paths(env, dir, dir);
        let site_packages: Vec<String> = PYTHON_SITE_PACKAGES
            .iter()
            .map(|p| format!("{dir}{p}"))
            .collect();
        let python_path = match get_env(env, "PYTHONPATH") {
            Some(existing) => format!("{existing}:{}", site_packages.join(":")),
            None => site_packages.join(":"),
        };
        set_env(env, "PYTHONPATH", python_path);
    }
}

/// `LD_LIBRARY_PATH` from the `ld.so.conf.d` staged under the code's `.fun/root`.
pub fn ld_conf_lib_path(code_dir: &Path) -> Option<String> {
    let confd = code_dir.join(".fun/root/etc/ld.so.conf.d");
    let mut files: Vec<PathBuf> = std::fs::read_dir(&confd)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "conf"))
        .collect();
    files.sort();

    let dirs: Vec<String> = files
        .iter()
        .filter_map(|f| std::fs::read_to_string(f).ok())
        .flat_map(|content| {
            content
                .lines()
                .map(str::trim)
                .filter(|line| line.starts_with('/'))
                .map(|line| format!("{FUN_PREFIX}/root{line}"))
                .collect::<Vec<_>>()
        })
        .collect();
    (!dirs.is_empty()).then(|| dirs.join(":"))
}

fn set_env(env: &mut Vec<(String, String)>, key: &str, value: impl Into<String>) {
    let value = value.into();
    match env.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = value,
        None => env.push((key.to_string(), value)),
    }
}

/// Builds the container environment. Later keys override earlier ones in place.
/// Every runtime except custom containers also gets the install search paths.
pub fn build_env(ctx: &EnvContext<'_>) -> Vec<(String, String)> {
    let mut env = Vec::new();
    let function = ctx.function;

    if let Some(params) = ctx.http_params {
        set_env(&mut env, "FC_HTTP_PARAMS", params);
    }

    if let Some(lib_path) = ld_conf_lib_path(&function.code_uri) {
        set_env(&mut env, "LD_LIBRARY_PATH", lib_path);
    }

    match (ctx.debug_args, ctx.debug) {
        (Some(args), _) => set_env(&mut env, "DEBUG_OPTIONS", args),
        (None, Some(debug)) => {
            for (k, v) in &debug.env {
                set_env(&mut env, k, v.as_str());
            }
        }
        (None, None) => {}
    }

    if ctx.http_trigger && matches!(function.runtime, Runtime::Java8 | Runtime::Java11) {
        set_env(&mut env, "fc_enable_new_java_ca", "true");
    }

    for (k, v) in &function.environment_variables {
        set_env(&mut env, k, v.as_str());
    }

    let creds = ctx.credentials;
    set_env(&mut env, "local", "true");
    set_env(&mut env, "FC_ACCESS_KEY_ID", creds.access_key_id.as_str());
    set_env(&mut env, "FC_ACCESS_KEY_SECRET", creds.access_key_secret.as_str());
    set_env(&mut env, "FC_SECURITY_TOKEN", creds.security_token.as_str());
    set_env(&mut env, "FC_ACCOUND_ID", creds.account_id.as_str());
    set_env(&mut env, "FC_REGION", creds.region.as_str());
    set_env(&mut env, "FC_FUNCTION_NAME", function.name.as_str());
    set_env(&mut env, "FC_HANDLER", function.handler.as_str());
    set_env(&mut env, "FC_MEMORY_SIZE", function.memory_mb().to_string());
    set_env(&mut env, "FC_TIMEOUT", function.timeout_seconds().to_string());
    if let Some(initializer) = &function.initializer {
        set_env(&mut env, "FC_INITIALIZER", initializer.as_str());
    }
    set_env(
        &mut env,
        "FC_INITIALIZATIONTIMEOUT",
        function.initialization_timeout_seconds().to_string(),
    );
    set_env(&mut env, "FC_SERVICE_NAME", ctx.service.name.as_str());
    if let Some(project) = &ctx.service.log_project {
        set_env(&mut env, "FC_SERVICE_LOG_PROJECT", project.as_str());
    }
    if let Some(store) = &ctx.service.log_store {
        set_env(&mut env, "FC_SERVICE_LOG_STORE", store.as_str());
    }

    if function.runtime == Runtime::Custom {
        if let Some(bootstrap) = env
            .iter()
            .find(|(k, _)| k == "BOOTSTRAP_FILE")
            .map(|(_, v)| v.clone())
        {
            set_env(&mut env, "AGENT_SCRIPT", bootstrap);
        }
    }

    if !function.runtime.is_custom_container() {
        add_install_paths(&mut env, ctx.service.nas.as_ref());
    }

    env
}

/// Host uid and gid, where the platform has them.
pub fn host_identity() -> Option<(u32, u32)> {
    #[cfg(unix)]
    {
        Some((nix::unistd::getuid().as_raw(), nix::unistd::getgid().as_raw()))
    }
    #[cfg(not(unix))]
    {
        None
    }
}

/// `uid:gid` for run containers.
pub fn docker_user(
    platform: HostPlatform,
    host: Option<(u32, u32)>,
    nas: Option<&NasConfig>,
) -> String {
    if let (HostPlatform::Linux, Some((uid, gid))) = (platform, host) {
        return format!("{uid}:{gid}");
    }
    let (mut uid, mut gid) = (NAS_UID, NAS_GID);
    if let Some(nas) = nas {
        if nas.user_id != -1 {
            uid = nas.user_id;
        }
        if nas.group_id != -1 {
            gid = nas.group_id;
        }
    }
    format!("{uid}:{gid}")
}

/// Code artifact mount: a directory lands on `/code`, a single file inside it.
pub fn code_mount(code_uri: &Path, read_only: bool) -> Result<MountSpec, LocalError> {
    let metadata = std::fs::metadata(code_uri).map_err(|e| LocalError::InvalidMount {
        reason: format!("code path {} is not accessible: {e}", code_uri.display()),
    })?;
    let target = if metadata.is_dir() {
        CODE_MOUNT_DIR.to_string()
    } else {
        let file_name = code_uri
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{CODE_MOUNT_DIR}/{file_name}")
    };
    Ok(MountSpec::bind(code_uri, target, read_only))
}

pub fn nas_mounts(nas: Option<&NasConfig>) -> Vec<MountSpec> {
    nas.map(|nas| {
        nas.mount_points
            .iter()
            .map(|mp| MountSpec::bind(&mp.local_dir, mp.mount_dir.clone(), false))
            .collect()
    })
    .unwrap_or_default()
}

pub fn tmp_mount(tmp_dir: &Path) -> MountSpec {
    MountSpec::bind(tmp_dir, "/tmp", false)
}

pub fn debugger_mount(debugger_path: &Path) -> MountSpec {
    MountSpec::bind(debugger_path, DEBUGGER_MOUNT_DIR, false)
}

pub fn passwd_line(uid: u32, gid: u32) -> String {
    format!("user:x:{uid}:{gid}::/tmp:/usr/sbin/nologin\n")
}

/// Writes a passwd file into `dir` so the container user resolves to a name.
pub fn passwd_mount(dir: &Path, uid: u32, gid: u32) -> Result<MountSpec, LocalError> {
    let path: PathBuf = dir.join("passwd");
    std::fs::write(&path, passwd_line(uid, gid))?;
    Ok(MountSpec::bind(path, "/etc/passwd", true))
}

/// Rejects bind sources Docker Desktop on macOS cannot share.
pub fn validate_mounts(platform: HostPlatform, mounts: &[MountSpec]) -> Result<(), LocalError> {
    if platform != HostPlatform::MacOs {
        return Ok(());
    }
    for mount in mounts {
        let shared = MACOS_SHARED_ROOTS
            .iter()
            .any(|root| mount.source.starts_with(root));
        if !shared {
            return Err(LocalError::InvalidMount {
                reason: format!(
                    "{} is not shared with Docker. Add it in Docker -> Preferences -> Resources -> File Sharing, then retry.",
                    mount.source.display()
                ),
            });
        }
    }
    Ok(())
}

/// Maps engine create failures to actionable guidance.
pub fn translate_create_error(err: &anyhow::Error) -> LocalError {
    let message = err.to_string();
    if message.contains("invalid mount config for type") {
        return LocalError::ContainerCreation {
            reason: "The default host machine path for docker toolbox is under 'C:\\Users', please make sure your project is in this directory.".to_string(),
        };
    }
    if message.contains("drive is not shared") {
        return LocalError::ContainerCreation {
            reason: format!(
                "{message}. Please enable shared drives, see https://docs.docker.com/docker-for-windows/#shared-drives"
            ),
        };
    }
    LocalError::ContainerCreation { reason: message }
}

/// Materialized pieces common to every container kind.
#[derive(Debug, Clone, Default)]
pub struct ContainerPlan {
    pub image: String,
    pub name: String,
    pub env: Vec<(String, String)>,
    pub user: Option<String>,
    pub mounts: Vec<MountSpec>,
    pub debug_ports: Vec<PortPublish>,
}

impl ContainerPlan {
    /// One-shot run fed through stdin.
    pub fn one_shot(&self, cmd: Vec<String>) -> CreateSpec {
        CreateSpec {
            image: self.image.clone(),
            name: self.name.clone(),
            env: self.env.clone(),
            cmd,
            entrypoint: None,
            user: self.user.clone(),
            mounts: self.mounts.clone(),
            ports: self.debug_ports.clone(),
            open_stdin: true,
            tty: false,
            auto_remove: true,
            labels: vec![],
        }
    }

    /// Long-lived container driven through repeated execs.
    pub fn server(&self, entrypoint: Option<String>, cmd: Vec<String>) -> CreateSpec {
        CreateSpec {
            entrypoint: entrypoint.map(|e| vec![e]),
            open_stdin: false,
            ..self.one_shot(cmd)
        }
    }

    /// Function image serving HTTP on `ca_port`, bound to the same host port.
    pub fn custom_container(&self, cmd: Vec<String>, ca_port: u16) -> CreateSpec {
        CreateSpec {
            user: None,
            ports: vec![PortPublish::same(ca_port)],
            ..self.one_shot(cmd)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_local_models::{DebugIde, IdeConfig, NasMountPoint};
    use std::collections::BTreeMap;

    fn function(runtime: Runtime) -> FunctionSpec {
        FunctionSpec {
            name: "hello".into(),
            runtime,
            handler: "index.handler".into(),
            initializer: None,
            timeout_seconds: None,
            initialization_timeout_seconds: None,
            memory_mb: Some(256),
            environment_variables: BTreeMap::from([
                ("local".to_string(), "false".to_string()),
                ("BOOTSTRAP_FILE".to_string(), "/code/start.sh".to_string()),
            ]),
            code_uri: "/code".into(),
            ca_port: None,
            custom_container: None,
        }
    }

    fn service() -> ServiceSpec {
        ServiceSpec {
            name: "demo svc".into(),
            log_project: Some("proj".into()),
            ..Default::default()
        }
    }

    #[test]
    fn names() {
        assert_eq!(container_name("my svc", "fn a", false), "fun-local-mysvc-fna-run");
        assert_eq!(container_name("s", "f", true), "fun-local-s-f-debug");

        let random = random_container_name();
        let parts: Vec<&str> = random.split('_').collect();
        assert_eq!(parts[0..2], ["fun", "local"]);
        assert!(parts[2].parse::<i64>().is_ok());
        assert_eq!(parts[3].len(), 7);
        assert!(parts[3].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn env_order_and_overrides() {
        let svc = service();
        let func = function(Runtime::Java8);
        let creds = Credentials {
            access_key_id: "ak".into(),
            region: "cn-shanghai".into(),
            ..Default::default()
        };
        let debug = DebugConfig {
            ide: DebugIde::VsCode,
            port: 5005,
            env: vec![("DEBUG_OPTIONS".into(), "-agentlib:jdwp".into())],
            ports: vec![PortPublish::same(5005)],
            ide_config: IdeConfig::PyCharm(String::new()),
        };
        let env = build_env(&EnvContext {
            service: &svc,
            function: &func,
            credentials: &creds,
            debug: Some(&debug),
            debug_args: None,
            http_params: Some("e30="),
            http_trigger: true,
        });

        let keys: Vec<&str> = env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys[0], "FC_HTTP_PARAMS");
        assert_eq!(keys[1], "DEBUG_OPTIONS");
        assert_eq!(keys[2], "fc_enable_new_java_ca");

        let get = |key: &str| env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        // platform values win over the function's own
        assert_eq!(get("local"), Some("true"));
        assert_eq!(get("FC_MEMORY_SIZE"), Some("256"));
        assert_eq!(get("FC_TIMEOUT"), Some("3"));
        assert_eq!(get("FC_INITIALIZATIONTIMEOUT"), Some("3"));
        assert_eq!(get("FC_ACCESS_KEY_ID"), Some("ak"));
        assert_eq!(get("FC_SERVICE_NAME"), Some("demo svc"));
        assert_eq!(get("FC_SERVICE_LOG_PROJECT"), Some("proj"));
        assert_eq!(get("FC_SERVICE_LOG_STORE"), None);
        assert_eq!(get("FC_INITIALIZER"), None);
        assert_eq!(get("AGENT_SCRIPT"), None);
    }

    #[test]
    fn explicit_debug_args_and_custom_bootstrap() {
        let svc = service();
        let func = function(Runtime::Custom);
        let creds = Credentials::default();
        let env = build_env(&EnvContext {
            service: &svc,
            function: &func,
            credentials: &creds,
            debug: None,
            debug_args: Some("--inspect"),
            http_params: None,
            http_trigger: false,
        });
        assert_eq!(env[0], ("DEBUG_OPTIONS".to_string(), "--inspect".to_string()));
        assert!(env.contains(&("AGENT_SCRIPT".to_string(), "/code/start.sh".to_string())));
        assert!(!env.iter().any(|(k, _)| k == "fc_enable_new_java_ca"));
    }

    #[test]
    fn install_paths_extend_user_values() {
        let mut svc = service();
        svc.nas = Some(NasConfig {
            user_id: -1,
            group_id: -1,
            mount_points: vec![NasMountPoint {
                local_dir: "/tmp/nas".into(),
                mount_dir: "/mnt/auto".into(),
            }],
        });
        let mut func = function(Runtime::Python3);
        func.environment_variables
            .insert("PATH".into(), "/opt/tools:/usr/bin".into());
        let creds = Credentials::default();
        let env = build_env(&EnvContext {
            service: &svc,
            function: &func,
            credentials: &creds,
            debug: None,
            debug_args: None,
            http_params: None,
            http_trigger: false,
        });
        let get = |key: &str| env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());

        let path: Vec<&str> = get("PATH").unwrap().split(':').collect();
        assert_eq!(path[0..3], ["/opt/tools", "/usr/bin", "/code/.fun/root/usr/local/bin"]);
        assert!(path.contains(&"/code/.fun/python/bin"));
        assert!(path.contains(&"/mnt/auto/root/usr/local/bin"));
        assert_eq!(path.iter().filter(|p| **p == "/usr/bin").count(), 1);

        let lib = get("LD_LIBRARY_PATH").unwrap();
        assert!(lib.starts_with("/code/.fun/root/usr/local/lib:/code/.fun/root/usr/lib:"));
        assert!(lib.contains(":/code:/code/lib:/usr/local/lib:/mnt/auto/root/usr/local/lib"));

        assert_eq!(
            get("NODE_PATH"),
            Some("/code/node_modules:/usr/local/lib/node_modules:/mnt/auto/node_modules")
        );
        assert_eq!(get("PYTHONUSERBASE"), Some("/code/.fun/python"));
        assert_eq!(
            get("PYTHONPATH"),
            Some(
                "/code/.fun/python/lib/python/site-packages:\
                 /mnt/auto/python/lib/python2.7/site-packages:\
                 /mnt/auto/python/lib/python3.6/site-packages"
            )
        );
    }

    #[test]
    fn custom_containers_keep_their_own_paths() {
        let svc = service();
        let func = function(Runtime::CustomContainer);
        let creds = Credentials::default();
        let env = build_env(&EnvContext {
            service: &svc,
            function: &func,
            credentials: &creds,
            debug: None,
            debug_args: None,
            http_params: None,
            http_trigger: false,
        });
        assert!(!env.iter().any(|(k, _)| k == "PATH" || k == "PYTHONPATH"));
    }

    #[test]
    fn ld_conf_dirs_are_rebased_under_fun_root() {
        let code = tempfile::tempdir().unwrap();
        let confd = code.path().join(".fun/root/etc/ld.so.conf.d");
        std::fs::create_dir_all(&confd).unwrap();
        std::fs::write(confd.join("b.conf"), "  /usr/lib/b  \n# comment\n").unwrap();
        std::fs::write(confd.join("a.conf"), "/opt/a/lib\n").unwrap();
        std::fs::write(confd.join("notes.txt"), "/ignored\n").unwrap();

        assert_eq!(
            ld_conf_lib_path(code.path()).as_deref(),
            Some("/code/.fun/root/opt/a/lib:/code/.fun/root/usr/lib/b")
        );
        assert!(ld_conf_lib_path(&code.path().join("missing")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn host_identity_owns_new_files() {
        use std::os::unix::fs::MetadataExt;

        let file = tempfile::NamedTempFile::new().unwrap();
        let (uid, _) = host_identity().unwrap();
        assert_eq!(file.as_file().metadata().unwrap().uid(), uid);
    }

    #[test]
    fn user_resolution() {
        assert_eq!(docker_user(HostPlatform::Linux, Some((1000, 100)), None), "1000:100");
        assert_eq!(docker_user(HostPlatform::MacOs, Some((501, 20)), None), "10003:10003");
        let nas = NasConfig {
            user_id: 1234,
            group_id: -1,
            mount_points: vec![],
        };
        assert_eq!(docker_user(HostPlatform::Windows, None, Some(&nas)), "1234:10003");
    }

    #[test]
    fn code_mount_for_dir_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let mount = code_mount(dir.path(), true).unwrap();
        assert_eq!(mount.target, "/code");
        assert!(mount.read_only);

        let jar = dir.path().join("app.jar");
        std::fs::write(&jar, b"PK").unwrap();
        let mount = code_mount(&jar, true).unwrap();
        assert_eq!(mount.target, "/code/app.jar");

        assert!(matches!(
            code_mount(&dir.path().join("missing"), true),
            Err(LocalError::InvalidMount { .. })
        ));
    }

    #[test]
    fn passwd_and_nas_mounts() {
        let dir = tempfile::tempdir().unwrap();
        let mount = passwd_mount(dir.path(), 1000, 1000).unwrap();
        assert_eq!(mount.target, "/etc/passwd");
        assert!(mount.read_only);
        let contents = std::fs::read_to_string(&mount.source).unwrap();
        assert_eq!(contents, "user:x:1000:1000::/tmp:/usr/sbin/nologin\n");

        let nas = NasConfig {
            user_id: -1,
            group_id: -1,
            mount_points: vec![NasMountPoint {
                local_dir: "/Users/dev/.fun/nas".into(),
                mount_dir: "/mnt/auto".into(),
            }],
        };
        let mounts = nas_mounts(Some(&nas));
        assert_eq!(mounts.len(), 1);
        assert!(!mounts[0].read_only);
        assert_eq!(mounts[0].target, "/mnt/auto");
    }

    #[test]
    fn macos_rejects_unshared_sources() {
        let ok = [MountSpec::bind("/Users/dev/code", "/code", true)];
        assert!(validate_mounts(HostPlatform::MacOs, &ok).is_ok());

        let bad = [MountSpec::bind("/opt/code", "/code", true)];
        assert!(matches!(
            validate_mounts(HostPlatform::MacOs, &bad),
            Err(LocalError::InvalidMount { .. })
        ));
        assert!(validate_mounts(HostPlatform::Linux, &bad).is_ok());
    }

    #[test]
    fn create_errors_get_guidance() {
        let err = anyhow::anyhow!("invalid mount config for type \"bind\"");
        assert!(translate_create_error(&err).to_string().contains("C:\\Users"));

        let err = anyhow::anyhow!("Drive has not been shared: drive is not shared");
        assert!(translate_create_error(&err)
            .to_string()
            .contains("docs.docker.com/docker-for-windows/#shared-drives"));

        let err = anyhow::anyhow!("conflict");
        assert_eq!(translate_create_error(&err).to_string(), "conflict");
    }

    #[test]
    fn plan_variants() {
        let plan = ContainerPlan {
            image: "img".into(),
            name: "n".into(),
            user: Some("1:1".into()),
            debug_ports: vec![PortPublish::same(9229)],
            ..Default::default()
        };
        let one_shot = plan.one_shot(vec!["-h".into(), "index.handler".into()]);
        assert!(one_shot.open_stdin);
        assert!(one_shot.auto_remove);
        assert_eq!(one_shot.ports, vec![PortPublish::same(9229)]);

        let server = plan.server(Some("/var/fc/runtime/nodejs10/mock".into()), vec!["--server".into()]);
        assert!(!server.open_stdin);
        assert_eq!(server.entrypoint, Some(vec!["/var/fc/runtime/nodejs10/mock".to_string()]));

        let custom = plan.custom_container(vec![], 9000);
        assert_eq!(custom.ports, vec![PortPublish::same(9000)]);
        assert!(custom.user.is_none());
    }
}
