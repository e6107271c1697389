use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Args, Parser, Subcommand, ValueEnum};
use fc_local_api::{AppState, ServeMode};
use fc_local_control::{
    ApiInvoke, CleanupCoordinator, CustomContainerInvoke, EventStart, FunctionContext,
    HttpInvoker, HttpTriggerInvoke, InvokeOptions, LocalInvoke,
};
use fc_local_framing::ConsoleSink;
use fc_local_invoker::{ContainerManager, Invoker, LiveContainers, ManagerSettings};
use fc_local_metrics::{MetricsService, TracingService};
use fc_local_models::{Config, DebugIde, DebugSettings, FunctionDefinition};
use std::io::{Read, Write};
use std::net::UdpSocket;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "fc-local")]
#[command(about = "Run function compute functions locally in containers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./fc-local.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Function definition TOML
    #[arg(long, global = true, default_value = "function.toml")]
    function: PathBuf,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke the function once with an event
    Invoke {
        /// Event payload
        #[arg(long, conflicts_with = "event_file")]
        event: Option<String>,

        /// Read the event from a file
        #[arg(long)]
        event_file: Option<PathBuf>,

        /// Reuse a container left running by `start`
        #[arg(long)]
        reuse: bool,

        #[command(flatten)]
        debug: DebugArgs,
    },

    /// Start a persistent container serving invokes with --reuse
    Start {
        #[command(flatten)]
        debug: DebugArgs,
    },

    /// Serve the function over HTTP
    Serve {
        /// Serve as an HTTP trigger instead of the invocation API
        #[arg(long)]
        http_trigger: bool,

        /// Override the HTTP-trigger path prefix
        #[arg(long)]
        trigger_prefix: Option<String>,

        #[arg(long, value_enum, default_value_t = AuthType::Function)]
        auth_type: AuthType,

        #[command(flatten)]
        debug: DebugArgs,
    },
}

#[derive(Args, Clone, Default)]
struct DebugArgs {
    /// Port the debugger listens on inside the container
    #[arg(long)]
    debug_port: Option<u16>,

    #[arg(long, value_enum)]
    debug_ide: Option<Ide>,

    /// Host directory holding the debugger, mounted into the container
    #[arg(long)]
    debugger_path: Option<PathBuf>,

    /// Extra arguments for the debugger
    #[arg(long, allow_hyphen_values = true)]
    debug_args: Option<String>,

    /// Host directory mounted as /tmp
    #[arg(long)]
    tmp_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Ide {
    Vscode,
    Pycharm,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AuthType {
    Anonymous,
    Function,
}

impl DebugArgs {
    fn options(&self, config: &Config) -> InvokeOptions {
        InvokeOptions {
            debug: DebugSettings {
                port: self.debug_port,
                ide: self.debug_ide.map(|ide| match ide {
                    Ide::Vscode => DebugIde::VsCode,
                    Ide::Pycharm => DebugIde::PyCharm,
                }),
                debugger_path: self.debugger_path.clone(),
                debug_args: self.debug_args.clone(),
            },
            tmp_dir: self.tmp_dir.clone(),
            image_version: config.docker.image_version.clone(),
            host_ip: detect_host_ip(),
        }
    }
}

/// Address of the interface used for outbound traffic; debuggers in the
/// container dial back to it.
fn detect_host_ip() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn read_event(event: Option<String>, event_file: Option<PathBuf>) -> Result<Bytes> {
    if let Some(event) = event {
        return Ok(Bytes::from(event));
    }
    if let Some(path) = event_file {
        let data = std::fs::read(&path)
            .with_context(|| format!("failed to read event file {}", path.display()))?;
        return Ok(Bytes::from(data));
    }
    println!("Reading event data from stdin, which can be ended with Enter then Ctrl+D");
    let mut data = Vec::new();
    std::io::stdin().read_to_end(&mut data)?;
    Ok(Bytes::from(data))
}

/// Stops every live container on the first Ctrl-C or SIGTERM, then exits.
fn spawn_signal_watcher(coordinator: Arc<CleanupCoordinator>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal");
        shutdown.cancel();
        coordinator.cleanup().await;
        std::process::exit(0);
    });
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut term = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                if let Err(e) = signal::ctrl_c().await {
                    warn!("Unable to listen for shutdown signal: {}", e);
                }
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    if let Err(e) = signal::ctrl_c().await {
        warn!("Unable to listen for shutdown signal: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    TracingService::init(cli.json_logs || config.logging.json)?;

    let definition = FunctionDefinition::load(&cli.function)?;
    info!(
        service = %definition.service.name,
        function = %definition.function.name,
        runtime = %definition.function.runtime,
        "function loaded"
    );

    let metrics = Arc::new(MetricsService::new()?);
    let invoker = Arc::new(Invoker::new(&config.docker.host)?);
    let live = Arc::new(LiveContainers::new());
    let manager = Arc::new(ContainerManager::new(
        invoker,
        live,
        ManagerSettings::from_config(&config),
    ));
    let coordinator = Arc::new(CleanupCoordinator::new(manager.clone()));
    let shutdown = CancellationToken::new();
    spawn_signal_watcher(coordinator.clone(), shutdown.clone());

    match cli.command {
        Commands::Invoke {
            event,
            event_file,
            reuse,
            debug,
        } => {
            let event = read_event(event, event_file)?;
            let context = Arc::new(FunctionContext::new(
                definition,
                config.credentials.clone(),
                debug.options(&config),
            )?);
            let adapter = LocalInvoke::new(manager, context, metrics).with_reuse(reuse);
            let result = adapter
                .invoke(event, Box::new(ConsoleSink), shutdown.child_token())
                .await?;

            let mut stdout = std::io::stdout();
            stdout.write_all(&result.error_body())?;
            writeln!(stdout)?;
            if result.error_type.is_error() {
                bail!("function returned {:?}", result.error_type);
            }
        }
        Commands::Start { debug } => {
            let context = Arc::new(FunctionContext::new(
                definition,
                config.credentials.clone(),
                debug.options(&config),
            )?);
            let server = EventStart::new(manager, context)
                .start(shutdown.child_token())
                .await?;
            server.logs.await?;
            info!(container_id = %server.container.id, "server container exited");
        }
        Commands::Serve {
            http_trigger,
            trigger_prefix,
            auth_type,
            debug,
        } => {
            let service_name = definition.service.name.clone();
            let function_name = definition.function.name.clone();
            let custom = definition.function.runtime.is_custom_container();
            let context = Arc::new(FunctionContext::new(
                definition,
                config.credentials.clone(),
                debug.options(&config),
            )?);

            let adapter: Arc<dyn HttpInvoker> = if custom {
                Arc::new(
                    CustomContainerInvoke::new(manager.clone(), context, metrics.clone())
                        .with_poll_interval(Duration::from_millis(
                            config.invoke.server_poll_interval_ms,
                        ))
                        .with_keep_warm(true),
                )
            } else if http_trigger {
                Arc::new(HttpTriggerInvoke::new(manager.clone(), context, metrics.clone()))
            } else {
                Arc::new(ApiInvoke::new(manager.clone(), context, metrics.clone()))
            };

            let mode = match (http_trigger, trigger_prefix) {
                (true, Some(prefix)) => ServeMode::HttpTrigger { prefix },
                (true, None) => ServeMode::http_trigger(&service_name, &function_name),
                (false, _) => ServeMode::api(&service_name, &function_name),
            };
            let state = AppState::new(adapter, metrics, config.credentials.clone(), mode)
                .with_anonymous(auth_type == AuthType::Anonymous);

            fc_local_api::start_server(
                &config.server.bind,
                config.server.port,
                config.server.max_request_body_size_mb,
                state,
                shutdown.clone(),
            )
            .await?;
        }
    }

    if coordinator.cleanup().await.is_some() {
        info!("stopped containers left running at exit");
    }
    Ok(())
}
