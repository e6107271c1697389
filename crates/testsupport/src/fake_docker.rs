use async_trait::async_trait;
use bytes::Bytes;
use fc_local_framing::{output_channel, OutputStreams, OutputWriters};
use fc_local_invoker::{ContainerSummary, CreateSpec, DockerLike, ExecSession, ExecSpec, ExecState};
use fc_local_models::ExitStatus;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Output and exit status a fake process produces.
#[derive(Clone, Debug, Default)]
pub struct ScriptedProcess {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i64,
    pub oom_killed: bool,
    /// Emitted output is split into chunks of this size.
    pub chunk_size: usize,
}

impl ScriptedProcess {
    pub fn stdout(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            chunk_size: 16,
            ..Default::default()
        }
    }

    pub fn exit(code: i64) -> Self {
        Self {
            exit_code: code,
            chunk_size: 16,
            ..Default::default()
        }
    }

    pub fn with_stderr(mut self, stderr: impl Into<Vec<u8>>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = code;
        self
    }

    fn emit(self, writers: OutputWriters) {
        let chunk = self.chunk_size.max(1);
        tokio::spawn(async move {
            for piece in self.stdout.chunks(chunk) {
                if writers.stdout.send(Bytes::copy_from_slice(piece)).await.is_err() {
                    return;
                }
            }
            if !self.stderr.is_empty() {
                let _ = writers.stderr.send(Bytes::from(self.stderr)).await;
            }
        });
    }
}

#[derive(Clone, Debug)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub running: bool,
    pub spec: CreateSpec,
}

#[derive(Clone, Default)]
pub struct FakeDocker {
    pub created: Arc<Mutex<Vec<CreateSpec>>>,
    pub started: Arc<Mutex<Vec<String>>>,
    pub stopped: Arc<Mutex<Vec<(String, u64)>>>,
    pub killed: Arc<Mutex<Vec<String>>>,
    pub removed: Arc<Mutex<Vec<(String, bool)>>>,
    pub renamed: Arc<Mutex<Vec<(String, String)>>>,
    pub execs: Arc<Mutex<Vec<(String, ExecSpec)>>>,
    pub stdin: Arc<Mutex<Vec<(String, Bytes)>>>,
    pub pulled: Arc<Mutex<Vec<String>>>,
    pub images: Arc<Mutex<HashSet<String>>>,
    pub containers: Arc<Mutex<BTreeMap<String, FakeContainer>>>,
    pub runs: Arc<Mutex<VecDeque<ScriptedProcess>>>,
    pub exec_scripts: Arc<Mutex<VecDeque<ScriptedProcess>>>,
    pub exit_status: Arc<Mutex<HashMap<String, ExitStatus>>>,
    pub exec_results: Arc<Mutex<HashMap<String, (i64, String)>>>,
    pub create_error: Arc<Mutex<Option<String>>>,
    pub failing_stops: Arc<Mutex<HashSet<String>>>,
    pub stop_delay: Arc<Mutex<Option<Duration>>>,
    pub start_error: Arc<Mutex<Option<String>>>,
    /// Waits report the container as already gone.
    pub lose_exits: Arc<Mutex<bool>>,
    /// `wait <id>` and `start <id>` in the order the engine saw them.
    pub calls: Arc<Mutex<Vec<String>>>,
    pub next_id: Arc<Mutex<u64>>,
}

impl FakeDocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn last_created(&self) -> CreateSpec {
        self.created
            .lock()
            .await
            .last()
            .cloned()
            .expect("no create")
    }

    pub async fn script_run(&self, process: ScriptedProcess) {
        self.runs.lock().await.push_back(process);
    }

    pub async fn script_exec(&self, process: ScriptedProcess) {
        self.exec_scripts.lock().await.push_back(process);
    }

    pub async fn add_image(&self, image: &str) {
        self.images.lock().await.insert(image.to_string());
    }

    pub async fn fail_stop(&self, container_id: &str) {
        self.failing_stops.lock().await.insert(container_id.to_string());
    }

    pub async fn set_create_error(&self, message: &str) {
        *self.create_error.lock().await = Some(message.to_string());
    }

    pub async fn set_stop_delay(&self, delay: Duration) {
        *self.stop_delay.lock().await = Some(delay);
    }

    pub async fn set_start_error(&self, message: &str) {
        *self.start_error.lock().await = Some(message.to_string());
    }

    pub async fn lose_exits(&self) {
        *self.lose_exits.lock().await = true;
    }

    /// A stopped container that was not auto-removed.
    pub async fn add_exited(&self, name: &str) -> String {
        let id = self.add_running(name).await;
        if let Some(c) = self.containers.lock().await.get_mut(&id) {
            c.running = false;
        }
        id
    }

    /// A running container created outside the code under test.
    pub async fn add_running(&self, name: &str) -> String {
        let id = self.allocate_id().await;
        self.containers.lock().await.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                name: name.to_string(),
                running: true,
                spec: CreateSpec {
                    name: name.to_string(),
                    ..Default::default()
                },
            },
        );
        id
    }

    pub async fn running_ids(&self) -> Vec<String> {
        self.containers
            .lock()
            .await
            .values()
            .filter(|c| c.running)
            .map(|c| c.id.clone())
            .collect()
    }

    pub async fn container_name(&self, container_id: &str) -> Option<String> {
        self.containers
            .lock()
            .await
            .get(container_id)
            .map(|c| c.name.clone())
    }

    async fn allocate_id(&self) -> String {
        let mut id = self.next_id.lock().await;
        *id += 1;
        format!("ctr-{}", *id)
    }

    async fn exit_container(&self, container_id: &str) {
        let mut containers = self.containers.lock().await;
        let auto_remove = containers
            .get(container_id)
            .map(|c| c.spec.auto_remove)
            .unwrap_or(false);
        if auto_remove {
            containers.remove(container_id);
        } else if let Some(c) = containers.get_mut(container_id) {
            c.running = false;
        }
    }
}

#[async_trait]
impl DockerLike for FakeDocker {
    async fn create(&self, spec: CreateSpec) -> anyhow::Result<String> {
        if let Some(message) = self.create_error.lock().await.clone() {
            anyhow::bail!(message);
        }
        self.created.lock().await.push(spec.clone());
        let id = self.allocate_id().await;
        self.containers.lock().await.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                name: spec.name.clone(),
                running: false,
                spec,
            },
        );
        Ok(id)
    }

    async fn start(&self, container_id: &str) -> anyhow::Result<()> {
        self.calls.lock().await.push(format!("start {container_id}"));
        if let Some(message) = self.start_error.lock().await.clone() {
            anyhow::bail!(message);
        }
        self.started.lock().await.push(container_id.to_string());
        match self.containers.lock().await.get_mut(container_id) {
            Some(c) => {
                c.running = true;
                Ok(())
            }
            None => anyhow::bail!("No such container: {container_id}"),
        }
    }

    async fn attach(&self, container_id: &str, stdin: Option<Bytes>) -> anyhow::Result<OutputStreams> {
        if let Some(event) = stdin {
            self.stdin
                .lock()
                .await
                .push((container_id.to_string(), event));
        }
        let process = self.runs.lock().await.pop_front().unwrap_or_else(|| ScriptedProcess::exit(0));
        self.exit_status.lock().await.insert(
            container_id.to_string(),
            ExitStatus {
                code: process.exit_code,
                oom_killed: process.oom_killed,
            },
        );
        let (writers, streams) = output_channel(8);
        process.emit(writers);
        Ok(streams)
    }

    async fn logs(&self, _container_id: &str, _since: i64) -> anyhow::Result<OutputStreams> {
        Ok(OutputStreams::closed())
    }

    async fn wait(&self, container_id: &str) -> anyhow::Result<ExitStatus> {
        self.calls.lock().await.push(format!("wait {container_id}"));
        // a run is over once it has been started and its output emitted
        loop {
            let started = self.started.lock().await.iter().any(|id| id == container_id);
            if started {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        if *self.lose_exits.lock().await {
            self.exit_container(container_id).await;
            anyhow::bail!("No such container: {container_id}");
        }
        let status = self
            .exit_status
            .lock()
            .await
            .get(container_id)
            .copied()
            .unwrap_or_default();
        self.exit_container(container_id).await;
        Ok(status)
    }

    async fn exec(&self, container_id: &str, spec: ExecSpec) -> anyhow::Result<ExecSession> {
        let running = self
            .containers
            .lock()
            .await
            .get(container_id)
            .map(|c| c.running)
            .unwrap_or(false);
        if !running {
            anyhow::bail!("container {container_id} is not running");
        }

        let entrypoint = spec.cmd.first().cloned().unwrap_or_default();
        self.execs
            .lock()
            .await
            .push((container_id.to_string(), spec));

        let process = self
            .exec_scripts
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| ScriptedProcess::exit(0));
        let exec_id = format!("exec-{}", self.execs.lock().await.len());
        self.exec_results
            .lock()
            .await
            .insert(exec_id.clone(), (process.exit_code, entrypoint));
        if process.oom_killed || process.exit_code == 137 {
            self.exit_container(container_id).await;
        }

        let (writers, streams) = output_channel(8);
        process.emit(writers);
        Ok(ExecSession {
            exec_id,
            output: streams,
        })
    }

    async fn inspect_exec(&self, exec_id: &str) -> anyhow::Result<ExecState> {
        let results = self.exec_results.lock().await;
        let (code, entrypoint) = results
            .get(exec_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No such exec instance: {exec_id}"))?;
        Ok(ExecState {
            running: false,
            exit_code: Some(code),
            entrypoint,
        })
    }

    async fn stop(&self, container_id: &str, timeout_secs: u64) -> anyhow::Result<()> {
        self.stopped
            .lock()
            .await
            .push((container_id.to_string(), timeout_secs));
        if let Some(delay) = *self.stop_delay.lock().await {
            tokio::time::sleep(delay).await;
        }
        if self.failing_stops.lock().await.contains(container_id) {
            anyhow::bail!("cannot stop container {container_id}: permission denied");
        }
        let running = self
            .containers
            .lock()
            .await
            .get(container_id)
            .map(|c| c.running);
        match running {
            None => anyhow::bail!("No such container: {container_id}"),
            Some(false) => anyhow::bail!("container {container_id} is not running"),
            Some(true) => {
                self.exit_container(container_id).await;
                Ok(())
            }
        }
    }

    async fn kill(&self, container_id: &str) -> anyhow::Result<()> {
        self.killed.lock().await.push(container_id.to_string());
        if self.containers.lock().await.contains_key(container_id) {
            self.exit_container(container_id).await;
            Ok(())
        } else {
            anyhow::bail!("No such container: {container_id}")
        }
    }

    async fn remove(&self, container_id: &str, force: bool) -> anyhow::Result<()> {
        self.removed
            .lock()
            .await
            .push((container_id.to_string(), force));
        self.containers.lock().await.remove(container_id);
        Ok(())
    }

    async fn list_by_name(&self, name: &str) -> anyhow::Result<Vec<ContainerSummary>> {
        Ok(self
            .containers
            .lock()
            .await
            .values()
            .filter(|c| c.name == name)
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                state: Some(if c.running { "running" } else { "exited" }.to_string()),
            })
            .collect())
    }

    async fn rename(&self, container_id: &str, new_name: &str) -> anyhow::Result<()> {
        self.renamed
            .lock()
            .await
            .push((container_id.to_string(), new_name.to_string()));
        match self.containers.lock().await.get_mut(container_id) {
            Some(c) => {
                c.name = new_name.to_string();
                Ok(())
            }
            None => anyhow::bail!("No such container: {container_id}"),
        }
    }

    async fn image_exists(&self, image: &str) -> anyhow::Result<bool> {
        Ok(self.images.lock().await.contains(image))
    }

    async fn pull_image(&self, image: &str) -> anyhow::Result<()> {
        self.pulled.lock().await.push(image.to_string());
        self.images.lock().await.insert(image.to_string());
        Ok(())
    }
}
