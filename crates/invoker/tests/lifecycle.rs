use bytes::Bytes;
use fc_local_framing::{FramingDecoder, NullSink};
use fc_local_invoker::{
    ContainerLifecycle, ContainerManager, CreateSpec, ExecSpec, HostPlatform, LiveContainers,
    ManagerSettings,
};
use fc_local_models::{ErrorType, LocalError, PullPolicy};
use fc_local_testsupport::{response_envelope, FakeDocker, ScriptedProcess};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn settings(pull_policy: PullPolicy) -> ManagerSettings {
    ManagerSettings {
        stop_timeout_secs: 10,
        exec_poll_interval: Duration::from_millis(1),
        pull_policy,
        platform: HostPlatform::Linux,
        attach_via_logs: false,
    }
}

fn manager(docker: &FakeDocker) -> ContainerManager {
    ContainerManager::new(
        Arc::new(docker.clone()),
        Arc::new(LiveContainers::new()),
        settings(PullPolicy::IfMissing),
    )
}

fn decoder() -> FramingDecoder {
    FramingDecoder::new(Box::new(NullSink))
}

#[tokio::test]
async fn one_shot_run_writes_event_and_decodes_output() {
    let docker = FakeDocker::new();
    docker
        .script_run(ScriptedProcess::stdout(response_envelope(200, &[], b"hello", "req-1")))
        .await;
    let manager = manager(&docker);

    let spec = CreateSpec {
        name: "fun_local_1_abcdefg".into(),
        open_stdin: true,
        ..Default::default()
    };
    let outcome = manager
        .run(spec, Bytes::from_static(b"{\"key\":1}"), decoder(), CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.check_exit().is_ok());
    let result = outcome.into_result().unwrap();
    assert_eq!(&result.body[..], b"hello");
    assert_eq!(result.request_id.as_deref(), Some("req-1"));
    assert_eq!(result.error_type, ErrorType::None);

    let stdin = docker.stdin.lock().await.clone();
    assert_eq!(stdin.len(), 1);
    assert_eq!(&stdin[0].1[..], b"{\"key\":1}");
    assert!(manager.live().is_empty());
}

#[tokio::test]
async fn one_shot_run_killed_is_signal_killed() {
    let docker = FakeDocker::new();
    docker.script_run(ScriptedProcess::exit(137)).await;
    let manager = manager(&docker);

    let outcome = manager
        .run(CreateSpec::default(), Bytes::new(), decoder(), CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(
        outcome.into_result(),
        Err(LocalError::SignalKilled { code: 137, .. })
    ));
}

#[tokio::test]
async fn non_zero_exit_without_framing_names_entrypoint() {
    let docker = FakeDocker::new();
    docker.script_run(ScriptedProcess::exit(2)).await;
    let manager = manager(&docker);

    let spec = CreateSpec {
        name: "fun_local_2_zzzzzzz".into(),
        ..Default::default()
    };
    let outcome = manager
        .run(spec, Bytes::new(), decoder(), CancellationToken::new())
        .await
        .unwrap();
    let err = outcome.into_result().unwrap_err();
    assert_eq!(err.to_string(), "fun_local_2_zzzzzzz exited with code 2");
}

#[tokio::test]
async fn stop_is_idempotent() {
    let docker = FakeDocker::new();
    let manager = manager(&docker);

    let container = manager.start_server(CreateSpec::default()).await.unwrap();
    assert!(manager.live().contains(&container.id));

    manager.stop(&container.id).await.unwrap();
    manager.stop(&container.id).await.unwrap();
    manager.stop("never-created").await.unwrap();

    assert!(manager.live().is_empty());
    assert_eq!(docker.stopped.lock().await.len(), 3);
}

#[tokio::test]
async fn failed_stop_still_leaves_live_set() {
    let docker = FakeDocker::new();
    let manager = manager(&docker);

    let container = manager.start_server(CreateSpec::default()).await.unwrap();
    docker.fail_stop(&container.id).await;

    assert!(matches!(
        manager.stop(&container.id).await,
        Err(LocalError::DockerError { .. })
    ));
    assert!(!manager.live().contains(&container.id));
}

#[tokio::test]
async fn warm_discovery_prefers_inited_and_promote_renames() {
    let docker = FakeDocker::new();
    let manager = manager(&docker);

    assert!(manager.find_warm("fun-local-svc-fn-run").await.unwrap().is_none());

    let cold_id = docker.add_running("fun-local-svc-fn-run").await;
    let mut found = manager.find_warm("fun-local-svc-fn-run").await.unwrap().unwrap();
    assert_eq!(found.id, cold_id);
    assert_eq!(found.lifecycle, ContainerLifecycle::Cold);

    manager.promote(&mut found).await.unwrap();
    assert_eq!(found.lifecycle, ContainerLifecycle::Warm);
    assert_eq!(found.name, "fun-local-svc-fn-run-inited");
    assert_eq!(
        docker.container_name(&cold_id).await.as_deref(),
        Some("fun-local-svc-fn-run-inited")
    );

    // promoting twice is a no-op
    manager.promote(&mut found).await.unwrap();
    assert_eq!(docker.renamed.lock().await.len(), 1);

    let again = manager.find_warm("fun-local-svc-fn-run").await.unwrap().unwrap();
    assert_eq!(again.id, cold_id);
    assert_eq!(again.lifecycle, ContainerLifecycle::Warm);
}

#[tokio::test]
async fn exec_passes_env_and_reports_exit() {
    let docker = FakeDocker::new();
    let manager = manager(&docker);
    let container = manager.start_server(CreateSpec::default()).await.unwrap();

    docker
        .script_exec(ScriptedProcess::stdout(response_envelope(200, &[], b"pong", "req-2")))
        .await;
    let outcome = manager
        .exec(
            &container.id,
            ExecSpec {
                cmd: vec!["/var/fc/runtime/nodejs10/mock".into(), "--stdin".into()],
                env: vec![("FC_HTTP_PARAMS".into(), "e30=".into())],
                stdin: Some(Bytes::from_static(b"ping")),
                working_dir: None,
            },
            decoder(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.entrypoint, "/var/fc/runtime/nodejs10/mock");
    assert_eq!(&outcome.into_result().unwrap().body[..], b"pong");

    let execs = docker.execs.lock().await.clone();
    assert_eq!(execs[0].1.env[0].0, "FC_HTTP_PARAMS");
    assert_eq!(execs[0].1.stdin.as_deref(), Some(&b"ping"[..]));
}

#[tokio::test]
async fn image_policy() {
    let docker = FakeDocker::new();
    let never = ContainerManager::new(
        Arc::new(docker.clone()),
        Arc::new(LiveContainers::new()),
        settings(PullPolicy::Never),
    );
    assert!(matches!(
        never.ensure_image("aliyunfc/runtime-nodejs10:1.9.13").await,
        Err(LocalError::ImageNotFound { .. })
    ));

    let if_missing = manager(&docker);
    if_missing.ensure_image("aliyunfc/runtime-nodejs10:1.9.13").await.unwrap();
    if_missing.ensure_image("aliyunfc/runtime-nodejs10:1.9.13").await.unwrap();
    assert_eq!(docker.pulled.lock().await.len(), 1);

    never.ensure_image("aliyunfc/runtime-nodejs10:1.9.13").await.unwrap();
}

#[tokio::test]
async fn create_errors_are_translated_and_not_tracked() {
    let docker = FakeDocker::new();
    docker
        .set_create_error("Error response from daemon: invalid mount config for type \"bind\"")
        .await;
    let manager = manager(&docker);

    let err = manager.create(CreateSpec::default()).await.unwrap_err();
    assert!(matches!(err, LocalError::ContainerCreation { .. }));
    assert!(err.to_string().contains("C:\\Users"));
    assert!(manager.live().is_empty());
}

#[tokio::test]
async fn exit_wait_is_registered_before_start() {
    let docker = FakeDocker::new();
    docker
        .script_run(ScriptedProcess::stdout(response_envelope(200, &[], b"fast", "req-1")))
        .await;
    let manager = manager(&docker);

    let outcome = manager
        .run(CreateSpec::default(), Bytes::new(), decoder(), CancellationToken::new())
        .await
        .unwrap();

    let id = outcome.container_id.clone();
    assert_eq!(
        docker.calls.lock().await.clone(),
        vec![format!("wait {id}"), format!("start {id}")]
    );
}

#[tokio::test]
async fn container_removed_before_its_exit_is_seen_still_decodes() {
    let docker = FakeDocker::new();
    docker
        .script_run(ScriptedProcess::stdout(response_envelope(200, &[], b"gone", "req-1")))
        .await;
    docker.lose_exits().await;
    let manager = manager(&docker);

    let outcome = manager
        .run(CreateSpec::default(), Bytes::new(), decoder(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.exit.code, 0);
    assert_eq!(&outcome.into_result().unwrap().body[..], b"gone");
}

#[tokio::test]
async fn failed_start_removes_the_created_container() {
    let docker = FakeDocker::new();
    docker.set_start_error("driver failed programming external connectivity").await;
    let manager = manager(&docker);

    let err = manager
        .run(CreateSpec::default(), Bytes::new(), decoder(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LocalError::DockerError { .. }));

    let err = manager.start_server(CreateSpec::default()).await.unwrap_err();
    assert!(matches!(err, LocalError::DockerError { .. }));

    let removed = docker.removed.lock().await.clone();
    assert_eq!(
        removed,
        vec![("ctr-1".to_string(), true), ("ctr-2".to_string(), true)]
    );
    assert!(docker.containers.lock().await.is_empty());
    assert!(manager.live().is_empty());
}

#[tokio::test]
async fn exited_containers_are_not_reused() {
    let docker = FakeDocker::new();
    let manager = manager(&docker);

    docker.add_exited("fun-local-svc-fn-run-inited").await;
    assert!(manager.find_warm("fun-local-svc-fn-run").await.unwrap().is_none());

    let running = docker.add_running("fun-local-svc-fn-run").await;
    let found = manager.find_warm("fun-local-svc-fn-run").await.unwrap().unwrap();
    assert_eq!(found.id, running);
    assert_eq!(found.lifecycle, ContainerLifecycle::Cold);
}
