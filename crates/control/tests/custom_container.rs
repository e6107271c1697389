use bytes::Bytes;
use fc_local_control::{
    CustomContainerInvoke, FunctionContext, HttpInvocation, HttpInvoker, InvokeOptions,
};
use fc_local_invoker::{ContainerManager, HostPlatform, LiveContainers, ManagerSettings};
use fc_local_metrics::MetricsService;
use fc_local_models::{CustomContainerConfig, LocalError, PullPolicy, Runtime};
use fc_local_testsupport::{
    sample_credentials, sample_definition, spawn_delayed_server, FakeDocker,
};
use std::sync::Arc;
use std::time::Duration;

fn custom_invoke(
    docker: &FakeDocker,
    port: u16,
    timeout: u64,
    initializer: Option<&str>,
) -> (CustomContainerInvoke, Arc<ContainerManager>, tempfile::TempDir) {
    let code = tempfile::tempdir().unwrap();
    let mut definition = sample_definition(Runtime::CustomContainer, code.path());
    definition.function.ca_port = Some(port);
    definition.function.timeout_seconds = Some(timeout);
    definition.function.initializer = initializer.map(str::to_string);
    definition.function.custom_container = Some(CustomContainerConfig {
        image: "registry/me/app:v1".to_string(),
        command: vec![],
        args: vec![],
    });

    let manager = Arc::new(ContainerManager::new(
        Arc::new(docker.clone()),
        Arc::new(LiveContainers::new()),
        ManagerSettings {
            stop_timeout_secs: 10,
            exec_poll_interval: Duration::from_millis(1),
            pull_policy: PullPolicy::IfMissing,
            platform: HostPlatform::Linux,
            attach_via_logs: false,
        },
    ));
    let context = Arc::new(
        FunctionContext::new(definition, sample_credentials(), InvokeOptions::default()).unwrap(),
    );
    let invoke = CustomContainerInvoke::new(
        manager.clone(),
        context,
        Arc::new(MetricsService::new().unwrap()),
    )
    .with_host("127.0.0.1")
    .with_poll_interval(Duration::from_millis(100));
    (invoke, manager, code)
}

#[tokio::test]
async fn waits_for_a_slow_server_then_initializes_and_invokes() {
    let server = spawn_delayed_server(Duration::from_millis(1200)).await.unwrap();
    let docker = FakeDocker::new();
    let (invoke, manager, _code) = custom_invoke(&docker, server.port, 3, Some("init"));

    let result = invoke.invoke(Bytes::from_static(b"ping")).await.unwrap();

    assert_eq!(result.status_code, Some(201));
    assert_eq!(&result.body[..], b"ping");

    let received = server.received.lock().await.clone();
    let paths: Vec<_> = received.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["/initialize", "/invoke"]);
    let invoke_request = &received[1];
    assert_eq!(
        invoke_request.headers.get("x-fc-function-name").unwrap(),
        "hello"
    );
    assert_eq!(
        invoke_request.headers.get("content-type").unwrap(),
        "application/octet-stream"
    );
    assert!(invoke_request.headers.contains_key("x-fc-request-id"));

    let created = docker.last_created().await;
    assert_eq!(created.image, "registry/me/app:v1");
    assert!(created.user.is_none());
    assert!(manager.live().is_empty());
    assert_eq!(docker.stopped.lock().await.len(), 1);
}

#[tokio::test]
async fn server_that_never_listens_reports_not_ready() {
    let server = spawn_delayed_server(Duration::from_secs(30)).await.unwrap();
    let docker = FakeDocker::new();
    let (invoke, manager, _code) = custom_invoke(&docker, server.port, 1, None);

    let err = invoke.invoke(Bytes::new()).await.unwrap_err();
    assert!(matches!(err, LocalError::ServerNotReady { .. }));
    assert!(manager.live().is_empty());

    let reply = invoke.invoke_http(HttpInvocation::default()).await;
    assert_eq!(reply.status, 500);
    let json: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert!(json["errorMessage"]
        .as_str()
        .unwrap()
        .contains(&format!("127.0.0.1:{}", server.port)));
}
