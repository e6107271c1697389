use fc_local_models::{DebugIde, IdeConfig, LocalError, PortPublish, Runtime};
use fc_local_runtimes::{resolve_debug, IdeContext};

fn ctx(port: u16) -> IdeContext {
    IdeContext {
        service_name: "svc".into(),
        function_name: "fn".into(),
        code_dir: "/home/dev/project/code".into(),
        port,
        host_ip: "192.168.1.20".into(),
    }
}

const DEBUGGABLE: [Runtime; 9] = [
    Runtime::Nodejs6,
    Runtime::Nodejs8,
    Runtime::Nodejs10,
    Runtime::Nodejs12,
    Runtime::Python27,
    Runtime::Python3,
    Runtime::Java8,
    Runtime::Php72,
    Runtime::Dotnetcore21,
];

#[test]
fn vscode_is_supported_for_all_debuggable_runtimes() {
    for runtime in DEBUGGABLE {
        let cfg = resolve_debug(runtime, DebugIde::VsCode, &ctx(9229)).unwrap();
        assert!(!cfg.env.is_empty(), "{runtime} env");
        match &cfg.ide_config {
            IdeConfig::VsCode(value) => {
                assert_eq!(value["version"], "0.2.0");
                assert_eq!(value["configurations"][0]["name"], "fc/svc/fn");
            }
            other => panic!("unexpected config {other:?}"),
        }
    }
}

#[test]
fn unsupported_runtimes_fail_fast() {
    for runtime in [Runtime::Java11, Runtime::Custom, Runtime::CustomContainer] {
        let err = resolve_debug(runtime, DebugIde::VsCode, &ctx(9000)).unwrap_err();
        assert!(matches!(err, LocalError::UnsupportedDebugConfiguration { .. }));
    }
}

#[test]
fn pycharm_is_restricted_to_python() {
    for runtime in DEBUGGABLE {
        let res = resolve_debug(runtime, DebugIde::PyCharm, &ctx(5678));
        match runtime {
            Runtime::Python27 | Runtime::Python3 => {
                let cfg = res.unwrap();
                assert!(cfg.env.is_empty());
                assert!(cfg.ports.is_empty());
                match cfg.ide_config {
                    IdeConfig::PyCharm(tips) => {
                        assert!(tips.contains("pydevd.settrace('192.168.1.20', port=5678"));
                        assert!(tips.contains("/home/dev/project/code=/code"));
                    }
                    other => panic!("unexpected config {other:?}"),
                }
            }
            _ => {
                let err = res.unwrap_err();
                assert_eq!(
                    err.to_string(),
                    "pycharm debug config only support for runtime [python2.7, python3]"
                );
            }
        }
    }
}

#[test]
fn node_env_depends_on_version() {
    let old = resolve_debug(Runtime::Nodejs6, DebugIde::VsCode, &ctx(9229)).unwrap();
    assert_eq!(old.env, vec![("DEBUG_OPTIONS".into(), "--debug-brk=9229".into())]);

    let new = resolve_debug(Runtime::Nodejs12, DebugIde::VsCode, &ctx(9229)).unwrap();
    assert_eq!(
        new.env,
        vec![("DEBUG_OPTIONS".into(), "--inspect-brk=0.0.0.0:9229".into())]
    );
    assert_eq!(new.ports, vec![PortPublish::same(9229)]);
    match new.ide_config {
        IdeConfig::VsCode(v) => assert_eq!(v["configurations"][0]["protocol"], "inspector"),
        other => panic!("unexpected config {other:?}"),
    }
}

#[test]
fn php_publishes_nothing_and_points_xdebug_home() {
    let cfg = resolve_debug(Runtime::Php72, DebugIde::VsCode, &ctx(9000)).unwrap();
    assert!(cfg.ports.is_empty());
    assert_eq!(
        cfg.env,
        vec![(
            "XDEBUG_CONFIG".into(),
            "remote_enable=1 remote_autostart=1 remote_port=9000 remote_host=192.168.1.20".into()
        )]
    );
}

#[test]
fn dotnet_uses_pipe_transport() {
    let cfg = resolve_debug(Runtime::Dotnetcore21, DebugIde::VsCode, &ctx(5005)).unwrap();
    let IdeConfig::VsCode(value) = cfg.ide_config else {
        panic!("expected vscode config");
    };
    let conf = &value["configurations"][0];
    assert_eq!(conf["type"], "coreclr");
    assert_eq!(
        conf["pipeTransport"]["pipeArgs"][1],
        "docker exec -i $(docker ps -q -f publish=5005) ${debuggerCommand}"
    );
    assert_eq!(conf["windows"]["pipeTransport"]["pipeProgram"], "powershell");
    assert_eq!(conf["sourceFileMap"]["/code"], "/home/dev/project/code");
}
