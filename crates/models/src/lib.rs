pub mod config;
pub mod debug;
pub mod docker;
pub mod error;
pub mod function;
pub mod invoke;

pub use config::*;
pub use debug::*;
pub use docker::*;
pub use error::*;
pub use function::*;
pub use invoke::*;

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn runtime_round_trips_through_strings() {
        for runtime in Runtime::ALL {
            let parsed: Runtime = runtime.as_str().parse().unwrap();
            assert_eq!(parsed, runtime);
        }
        assert!(matches!(
            "go1".parse::<Runtime>(),
            Err(LocalError::InvalidRuntime { .. })
        ));
    }

    #[test]
    fn function_definition_deserializes_from_toml() {
        let def: FunctionDefinition = toml::from_str(
            r#"
            [service]
            name = "demo"

            [function]
            name = "hello"
            runtime = "python3"
            handler = "index.handler"
            initializer = "index.init"
            code_uri = "/tmp/code"

            [function.environment_variables]
            B = "2"
            A = "1"
            "#,
        )
        .unwrap();

        assert_eq!(def.function.runtime, Runtime::Python3);
        assert_eq!(def.function.memory_mb(), 128);
        assert_eq!(def.function.timeout_seconds(), 3);
        let keys: Vec<_> = def.function.environment_variables.keys().cloned().collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn unknown_runtime_is_rejected_at_load() {
        let res = toml::from_str::<FunctionSpec>(
            r#"
            name = "hello"
            runtime = "cobol"
            code_uri = "/tmp/code"
            "#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn config_layers_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "fc-local.toml",
                r#"
                [server]
                port = 9100

                [credentials]
                access_key_id = "from-file"
                "#,
            )?;
            jail.set_env("FC_LOCAL_INVOKE__STOP_TIMEOUT_SECS", "2");
            jail.set_env("FC_ACCESS_KEY_SECRET", "secret");
            jail.set_env("FC_DOCKER_VERSION", "1.10.0");

            let config: Config = Config::figment(None).extract()?;
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.server.bind, "127.0.0.1");
            assert_eq!(config.invoke.stop_timeout_secs, 2);
            assert_eq!(config.credentials.access_key_id, "from-file");
            assert_eq!(config.credentials.access_key_secret, "secret");
            assert_eq!(config.docker.image_version, "1.10.0");
            Ok(())
        });
    }

    #[test]
    fn exit_status_distinguishes_kills() {
        let killed = ExitStatus {
            code: 137,
            oom_killed: false,
        };
        assert!(matches!(
            killed.into_result("mock"),
            Err(LocalError::SignalKilled { code: 137, .. })
        ));

        let oom = ExitStatus {
            code: 1,
            oom_killed: true,
        };
        assert_eq!(oom.into_result("mock").unwrap_err().class(), ErrorClass::SignalKilled);

        let failed = ExitStatus {
            code: 2,
            oom_killed: false,
        };
        let err = failed.into_result("/var/fc/runtime/python3/mock").unwrap_err();
        assert_eq!(err.to_string(), "/var/fc/runtime/python3/mock exited with code 2");
        assert_eq!(err.class(), ErrorClass::ProcessCrash);

        assert!(ExitStatus::default().into_result("mock").is_ok());
    }

    #[test]
    fn error_shape_has_no_stack() {
        let err = LocalError::ProcessCrash {
            reason: "boom".into(),
        };
        let json = serde_json::to_value(err.to_error_shape()).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 1);
        assert!(json["errorMessage"].as_str().unwrap().contains("boom"));
    }
}
