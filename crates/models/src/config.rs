use crate::{FunctionDefinition, LocalError};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "fc-local.toml";
pub const DEFAULT_IMAGE_VERSION: &str = "1.9.13";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub docker: DockerConfig,
    pub credentials: Credentials,
    pub invoke: InvokeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub max_request_body_size_mb: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PullPolicy {
    IfMissing,
    Always,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DockerConfig {
    pub host: String,
    pub image_version: String,
    pub pull_policy: PullPolicy,
}

/// Local profile. Feeds runtime env vars and request signing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    pub account_id: String,
    pub region: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub security_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InvokeConfig {
    pub stop_timeout_secs: u64,
    pub exec_poll_interval_ms: u64,
    pub server_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1".to_string(),
                port: 8000,
                max_request_body_size_mb: 6,
            },
            docker: DockerConfig {
                host: "".to_string(),
                image_version: DEFAULT_IMAGE_VERSION.to_string(),
                pull_policy: PullPolicy::IfMissing,
            },
            credentials: Credentials::default(),
            invoke: InvokeConfig {
                stop_timeout_secs: 10,
                exec_poll_interval_ms: 100,
                server_poll_interval_ms: 500,
            },
            logging: LoggingConfig { json: false },
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (when present), then `FC_LOCAL_*` and profile env vars.
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("FC_LOCAL_").split("__"))
            .merge(
                Env::raw()
                    .only(&[
                        "FC_ACCESS_KEY_ID",
                        "FC_ACCESS_KEY_SECRET",
                        "FC_SECURITY_TOKEN",
                        "FC_ACCOUNT_ID",
                        "FC_REGION",
                    ])
                    .map(|key| {
                        let field = key.as_str()[3..].to_ascii_lowercase();
                        format!("credentials.{field}").into()
                    }),
            )
            .merge(
                Env::raw()
                    .only(&["FC_DOCKER_VERSION"])
                    .map(|_| "docker.image_version".into()),
            )
    }

    pub fn load(path: Option<&Path>) -> Result<Self, LocalError> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(LocalError::ConfigError {
                    reason: format!("config file {} does not exist", path.display()),
                });
            }
        }
        Self::figment(path)
            .extract()
            .map_err(|e| LocalError::ConfigError {
                reason: e.to_string(),
            })
    }
}

impl FunctionDefinition {
    pub fn load(path: &Path) -> Result<Self, LocalError> {
        if !path.exists() {
            return Err(LocalError::ConfigError {
                reason: format!("function definition {} does not exist", path.display()),
            });
        }
        Figment::from(Toml::file(path))
            .extract()
            .map_err(|e| LocalError::ConfigError {
                reason: format!("invalid function definition {}: {e}", path.display()),
            })
    }
}
