use crate::LocalError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Runtime {
    Nodejs6,
    Nodejs8,
    Nodejs10,
    Nodejs12,
    Python27,
    Python3,
    Java8,
    Java11,
    Php72,
    Dotnetcore21,
    Custom,
    CustomContainer,
}

impl Runtime {
    pub const ALL: [Runtime; 12] = [
        Runtime::Nodejs6,
        Runtime::Nodejs8,
        Runtime::Nodejs10,
        Runtime::Nodejs12,
        Runtime::Python27,
        Runtime::Python3,
        Runtime::Java8,
        Runtime::Java11,
        Runtime::Php72,
        Runtime::Dotnetcore21,
        Runtime::Custom,
        Runtime::CustomContainer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Nodejs6 => "nodejs6",
            Runtime::Nodejs8 => "nodejs8",
            Runtime::Nodejs10 => "nodejs10",
            Runtime::Nodejs12 => "nodejs12",
            Runtime::Python27 => "python2.7",
            Runtime::Python3 => "python3",
            Runtime::Java8 => "java8",
            Runtime::Java11 => "java11",
            Runtime::Php72 => "php7.2",
            Runtime::Dotnetcore21 => "dotnetcore2.1",
            Runtime::Custom => "custom",
            Runtime::CustomContainer => "custom-container",
        }
    }

    pub fn is_custom_container(&self) -> bool {
        matches!(self, Runtime::CustomContainer)
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Runtime {
    type Err = LocalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Runtime::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| LocalError::InvalidRuntime {
                runtime: s.to_string(),
            })
    }
}

impl TryFrom<String> for Runtime {
    type Error = LocalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Runtime> for String {
    fn from(value: Runtime) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CustomContainerConfig {
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Immutable description of one function, as produced by the build step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FunctionSpec {
    pub name: String,
    pub runtime: Runtime,
    #[serde(default)]
    pub handler: String,
    pub initializer: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub initialization_timeout_seconds: Option<u64>,
    pub memory_mb: Option<u64>,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
    /// Resolved code artifact, a directory or a single file.
    pub code_uri: PathBuf,
    pub ca_port: Option<u16>,
    pub custom_container: Option<CustomContainerConfig>,
}

pub const DEFAULT_MEMORY_MB: u64 = 128;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 3;
pub const DEFAULT_INITIALIZATION_TIMEOUT_SECONDS: u64 = 3;
pub const DEFAULT_CA_PORT: u16 = 9000;

impl FunctionSpec {
    pub fn memory_mb(&self) -> u64 {
        self.memory_mb.unwrap_or(DEFAULT_MEMORY_MB)
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS)
    }

    pub fn initialization_timeout_seconds(&self) -> u64 {
        self.initialization_timeout_seconds
            .unwrap_or(DEFAULT_INITIALIZATION_TIMEOUT_SECONDS)
    }

    pub fn ca_port(&self) -> u16 {
        self.ca_port.unwrap_or(DEFAULT_CA_PORT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NasMountPoint {
    /// Host directory staged as the NAS mock.
    pub local_dir: PathBuf,
    pub mount_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NasConfig {
    #[serde(default = "unset_id")]
    pub user_id: i64,
    #[serde(default = "unset_id")]
    pub group_id: i64,
    #[serde(default)]
    pub mount_points: Vec<NasMountPoint>,
}

fn unset_id() -> i64 {
    -1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    pub name: String,
    pub log_project: Option<String>,
    pub log_store: Option<String>,
    pub nas: Option<NasConfig>,
}

/// A function together with the service it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FunctionDefinition {
    pub service: ServiceSpec,
    pub function: FunctionSpec,
}
