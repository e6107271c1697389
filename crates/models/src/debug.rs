use crate::{LocalError, PortPublish};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DebugIde {
    #[default]
    VsCode,
    PyCharm,
}

impl fmt::Display for DebugIde {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugIde::VsCode => f.write_str("vscode"),
            DebugIde::PyCharm => f.write_str("pycharm"),
        }
    }
}

impl FromStr for DebugIde {
    type Err = LocalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vscode" => Ok(DebugIde::VsCode),
            "pycharm" => Ok(DebugIde::PyCharm),
            other => Err(LocalError::UnsupportedDebugConfiguration {
                reason: format!("unknown debug ide {other}, expected vscode or pycharm"),
            }),
        }
    }
}

/// What the developer asked for on the command line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DebugSettings {
    pub port: Option<u16>,
    pub ide: Option<DebugIde>,
    pub debugger_path: Option<PathBuf>,
    pub debug_args: Option<String>,
}

impl DebugSettings {
    pub fn is_enabled(&self) -> bool {
        self.port.is_some()
    }

    pub fn ide(&self) -> DebugIde {
        self.ide.unwrap_or_default()
    }
}

/// Attach artifact printed for the developer.
#[derive(Debug, Clone, PartialEq)]
pub enum IdeConfig {
    VsCode(serde_json::Value),
    PyCharm(String),
}

impl fmt::Display for IdeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdeConfig::VsCode(value) => {
                let pretty = serde_json::to_string_pretty(value).map_err(|_| fmt::Error)?;
                f.write_str(&pretty)
            }
            IdeConfig::PyCharm(tips) => f.write_str(tips),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugConfig {
    pub ide: DebugIde,
    pub port: u16,
    pub env: Vec<(String, String)>,
    pub ports: Vec<PortPublish>,
    pub ide_config: IdeConfig,
}
