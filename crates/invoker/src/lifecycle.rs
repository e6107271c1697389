/// Name suffix marking a container whose initializer already ran.
pub const WARM_SUFFIX: &str = "-inited";

/// Whether a named container still has to run its initializer.
///
/// The state lives in the container name so it survives across separate
/// processes; `promote` is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerLifecycle {
    Cold,
    Warm,
}

impl ContainerLifecycle {
    pub fn from_name(name: &str) -> Self {
        if name.ends_with(WARM_SUFFIX) {
            ContainerLifecycle::Warm
        } else {
            ContainerLifecycle::Cold
        }
    }

    pub fn container_name(&self, base: &str) -> String {
        match self {
            ContainerLifecycle::Cold => base.to_string(),
            ContainerLifecycle::Warm => warm_name(base),
        }
    }

    pub fn needs_initializer(&self) -> bool {
        matches!(self, ContainerLifecycle::Cold)
    }
}

pub fn warm_name(base: &str) -> String {
    format!("{base}{WARM_SUFFIX}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningContainer {
    pub id: String,
    pub name: String,
    pub lifecycle: ContainerLifecycle,
}

impl RunningContainer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            lifecycle: ContainerLifecycle::from_name(&name),
            name,
        }
    }

    /// Deterministic name without the warm suffix.
    pub fn base_name(&self) -> &str {
        self.name.strip_suffix(WARM_SUFFIX).unwrap_or(&self.name)
    }
}
