use dashmap::DashSet;

/// Ids of every container this process created and has not yet seen stop.
///
/// Owned by the entry point and shared by reference with the lifecycle
/// manager and the cleanup coordinator.
#[derive(Debug, Default)]
pub struct LiveContainers {
    ids: DashSet<String>,
}

impl LiveContainers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, container_id: &str) {
        self.ids.insert(container_id.to_string());
    }

    /// Returns whether the id was present.
    pub fn remove(&self, container_id: &str) -> bool {
        self.ids.remove(container_id).is_some()
    }

    pub fn contains(&self, container_id: &str) -> bool {
        self.ids.contains(container_id)
    }

    pub fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.ids.iter().map(|id| id.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
