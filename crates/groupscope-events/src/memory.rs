use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::{Environment, Group, StoredEvent};
use crate::primary::RowPredicate;
use crate::repo::EventRowStore;

/// Serialized contents of a [`MemoryRowStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowSnapshot {
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default)]
    pub events: Vec<StoredEvent>,
}

#[derive(Debug, Default)]
struct MemoryState {
    groups: HashMap<u64, Group>,
    environments: HashMap<(u64, String), Environment>,
    events: Vec<StoredEvent>,
}

/// In-process row store.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    state: RwLock<MemoryState>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: RowSnapshot) -> Self {
        let mut state = MemoryState::default();
        for group in snapshot.groups {
            state.groups.insert(group.id, group);
        }
        for environment in snapshot.environments {
            state
                .environments
                .insert((environment.project_id, environment.name.clone()), environment);
        }
        state.events = snapshot.events;

        Self {
            state: RwLock::new(state),
        }
    }

    pub fn load_snapshot(path: impl AsRef<Path>) -> AnyResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read row snapshot {}", path.display()))?;
        let snapshot: RowSnapshot = serde_json::from_str(&raw)
            .with_context(|| format!("invalid row snapshot {}", path.display()))?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub async fn insert_group(&self, group: Group) {
        self.state.write().await.groups.insert(group.id, group);
    }

    pub async fn insert_environment(&self, environment: Environment) {
        self.state
            .write()
            .await
            .environments
            .insert((environment.project_id, environment.name.clone()), environment);
    }

    pub async fn insert_event(&self, event: StoredEvent) {
        self.state.write().await.events.push(event);
    }
}

#[async_trait]
impl EventRowStore for MemoryRowStore {
    async fn get_group(&self, group_id: u64) -> AnyResult<Option<Group>> {
        Ok(self.state.read().await.groups.get(&group_id).cloned())
    }

    async fn get_environment(
        &self,
        project_id: u64,
        name: &str,
    ) -> AnyResult<Option<Environment>> {
        Ok(self
            .state
            .read()
            .await
            .environments
            .get(&(project_id, name.to_string()))
            .cloned())
    }

    async fn scan_events(&self, predicate: &RowPredicate) -> AnyResult<Vec<StoredEvent>> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|event| predicate.matches(event))
            .cloned()
            .collect())
    }
}
