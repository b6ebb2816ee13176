use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::Backend;

/// Tag key that is answered by an event's environment rather than its tag map.
pub const ENVIRONMENT_TAG: &str = "environment";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: u64,
    pub project_id: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: u64,
    pub project_id: u64,
    pub name: String,
}

/// An event as the row store keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: u64,
    pub event_id: String,
    pub group_id: u64,
    pub project_id: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub environment: Option<String>,
}

impl StoredEvent {
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        if key == ENVIRONMENT_TAG {
            let environment = self.environment.as_deref().filter(|name| !name.is_empty());
            if environment.is_some() {
                return environment;
            }
        }
        self.tags.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTag {
    pub key: String,
    pub value: String,
}

/// Event shape handed back to callers, identical for both stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueEvent {
    pub id: String,
    #[serde(rename = "eventID")]
    pub event_id: String,
    #[serde(rename = "groupID")]
    pub group_id: String,
    #[serde(rename = "projectID")]
    pub project_id: String,
    pub message: String,
    pub tags: Vec<EventTag>,
    pub environment: Option<String>,
    pub date_created: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Relative period such as `24h` or `14d`; wins over `start`/`end`.
    #[serde(default)]
    pub period: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsQuery {
    pub group_id: u64,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub time_range: TimeRange,
    #[serde(default)]
    pub force_analytical: bool,
    #[serde(default)]
    pub backend_override: Option<Backend>,
    #[serde(default)]
    pub limit: Option<u16>,
}

impl EventsQuery {
    pub fn for_group(group_id: u64) -> Self {
        Self {
            group_id,
            ..Self::default()
        }
    }

    pub fn normalized_limit(&self, max_limit: u16) -> u16 {
        self.limit.unwrap_or(max_limit).max(1).min(max_limit.max(1))
    }
}
