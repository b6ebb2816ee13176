use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::assemble::{assemble_event, sort_newest_first};
use crate::backend::Backend;
use crate::domain::{Group, IssueEvent, StoredEvent};
use crate::error::{QueryError, QueryResult};
use crate::filter::{StructuredFilter, TagConstraint};
use crate::repo::{EventRowStore, GroupEventSource};
use crate::window::TimeWindow;

/// Row-store translation of a structured filter.
///
/// With `event_id` set, tag and text constraints are dropped: the id lookup is exact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowPredicate {
    pub group_id: u64,
    pub window: TimeWindow,
    pub event_id: Option<String>,
    pub tags: Vec<TagConstraint>,
    /// Lowercased words, each required as a substring of the message.
    pub text_terms: Vec<String>,
    pub environment: Option<String>,
}

impl RowPredicate {
    pub fn from_filter(group: &Group, filter: &StructuredFilter, window: &TimeWindow) -> Self {
        let mut predicate = Self {
            group_id: group.id,
            window: *window,
            event_id: filter.event_id.clone(),
            environment: filter.environment.clone(),
            ..Self::default()
        };

        if predicate.event_id.is_none() {
            predicate.tags = filter.tags.clone();
            predicate.text_terms = filter
                .text_terms()
                .into_iter()
                .map(str::to_lowercase)
                .collect();
        }

        predicate
    }

    pub fn matches(&self, event: &StoredEvent) -> bool {
        if event.group_id != self.group_id || !self.window.contains(event.timestamp) {
            return false;
        }

        if let Some(environment) = self.environment.as_deref() {
            if event.environment.as_deref() != Some(environment) {
                return false;
            }
        }

        if let Some(event_id) = self.event_id.as_deref() {
            return event.event_id == event_id;
        }

        let tags_match = self
            .tags
            .iter()
            .all(|tag| event.tag_value(&tag.key) == Some(tag.value.as_str()));
        if !tags_match {
            return false;
        }

        if self.text_terms.is_empty() {
            return true;
        }
        let message = event.message.to_lowercase();
        self.text_terms
            .iter()
            .all(|term| message.contains(term.as_str()))
    }
}

pub struct PrimaryEventSource {
    store: Arc<dyn EventRowStore>,
}

impl PrimaryEventSource {
    pub fn new(store: Arc<dyn EventRowStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl GroupEventSource for PrimaryEventSource {
    fn backend(&self) -> Backend {
        Backend::Primary
    }

    async fn query_events(
        &self,
        group: &Group,
        filter: &StructuredFilter,
        window: &TimeWindow,
        limit: u16,
    ) -> QueryResult<Vec<IssueEvent>> {
        let predicate = RowPredicate::from_filter(group, filter, window);
        let rows = self.store.scan_events(&predicate).await.map_err(|err| {
            warn!(group_id = group.id, "row store scan failed: {err:#}");
            QueryError::backend(Backend::Primary, format!("{err:#}"))
        })?;

        let mut events: Vec<IssueEvent> = rows
            .into_iter()
            .filter(|row| predicate.matches(row))
            .map(assemble_event)
            .collect();
        sort_newest_first(&mut events);
        events.truncate(limit as usize);

        debug!(
            group_id = group.id,
            result_count = events.len(),
            "primary store query complete"
        );
        Ok(events)
    }
}
