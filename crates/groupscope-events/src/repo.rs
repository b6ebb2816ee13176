use anyhow::Result as AnyResult;
use async_trait::async_trait;

use crate::backend::Backend;
use crate::domain::{Environment, Group, IssueEvent, StoredEvent};
use crate::error::QueryResult;
use crate::filter::StructuredFilter;
use crate::primary::RowPredicate;
use crate::window::TimeWindow;

/// Row-oriented store holding groups, environments and events.
#[async_trait]
pub trait EventRowStore: Send + Sync {
    async fn get_group(&self, group_id: u64) -> AnyResult<Option<Group>>;

    async fn get_environment(&self, project_id: u64, name: &str)
        -> AnyResult<Option<Environment>>;

    /// Events matching `predicate`, in no particular order. A store may return a
    /// superset; the primary path re-checks every row.
    async fn scan_events(&self, predicate: &RowPredicate) -> AnyResult<Vec<StoredEvent>>;
}

/// One way of answering a group event query.
///
/// Implementations return at most `limit` events, newest first, ties broken by
/// event id descending.
#[async_trait]
pub trait GroupEventSource: Send + Sync {
    fn backend(&self) -> Backend;

    async fn query_events(
        &self,
        group: &Group,
        filter: &StructuredFilter,
        window: &TimeWindow,
        limit: u16,
    ) -> QueryResult<Vec<IssueEvent>>;
}
