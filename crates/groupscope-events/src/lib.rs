mod assemble;
mod backend;
mod clickhouse_repo;
mod clock;
mod domain;
mod engine;
mod error;
mod filter;
mod memory;
mod primary;
mod repo;
mod window;

pub use assemble::{assemble_event, sort_newest_first};
pub use backend::{select_backend, Backend, OptionsSnapshot, RuntimeOptions};
pub use clickhouse_repo::ClickHouseEventSource;
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::{
    Environment, EventTag, EventsQuery, Group, IssueEvent, StoredEvent, TimeRange,
    ENVIRONMENT_TAG,
};
pub use engine::GroupEventsEngine;
pub use error::{QueryError, QueryResult};
pub use filter::{normalize_event_id, parse_query, StructuredFilter, TagConstraint};
pub use memory::{MemoryRowStore, RowSnapshot};
pub use primary::{PrimaryEventSource, RowPredicate};
pub use repo::{EventRowStore, GroupEventSource};
pub use window::{clamp_to_retention, parse_stats_period, resolve_window, TimeWindow};
