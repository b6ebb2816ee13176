use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use groupscope_clickhouse::{escape_identifier, escape_literal, ClickHouseClient};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::assemble::assemble_event;
use crate::backend::Backend;
use crate::domain::{Group, IssueEvent, StoredEvent, ENVIRONMENT_TAG};
use crate::error::{QueryError, QueryResult};
use crate::filter::StructuredFilter;
use crate::repo::GroupEventSource;
use crate::window::TimeWindow;

/// Group event queries against the ClickHouse events table.
///
/// Expected columns: `id UInt64`, `event_id String`, `project_id UInt64`,
/// `group_id UInt64`, `timestamp DateTime64(3)`, `message String`,
/// `tags Map(String, String)` and `environment String` (empty when unset).
#[derive(Clone)]
pub struct ClickHouseEventSource {
    ch: ClickHouseClient,
    events_table: String,
}

#[derive(Debug, Deserialize)]
struct EventRow {
    id: u64,
    event_id: String,
    group_id: u64,
    project_id: u64,
    timestamp_unix_ms: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    environment: String,
}

impl ClickHouseEventSource {
    pub fn new(ch: ClickHouseClient, events_table: impl Into<String>) -> Self {
        Self {
            ch,
            events_table: events_table.into(),
        }
    }

    fn table_ref(&self) -> String {
        format!(
            "{}.{}",
            escape_identifier(&self.ch.config().database),
            escape_identifier(&self.events_table)
        )
    }

    fn text_clauses(terms: &[&str]) -> Vec<String> {
        terms
            .iter()
            .map(|term| {
                format!(
                    "positionCaseInsensitiveUTF8(message, {}) > 0",
                    escape_literal(term)
                )
            })
            .collect()
    }

    fn tag_clause(key: &str, value: &str) -> String {
        if key == ENVIRONMENT_TAG {
            return format!(
                "if(environment != '', environment, tags[{}]) = {}",
                escape_literal(key),
                escape_literal(value)
            );
        }
        let key = escape_literal(key);
        format!(
            "(mapContains(tags, {key}) AND tags[{key}] = {})",
            escape_literal(value)
        )
    }

    pub(crate) fn build_events_sql(
        &self,
        group: &Group,
        filter: &StructuredFilter,
        window: &TimeWindow,
        limit: u16,
    ) -> String {
        let mut prewhere_clauses = Vec::new();
        let mut where_clauses = vec![
            format!("project_id = {}", group.project_id),
            format!("group_id = {}", group.id),
        ];

        if let Some(start_ms) = window.start_unix_ms() {
            where_clauses.push(format!("timestamp >= fromUnixTimestamp64Milli({start_ms})"));
        }
        if let Some(end_ms) = window.end_unix_ms() {
            where_clauses.push(format!("timestamp < fromUnixTimestamp64Milli({end_ms})"));
        }
        if let Some(environment) = filter.environment.as_deref() {
            where_clauses.push(format!("environment = {}", escape_literal(environment)));
        }

        if let Some(event_id) = filter.event_id.as_deref() {
            prewhere_clauses.push(format!("event_id = {}", escape_literal(event_id)));
        } else {
            let text_clauses = Self::text_clauses(&filter.text_terms());
            if filter.tags.is_empty() {
                prewhere_clauses.extend(text_clauses);
            } else {
                where_clauses.extend(
                    filter
                        .tags
                        .iter()
                        .map(|tag| Self::tag_clause(&tag.key, &tag.value)),
                );
                where_clauses.extend(text_clauses);
            }
        }

        let prewhere_sql = if prewhere_clauses.is_empty() {
            String::new()
        } else {
            format!("PREWHERE {}\n", prewhere_clauses.join("\n  AND "))
        };
        let where_sql = where_clauses.join("\n  AND ");

        format!(
            "SELECT
  id,
  event_id,
  group_id,
  project_id,
  toInt64(toUnixTimestamp64Milli(timestamp)) AS timestamp_unix_ms,
  message,
  tags,
  environment
FROM {table}
{prewhere_sql}WHERE {where_sql}
ORDER BY timestamp DESC, event_id DESC
LIMIT {limit}
SETTINGS output_format_json_quote_64bit_integers = 0
FORMAT JSONEachRow",
            table = self.table_ref(),
            limit = limit.max(1),
        )
    }

    fn map_event_row(row: EventRow) -> QueryResult<StoredEvent> {
        let timestamp =
            DateTime::<Utc>::from_timestamp_millis(row.timestamp_unix_ms).ok_or_else(|| {
                QueryError::backend(
                    Backend::Analytical,
                    format!(
                        "event {} has out-of-range timestamp {}",
                        row.event_id, row.timestamp_unix_ms
                    ),
                )
            })?;

        Ok(StoredEvent {
            id: row.id,
            event_id: row.event_id,
            group_id: row.group_id,
            project_id: row.project_id,
            timestamp,
            message: row.message,
            tags: row.tags,
            environment: (!row.environment.is_empty()).then_some(row.environment),
        })
    }
}

#[async_trait]
impl GroupEventSource for ClickHouseEventSource {
    fn backend(&self) -> Backend {
        Backend::Analytical
    }

    async fn query_events(
        &self,
        group: &Group,
        filter: &StructuredFilter,
        window: &TimeWindow,
        limit: u16,
    ) -> QueryResult<Vec<IssueEvent>> {
        let query = self.build_events_sql(group, filter, window, limit);

        let rows: Vec<EventRow> = self
            .ch
            .query_json_each_row(&query, None)
            .await
            .map_err(|err| {
                warn!(group_id = group.id, "analytical events query failed: {err:#}");
                QueryError::backend_unavailable(Backend::Analytical, format!("{err:#}"))
            })?;

        let events = rows
            .into_iter()
            .map(|row| Self::map_event_row(row).map(assemble_event))
            .collect::<QueryResult<Vec<_>>>()?;

        debug!(
            group_id = group.id,
            result_count = events.len(),
            "analytical store query complete"
        );
        Ok(events)
    }
}
