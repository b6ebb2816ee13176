use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use groupscope_clickhouse::ClickHouseClient;
use groupscope_config::AppConfig;
use tracing::{debug, info, warn};

use crate::backend::{select_backend, Backend, RuntimeOptions};
use crate::clickhouse_repo::ClickHouseEventSource;
use crate::clock::{Clock, SystemClock};
use crate::domain::{EventsQuery, Group, IssueEvent};
use crate::error::{QueryError, QueryResult};
use crate::filter::{parse_query, StructuredFilter};
use crate::primary::PrimaryEventSource;
use crate::repo::{EventRowStore, GroupEventSource};
use crate::window::resolve_window;

const DEFAULT_MAX_RESULTS: u16 = 100;

/// Answers "which events of this group match" against the primary or analytical store.
pub struct GroupEventsEngine {
    rows: Arc<dyn EventRowStore>,
    primary: Arc<dyn GroupEventSource>,
    analytical: Option<Arc<dyn GroupEventSource>>,
    options: Arc<RuntimeOptions>,
    clock: Arc<dyn Clock>,
    max_results: u16,
}

impl GroupEventsEngine {
    pub fn new(rows: Arc<dyn EventRowStore>, options: Arc<RuntimeOptions>) -> Self {
        let primary: Arc<dyn GroupEventSource> = Arc::new(PrimaryEventSource::new(rows.clone()));
        Self {
            rows,
            primary,
            analytical: None,
            options,
            clock: Arc::new(SystemClock),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Engine wired to ClickHouse as configured, with `rows` as the primary store.
    pub fn from_config(cfg: &AppConfig, rows: Arc<dyn EventRowStore>) -> AnyResult<Self> {
        let ch = ClickHouseClient::new(cfg.clickhouse.clone())
            .context("failed to build analytical store client")?;
        let analytical = ClickHouseEventSource::new(ch, cfg.query.events_table.clone());

        Ok(
            Self::new(rows, Arc::new(RuntimeOptions::from_config(&cfg.query)))
                .with_analytical(Arc::new(analytical))
                .with_max_results(cfg.query.max_results),
        )
    }

    pub fn with_analytical(mut self, analytical: Arc<dyn GroupEventSource>) -> Self {
        self.analytical = Some(analytical);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_results(mut self, max_results: u16) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn options(&self) -> &Arc<RuntimeOptions> {
        &self.options
    }

    async fn load_group(&self, group_id: u64) -> QueryResult<Group> {
        self.rows
            .get_group(group_id)
            .await
            .map_err(|err| QueryError::backend(Backend::Primary, format!("{err:#}")))?
            .ok_or(QueryError::GroupNotFound(group_id))
    }

    /// False when the environment does not exist for the group's project.
    async fn environment_exists(&self, group: &Group, name: &str) -> QueryResult<bool> {
        let environment = self
            .rows
            .get_environment(group.project_id, name)
            .await
            .map_err(|err| QueryError::backend(Backend::Primary, format!("{err:#}")))?;
        Ok(environment.is_some())
    }

    fn source_for(&self, backend: Backend) -> QueryResult<&Arc<dyn GroupEventSource>> {
        match backend {
            Backend::Primary => Ok(&self.primary),
            Backend::Analytical => self.analytical.as_ref().ok_or_else(|| {
                QueryError::backend_unavailable(
                    Backend::Analytical,
                    "no analytical store is configured",
                )
            }),
        }
    }

    pub async fn query_events(&self, request: EventsQuery) -> QueryResult<Vec<IssueEvent>> {
        let options = self.options.snapshot();
        let group = self.load_group(request.group_id).await?;

        let filter: StructuredFilter = parse_query(request.query.as_deref().unwrap_or_default())
            .with_event_id(request.event_id.as_deref())
            .with_environment(request.environment.as_deref());

        let window = resolve_window(
            &request.time_range,
            self.clock.now(),
            options.retention_days,
        )?;
        if window.is_empty() {
            debug!(group_id = group.id, "empty time window, no events");
            return Ok(Vec::new());
        }

        if let Some(name) = filter.environment.as_deref() {
            if !self.environment_exists(&group, name).await? {
                debug!(group_id = group.id, environment = name, "unknown environment, no events");
                return Ok(Vec::new());
            }
        }

        let backend = select_backend(
            request.force_analytical,
            options.analytical_enabled,
            request.backend_override,
        );
        let limit = request.normalized_limit(self.max_results);
        info!(
            group_id = group.id,
            backend = backend.as_str(),
            forced = request.force_analytical,
            toggle = options.analytical_enabled,
            limit,
            "querying group events"
        );

        let source = self.source_for(backend)?;
        source
            .query_events(&group, &filter, &window, limit)
            .await
            .inspect_err(|err| {
                warn!(
                    group_id = group.id,
                    backend = source.backend().as_str(),
                    "group events query failed: {err}"
                )
            })
    }
}
