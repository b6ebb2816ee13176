use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use groupscope_config::{AppConfig, ClickHouseConfig, QueryConfig};
use groupscope_events::{
    Backend, Environment, EventsQuery, FixedClock, Group, GroupEventsEngine, MemoryRowStore,
    QueryError, StoredEvent, TimeRange,
};
use serde_json::json;

const PROJECT_ID: u64 = 7;
const GROUP_ID: u64 = 42;

#[derive(Default)]
struct MockState {
    queries: Mutex<Vec<String>>,
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn json_each_row(rows: serde_json::Value) -> String {
    match rows {
        serde_json::Value::Array(items) => {
            let mut out = String::new();
            for item in items {
                out.push_str(&item.to_string());
                out.push('\n');
            }
            out
        }
        value => format!("{value}\n"),
    }
}

fn stored_event() -> StoredEvent {
    StoredEvent {
        id: 9001,
        event_id: "a".repeat(32),
        group_id: GROUP_ID,
        project_id: PROJECT_ID,
        timestamp: now() - Duration::minutes(5),
        message: "foo bar hello world".to_string(),
        tags: BTreeMap::from([
            ("bar".to_string(), "buz".to_string()),
            ("foo".to_string(), "baz".to_string()),
        ]),
        environment: Some("production".to_string()),
    }
}

async fn spawn_mock_server() -> (String, Arc<MockState>) {
    async fn handler(
        State(state): State<Arc<MockState>>,
        Query(params): Query<HashMap<String, String>>,
    ) -> (StatusCode, String) {
        let query = params.get("query").cloned().unwrap_or_default();
        state
            .queries
            .lock()
            .expect("query lock")
            .push(query.clone());

        if query.contains("tags['fail'] = 'now'") {
            return (StatusCode::SERVICE_UNAVAILABLE, "too many queries".to_string());
        }

        if query.contains("FROM `groupscope`.`events`") {
            let event = stored_event();
            return (
                StatusCode::OK,
                json_each_row(json!([
                    {
                        "id": event.id,
                        "event_id": event.event_id,
                        "group_id": event.group_id,
                        "project_id": event.project_id,
                        "timestamp_unix_ms": event.timestamp.timestamp_millis(),
                        "message": event.message,
                        "tags": event.tags,
                        "environment": "production"
                    }
                ])),
            );
        }

        (StatusCode::OK, json_each_row(json!([])))
    }

    let state = Arc::new(MockState::default());
    let app = Router::new()
        .route("/", get(handler).post(handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{}", addr), state)
}

fn app_config(url: String, retention_days: u32) -> AppConfig {
    AppConfig {
        clickhouse: ClickHouseConfig {
            url,
            database: "groupscope".to_string(),
            username: "default".to_string(),
            password: String::new(),
            timeout_seconds: 5.0,
        },
        query: QueryConfig {
            event_retention_days: retention_days,
            analytical_events_enabled: false,
            max_results: 50,
            events_table: "events".to_string(),
        },
    }
}

async fn build_engine(url: String, retention_days: u32) -> GroupEventsEngine {
    let store = Arc::new(MemoryRowStore::new());
    store
        .insert_group(Group {
            id: GROUP_ID,
            project_id: PROJECT_ID,
            first_seen: now() - Duration::days(3),
            last_seen: now(),
        })
        .await;
    store
        .insert_environment(Environment {
            id: 1,
            project_id: PROJECT_ID,
            name: "production".to_string(),
        })
        .await;
    store.insert_event(stored_event()).await;

    GroupEventsEngine::from_config(&app_config(url, retention_days), store)
        .expect("engine from config")
        .with_clock(Arc::new(FixedClock(now())))
}

fn captured(state: &MockState) -> Vec<String> {
    state.queries.lock().expect("queries lock").clone()
}

#[tokio::test(flavor = "multi_thread")]
async fn forced_query_translates_filters_into_analytical_sql() {
    let (url, state) = spawn_mock_server().await;
    let engine = build_engine(url, 1).await;

    let events = engine
        .query_events(EventsQuery {
            query: Some("foo:baz hello".to_string()),
            environment: Some("production".to_string()),
            force_analytical: true,
            ..EventsQuery::for_group(GROUP_ID)
        })
        .await
        .expect("analytical query");

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "9001");
    assert_eq!(events[0].event_id, "a".repeat(32));

    let queries = captured(&state);
    assert_eq!(queries.len(), 1);
    let sql = &queries[0];
    assert!(sql.contains("project_id = 7"));
    assert!(sql.contains("group_id = 42"));
    assert!(sql.contains("environment = 'production'"));
    assert!(sql.contains("(mapContains(tags, 'foo') AND tags['foo'] = 'baz')"));
    assert!(sql.contains("positionCaseInsensitiveUTF8(message, 'hello') > 0"));
    let retention_floor = (now() - Duration::days(1)).timestamp_millis();
    assert!(sql.contains(&format!(
        "timestamp >= fromUnixTimestamp64Milli({retention_floor})"
    )));
    assert!(sql.contains("ORDER BY timestamp DESC, event_id DESC"));
    assert!(sql.contains("LIMIT 50"));
}

#[tokio::test(flavor = "multi_thread")]
async fn tag_constraints_are_joined_conjunctively() {
    let (url, state) = spawn_mock_server().await;
    let engine = build_engine(url, 0).await;

    engine
        .query_events(EventsQuery {
            query: Some("bar:biz foo:baz".to_string()),
            force_analytical: true,
            ..EventsQuery::for_group(GROUP_ID)
        })
        .await
        .expect("analytical query");

    let queries = captured(&state);
    assert_eq!(queries.len(), 1);
    let sql = &queries[0];
    let where_sql = &sql[sql.find("WHERE").expect("where clause")..];
    assert!(where_sql.contains(
        "AND (mapContains(tags, 'bar') AND tags['bar'] = 'biz')\n  \
         AND (mapContains(tags, 'foo') AND tags['foo'] = 'baz')"
    ));
    assert!(!where_sql.contains(" OR "));
}

#[tokio::test(flavor = "multi_thread")]
async fn both_backends_assemble_identical_events() {
    let (url, _state) = spawn_mock_server().await;
    let engine = build_engine(url, 0).await;

    let request = EventsQuery {
        time_range: TimeRange {
            period: Some("1d".to_string()),
            ..TimeRange::default()
        },
        ..EventsQuery::for_group(GROUP_ID)
    };

    let primary = engine
        .query_events(EventsQuery {
            backend_override: Some(Backend::Primary),
            ..request.clone()
        })
        .await
        .expect("primary");
    let analytical = engine
        .query_events(EventsQuery {
            backend_override: Some(Backend::Analytical),
            ..request
        })
        .await
        .expect("analytical");

    assert_eq!(primary, analytical);
    assert_eq!(
        serde_json::to_string(&primary).expect("primary json"),
        serde_json::to_string(&analytical).expect("analytical json")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn event_id_query_uses_point_lookup() {
    let (url, state) = spawn_mock_server().await;
    let engine = build_engine(url, 0).await;

    engine
        .query_events(EventsQuery {
            query: Some("A".repeat(32)),
            force_analytical: true,
            ..EventsQuery::for_group(GROUP_ID)
        })
        .await
        .expect("event id lookup");

    let queries = captured(&state);
    assert!(queries[0].contains(&format!("PREWHERE event_id = '{}'", "a".repeat(32))));
}

#[tokio::test(flavor = "multi_thread")]
async fn store_failure_surfaces_as_unavailable_without_fallback() {
    let (url, state) = spawn_mock_server().await;
    let engine = build_engine(url, 0).await;

    let err = engine
        .query_events(EventsQuery {
            query: Some("fail:now".to_string()),
            force_analytical: true,
            ..EventsQuery::for_group(GROUP_ID)
        })
        .await
        .expect_err("analytical failure");

    match err {
        QueryError::BackendUnavailable { backend, message } => {
            assert_eq!(backend, Backend::Analytical);
            assert!(message.contains("503"), "unexpected message: {message}");
        }
        other => panic!("expected backend unavailable, got {other:?}"),
    }
    assert_eq!(captured(&state).len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_store_is_unavailable() {
    let engine = build_engine("http://127.0.0.1:9".to_string(), 0).await;
    engine.options().set_analytical_enabled(true);

    let err = engine
        .query_events(EventsQuery::for_group(GROUP_ID))
        .await
        .expect_err("unreachable analytical store");
    assert_eq!(err.source_backend(), Some(Backend::Analytical));
    assert!(matches!(err, QueryError::BackendUnavailable { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_environment_skips_the_store() {
    let (url, state) = spawn_mock_server().await;
    let engine = build_engine(url, 0).await;

    let events = engine
        .query_events(EventsQuery {
            environment: Some("invalid".to_string()),
            force_analytical: true,
            ..EventsQuery::for_group(GROUP_ID)
        })
        .await
        .expect("unknown environment");

    assert!(events.is_empty());
    assert!(captured(&state).is_empty());
}
