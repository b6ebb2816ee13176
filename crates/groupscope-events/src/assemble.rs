use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::domain::{EventTag, IssueEvent, StoredEvent, ENVIRONMENT_TAG};

pub fn assemble_event(event: StoredEvent) -> IssueEvent {
    let environment = event.environment.filter(|name| !name.is_empty());

    let mut tags = event.tags;
    if let Some(name) = environment.as_ref() {
        tags.insert(ENVIRONMENT_TAG.to_string(), name.clone());
    }

    // Analytical rows carry millisecond timestamps; align row-store values with them.
    let date_created = DateTime::<Utc>::from_timestamp_millis(event.timestamp.timestamp_millis())
        .unwrap_or(event.timestamp);

    IssueEvent {
        id: event.id.to_string(),
        event_id: event.event_id,
        group_id: event.group_id.to_string(),
        project_id: event.project_id.to_string(),
        message: event.message,
        tags: tags
            .into_iter()
            .map(|(key, value)| EventTag { key, value })
            .collect(),
        environment,
        date_created,
    }
}

pub fn newest_first(a: &IssueEvent, b: &IssueEvent) -> Ordering {
    b.date_created
        .cmp(&a.date_created)
        .then_with(|| b.event_id.cmp(&a.event_id))
}

pub fn sort_newest_first(events: &mut [IssueEvent]) {
    events.sort_by(newest_first);
}
