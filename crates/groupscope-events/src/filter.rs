//! Free-text query parsing.
//!
//! A raw query is split on whitespace. `key:value` tokens become tag equality
//! constraints, every other token joins the free-text residual. A query that is
//! nothing but an event id becomes an id lookup. Parsing never fails: tokens that
//! do not look like tags simply stay text.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagConstraint {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredFilter {
    pub tags: Vec<TagConstraint>,
    pub event_id: Option<String>,
    pub text: Option<String>,
    pub environment: Option<String>,
}

impl StructuredFilter {
    /// Words of the free-text residual; each must appear in the message.
    pub fn text_terms(&self) -> Vec<&str> {
        self.text
            .as_deref()
            .map(|text| text.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// An explicit id replaces whatever the query string produced.
    pub fn with_event_id(mut self, event_id: Option<&str>) -> Self {
        if let Some(raw) = event_id.map(str::trim).filter(|raw| !raw.is_empty()) {
            let id = normalize_event_id(raw).unwrap_or_else(|| raw.to_ascii_lowercase());
            self.event_id = Some(id);
        }
        self
    }

    pub fn with_environment(mut self, environment: Option<&str>) -> Self {
        self.environment = environment.map(str::to_string);
        self
    }

    pub fn is_unfiltered(&self) -> bool {
        self.tags.is_empty()
            && self.event_id.is_none()
            && self.text.is_none()
            && self.environment.is_none()
    }
}

fn event_id_re() -> &'static Regex {
    static EVENT_ID_RE: OnceLock<Regex> = OnceLock::new();
    EVENT_ID_RE.get_or_init(|| {
        Regex::new(r"^(?:[0-9a-fA-F]{32}|[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})$")
            .expect("valid event id regex")
    })
}

/// Lowercase 32-hex form of an id literal, if `raw` is one.
pub fn normalize_event_id(raw: &str) -> Option<String> {
    if !event_id_re().is_match(raw) {
        return None;
    }
    Some(raw.replace('-', "").to_ascii_lowercase())
}

fn parse_tag_token(token: &str) -> Option<TagConstraint> {
    let (key, value) = token.split_once(':')?;
    if key.is_empty() || value.is_empty() || value.contains(':') || key.ends_with('\\') {
        return None;
    }
    Some(TagConstraint {
        key: key.to_string(),
        value: value.to_string(),
    })
}

pub fn parse_query(raw: &str) -> StructuredFilter {
    let trimmed = raw.trim();
    if let Some(event_id) = normalize_event_id(trimmed) {
        return StructuredFilter {
            event_id: Some(event_id),
            ..StructuredFilter::default()
        };
    }

    let mut tags = Vec::new();
    let mut words = Vec::new();
    for token in trimmed.split_whitespace() {
        match parse_tag_token(token) {
            Some(tag) => tags.push(tag),
            None => words.push(token),
        }
    }

    StructuredFilter {
        tags,
        event_id: None,
        text: (!words.is_empty()).then(|| words.join(" ")),
        environment: None,
    }
}
