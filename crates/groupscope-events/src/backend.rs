use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use groupscope_config::QueryConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Primary,
    Analytical,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Analytical => "analytical",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the store that serves a request.
///
/// An explicit override always wins. Otherwise the per-request force flag or the
/// deployment toggle routes to the analytical store, and everything else stays on primary.
pub fn select_backend(
    force_analytical: bool,
    analytical_enabled: bool,
    backend_override: Option<Backend>,
) -> Backend {
    if let Some(backend) = backend_override {
        return backend;
    }
    if force_analytical || analytical_enabled {
        Backend::Analytical
    } else {
        Backend::Primary
    }
}

/// Process-wide query options that operators may flip while the process runs.
#[derive(Debug, Default)]
pub struct RuntimeOptions {
    analytical_enabled: AtomicBool,
    retention_days: AtomicU32,
}

/// Values read once per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionsSnapshot {
    pub analytical_enabled: bool,
    pub retention_days: u32,
}

impl RuntimeOptions {
    pub fn new(analytical_enabled: bool, retention_days: u32) -> Self {
        Self {
            analytical_enabled: AtomicBool::new(analytical_enabled),
            retention_days: AtomicU32::new(retention_days),
        }
    }

    pub fn from_config(cfg: &QueryConfig) -> Self {
        Self::new(cfg.analytical_events_enabled, cfg.event_retention_days)
    }

    pub fn set_analytical_enabled(&self, enabled: bool) {
        self.analytical_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_retention_days(&self, days: u32) {
        self.retention_days.store(days, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OptionsSnapshot {
        OptionsSnapshot {
            analytical_enabled: self.analytical_enabled.load(Ordering::Relaxed),
            retention_days: self.retention_days.load(Ordering::Relaxed),
        }
    }
}
