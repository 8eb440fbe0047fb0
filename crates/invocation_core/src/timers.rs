use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

pub const TOTAL_EXECUTION: &str = "totalExecution";
pub const RUN_EXECUTION: &str = "runExecution";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub start: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip)]
    started_at: Instant,
}

impl Timer {
    fn started() -> Self {
        Self {
            start: Utc::now(),
            end: None,
            duration_ms: None,
            note: None,
            started_at: Instant::now(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.duration_ms.is_none()
    }
}

/// Independent named timers. Durations come from the monotonic tokio clock, so
/// they follow a paused test clock too.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Timers {
    timers: BTreeMap<String, Timer>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `name`, replacing any earlier timer with the same name.
    pub fn start(&mut self, name: impl Into<String>) {
        self.timers.insert(name.into(), Timer::started());
    }

    /// Stops `name` and returns its duration. Stopping twice keeps the first
    /// measurement; stopping an unknown timer returns `None`.
    pub fn stop(&mut self, name: &str) -> Option<u64> {
        self.stop_inner(name, None)
    }

    pub fn stop_with_note(&mut self, name: &str, note: impl Into<String>) -> Option<u64> {
        self.stop_inner(name, Some(note.into()))
    }

    fn stop_inner(&mut self, name: &str, note: Option<String>) -> Option<u64> {
        let timer = self.timers.get_mut(name)?;
        if let Some(duration_ms) = timer.duration_ms {
            return Some(duration_ms);
        }

        let elapsed = timer.started_at.elapsed().as_millis();
        let duration_ms = u64::try_from(elapsed).unwrap_or(u64::MAX);
        timer.end = Some(Utc::now());
        timer.duration_ms = Some(duration_ms);
        timer.note = note;
        Some(duration_ms)
    }

    pub fn get(&self, name: &str) -> Option<&Timer> {
        self.timers.get(name)
    }

    pub fn duration_ms(&self, name: &str) -> Option<u64> {
        self.timers.get(name).and_then(|timer| timer.duration_ms)
    }
}
