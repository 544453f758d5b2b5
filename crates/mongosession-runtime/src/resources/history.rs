//! `history://connection` resource
//!
//! A bounded log of the most recent connection events, rendered one JSON
//! object per line.

use std::collections::VecDeque;
use std::sync::Arc;

use mongosession_core::{
    ConnectionEvent, EventBroadcaster, EventKind, ProjectionSink, ReactiveProjection, StateTag,
};
use serde::{Deserialize, Serialize};

use crate::errors::Result;

pub const HISTORY_RESOURCE_URI: &str = "history://connection";
const HISTORY_RESOURCE_NAME: &str = "connection-history";

/// One observed event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Position in the event stream since the log was created
    pub sequence: u64,
    pub event: EventKind,
    /// State carried by the event
    pub state: StateTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Most recent entries, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLog {
    limit: usize,
    observed: u64,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryLog {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            observed: 0,
            entries: VecDeque::with_capacity(limit),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total events observed, including evicted ones
    pub fn observed(&self) -> u64 {
        self.observed
    }

    fn entry_for(event: &ConnectionEvent, sequence: u64) -> HistoryEntry {
        let (state, auth_type, reason) = match event {
            ConnectionEvent::Requested(state) => (
                state.tag(),
                state.auth_type().map(|auth| auth.to_string()),
                None,
            ),
            ConnectionEvent::Succeeded(connected) => (
                StateTag::Connected,
                Some(connected.auth_type.to_string()),
                None,
            ),
            ConnectionEvent::TimedOut(errored) | ConnectionEvent::Errored(errored) => (
                StateTag::Errored,
                errored.auth_type.map(|auth| auth.to_string()),
                Some(errored.reason.clone()),
            ),
            ConnectionEvent::Closed => (StateTag::Disconnected, None, None),
        };

        HistoryEntry {
            sequence,
            event: event.kind(),
            state,
            auth_type,
            reason,
        }
    }
}

/// Append an event, evicting the oldest entry past the limit
pub fn fold(event: &ConnectionEvent, previous: &HistoryLog) -> HistoryLog {
    let mut next = previous.clone();
    next.observed += 1;
    if next.limit == 0 {
        return next;
    }
    next.entries
        .push_back(HistoryLog::entry_for(event, next.observed));
    while next.entries.len() > next.limit {
        next.entries.pop_front();
    }
    next
}

pub fn render(log: &HistoryLog) -> String {
    log.entries()
        .filter_map(|entry| serde_json::to_string(entry).ok())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Attach the history projection to a broadcaster
pub fn history_resource(
    broadcaster: &EventBroadcaster,
    sink: Arc<dyn ProjectionSink>,
    limit: usize,
) -> Result<ReactiveProjection<HistoryLog>> {
    let projection =
        ReactiveProjection::builder(HISTORY_RESOURCE_NAME, HISTORY_RESOURCE_URI, HistoryLog::new(limit))
            .events(EventKind::ALL)
            .fold(fold)
            .render(render)
            .sink(sink)
            .attach(broadcaster)?;
    Ok(projection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongosession_core::{ConnectionState, ErroredState};

    fn errored(reason: &str) -> ConnectionEvent {
        ConnectionEvent::Errored(ErroredState {
            reason: reason.to_string(),
            auth_type: None,
            atlas: None,
        })
    }

    #[test]
    fn test_history_is_bounded() {
        let mut log = HistoryLog::new(2);
        for reason in ["a", "b", "c"] {
            log = fold(&errored(reason), &log);
        }

        let reasons: Vec<_> = log.entries().filter_map(|e| e.reason.clone()).collect();
        assert_eq!(reasons, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(log.observed(), 3);
        assert_eq!(log.entries().next().map(|e| e.sequence), Some(2));
    }

    #[test]
    fn test_zero_limit_keeps_nothing() {
        let log = fold(&ConnectionEvent::Closed, &HistoryLog::new(0));
        assert!(log.is_empty());
        assert_eq!(render(&log), "");
    }

    #[test]
    fn test_render_one_json_object_per_line() {
        let mut log = HistoryLog::new(10);
        log = fold(&ConnectionEvent::Requested(ConnectionState::Disconnected), &log);
        log = fold(&errored("boom"), &log);

        let rendered = render(&log);
        let lines: Vec<serde_json::Value> = rendered
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "requested");
        assert_eq!(lines[0]["state"], "disconnected");
        assert_eq!(lines[1]["event"], "errored");
        assert_eq!(lines[1]["reason"], "boom");
    }
}
