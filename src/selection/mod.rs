// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Selection acquisition.
//!
//! First the implied (pickfirst) selection is checked. Only when that finishes with nothing
//! selected is the user prompted to pick objects. Both phases stream their result as events
//! (`start`, `item_begin` per object, `done`) that are collected here by `req_id`.

use std::collections::BTreeMap;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::marker::{req_id, Message};

/// Upper bound for the implied phase; the pickfirst check never waits on the user.
pub const IMPLIED_PHASE_LIMIT: Duration = Duration::from_secs(10);
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
/// How long to let a just-finished command settle before checking `CMDACTIVE`.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_PROMPT: &str = "Select objects";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPhase {
    Implied,
    Prompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    CheckImplied,
    PromptUser,
    Done,
    TimedOut,
}

impl SelectionState {
    /// State after the implied check finished (or ran out of time) with `found` objects.
    pub fn after_implied(timed_out: bool, found: usize) -> Self {
        if timed_out {
            Self::TimedOut
        } else if found > 0 {
            Self::Done
        } else {
            Self::PromptUser
        }
    }

    pub fn after_prompt(timed_out: bool) -> Self {
        if timed_out {
            Self::TimedOut
        } else {
            Self::Done
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SelectedObject {
    pub handle: Option<String>,
    #[serde(rename = "type")]
    pub object_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SelectionOutcome {
    pub req_id: String,
    pub count: usize,
    /// `ERRNO` at selection start. Diagnostic only.
    pub errno: Option<i64>,
    pub objects: Vec<SelectedObject>,
    pub timed_out: bool,
    /// The user dismissed the prompt.
    pub cancelled: bool,
    /// Log cursor after the last event read.
    pub cursor: u64,
    pub phase: SelectionPhase,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum SelectionEvent {
    Start {
        #[serde(default)]
        errno: Option<i64>,
    },
    ItemBegin {
        index: u64,
        #[serde(default)]
        handle: Value,
        #[serde(rename = "type", default)]
        object_type: Value,
    },
    Done {
        #[serde(default)]
        count: Option<u64>,
        #[serde(default)]
        cancelled: bool,
        #[serde(default)]
        error: Option<String>,
    },
}

fn text_field(value: Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text),
        _ => None,
    }
}

/// Aggregates the events of one request.
#[derive(Debug)]
pub struct EventCollector {
    req_id: String,
    max_objects: usize,
    errno: Option<i64>,
    started: bool,
    done: bool,
    cancelled: bool,
    error: Option<String>,
    objects: BTreeMap<u64, SelectedObject>,
}

impl EventCollector {
    pub fn new(req_id: impl Into<String>, max_objects: usize) -> Self {
        Self {
            req_id: req_id.into(),
            max_objects: max_objects.max(1),
            errno: None,
            started: false,
            done: false,
            cancelled: false,
            error: None,
            objects: BTreeMap::new(),
        }
    }

    pub fn req_id(&self) -> &str {
        &self.req_id
    }

    /// Take one decoded message. Messages of other requests and unknown events are ignored.
    pub fn absorb(&mut self, message: Message) {
        if req_id(&message) != Some(self.req_id.as_str()) || self.done {
            return;
        }
        let event = match serde_json::from_value::<SelectionEvent>(Value::Object(message)) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(req_id = %self.req_id, %err, "ignoring unrecognized selection event");
                return;
            }
        };
        match event {
            SelectionEvent::Start { errno } => {
                self.started = true;
                self.errno = errno;
            }
            SelectionEvent::ItemBegin { index, handle, object_type } => {
                // Late items of a request that already reached its cap are dropped.
                if self.objects.len() < self.max_objects || self.objects.contains_key(&index) {
                    self.objects.insert(
                        index,
                        SelectedObject { handle: text_field(handle), object_type: text_field(object_type) },
                    );
                }
            }
            SelectionEvent::Done { count, cancelled, error } => {
                tracing::debug!(
                    req_id = %self.req_id,
                    ?count,
                    cancelled,
                    error = error.as_deref(),
                    items = self.objects.len(),
                    "selection done"
                );
                self.done = true;
                self.cancelled = cancelled;
                self.error = error;
            }
        }
    }

    pub fn absorb_all(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.absorb(message);
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn found(&self) -> usize {
        self.objects.len()
    }

    /// Script error reported by the request's `done` event.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn finish(self, timed_out: bool, cursor: u64, phase: SelectionPhase) -> SelectionOutcome {
        let objects: Vec<SelectedObject> = self.objects.into_values().collect();
        SelectionOutcome {
            req_id: self.req_id,
            count: objects.len(),
            errno: self.errno,
            objects,
            timed_out,
            cancelled: self.cancelled,
            cursor,
            phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::marker::extract_stream;

    fn message(value: Value) -> Message {
        match value {
            Value::Object(obj) => obj,
            _ => unreachable!(),
        }
    }

    #[test]
    fn implied_results_decide_whether_to_prompt() {
        assert_eq!(SelectionState::after_implied(false, 0), SelectionState::PromptUser);
        assert_eq!(SelectionState::after_implied(false, 2), SelectionState::Done);
        assert_eq!(SelectionState::after_implied(true, 0), SelectionState::TimedOut);
        assert_eq!(SelectionState::after_prompt(true), SelectionState::TimedOut);
        assert_eq!(SelectionState::after_prompt(false), SelectionState::Done);
    }

    #[test]
    fn collector_orders_items_by_index_and_ignores_other_requests() {
        let log = [
            r#"[MCP:JSON]{"req_id":"r1","event":"start","phase":"implied","errno":0}"#,
            r#"[MCP:JSON]{"req_id":"r1","event":"item_begin","index":1,"handle":"2B","type":"CIRCLE"}"#,
            r#"[MCP:JSON]{"req_id":"other","event":"item_begin","index":0,"handle":"FF","type":"TEXT"}"#,
            r#"[MCP:JSON]{"req_id":"r1","event":"item_begin","index":0,"handle":"2A","type":"LINE"}"#,
            r#"[MCP:JSON]{"req_id":"r1","event":"done","count":2}"#,
        ]
        .join("\n");

        let mut collector = EventCollector::new("r1", 10);
        collector.absorb_all(extract_stream(&log));
        assert!(collector.is_started());
        assert!(collector.is_done());

        let outcome = collector.finish(false, 42, SelectionPhase::Implied);
        assert_eq!(outcome.count, 2);
        assert_eq!(outcome.errno, Some(0));
        assert_eq!(outcome.cursor, 42);
        let handles: Vec<_> = outcome.objects.iter().map(|o| o.handle.as_deref()).collect();
        assert_eq!(handles, vec![Some("2A"), Some("2B")]);
        assert_eq!(outcome.objects[0].object_type.as_deref(), Some("LINE"));
    }

    #[test]
    fn collector_caps_at_max_objects() {
        let mut collector = EventCollector::new("r", 1);
        for index in 0..3 {
            collector.absorb(message(json!({
                "req_id": "r", "event": "item_begin", "index": index, "handle": format!("H{index}"), "type": "LINE"
            })));
        }
        assert_eq!(collector.found(), 1);
    }

    #[test]
    fn events_after_done_are_ignored() {
        let mut collector = EventCollector::new("r", 5);
        collector.absorb(message(json!({"req_id": "r", "event": "done", "count": 0})));
        collector.absorb(message(json!({
            "req_id": "r", "event": "item_begin", "index": 0, "handle": "1", "type": "LINE"
        })));
        assert!(collector.is_done());
        assert_eq!(collector.found(), 0);
    }

    #[test]
    fn missing_handles_decode_as_none() {
        let mut collector = EventCollector::new("r", 5);
        collector.absorb(message(json!({
            "req_id": "r", "event": "item_begin", "index": 0, "handle": false, "type": "LINE"
        })));
        collector.absorb(message(json!({"req_id": "r", "event": "bogus"})));
        let outcome = collector.finish(true, 0, SelectionPhase::Prompt);
        assert_eq!(outcome.objects, vec![SelectedObject { handle: None, object_type: Some("LINE".to_owned()) }]);
        assert!(outcome.timed_out);
    }

    #[test]
    fn done_event_carries_cancel_and_error() {
        let mut cancelled = EventCollector::new("r", 5);
        cancelled.absorb(message(json!({
            "req_id": "r", "event": "done", "count": 0, "cancelled": true, "reason": "Function cancelled"
        })));
        assert!(cancelled.is_done());
        assert_eq!(cancelled.error(), None);
        let outcome = cancelled.finish(false, 0, SelectionPhase::Prompt);
        assert!(outcome.cancelled);
        assert!(!outcome.timed_out);

        let mut failed = EventCollector::new("r", 5);
        failed.absorb(message(json!({
            "req_id": "r", "event": "done", "count": 0, "error": "bad SSGET list"
        })));
        assert_eq!(failed.error(), Some("bad SSGET list"));
        assert!(!failed.finish(false, 0, SelectionPhase::Implied).cancelled);
    }

    #[test]
    fn outcome_serializes_type_field_name() {
        let outcome = EventCollector::new("r", 1).finish(false, 0, SelectionPhase::Implied);
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["phase"], json!("implied"));
        assert_eq!(value["objects"], json!([]));
        assert_eq!(value["cancelled"], json!(false));

        let object = SelectedObject { handle: Some("1A".to_owned()), object_type: Some("ARC".to_owned()) };
        assert_eq!(serde_json::to_value(object).unwrap(), json!({"handle": "1A", "type": "ARC"}));
    }
}
