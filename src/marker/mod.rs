// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Correlating script results with the requests that produced them.
//!
//! The command line gives no return channel, so scripts print their results as single log
//! lines tagged with [`JSON_TAG`]. Everything else in the log is noise to be skipped. Streaming
//! scripts print one tagged line per event and stamp each with a `req_id`.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::BridgeError;

pub const JSON_TAG: &str = "[MCP:JSON]";

pub type Message = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerError {
    #[error("no `{JSON_TAG}` line found in output")]
    NotFound,
    #[error("`{JSON_TAG}` line has an empty payload")]
    EmptyPayload,
    #[error("`{JSON_TAG}` payload is not valid JSON: {0}")]
    Malformed(String),
    #[error("`{JSON_TAG}` payload is not a JSON object")]
    NotAnObject,
}

/// Payload after the last tag occurrence on `line`, if the line is tagged at all.
fn tagged_payload(line: &str) -> Option<&str> {
    let at = line.rfind(JSON_TAG)?;
    Some(line[at + JSON_TAG.len()..].trim())
}

fn decode_payload(payload: &str) -> Result<Message, MarkerError> {
    if payload.is_empty() {
        return Err(MarkerError::EmptyPayload);
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(obj)) => Ok(obj),
        Ok(_) => Err(MarkerError::NotAnObject),
        Err(err) => Err(MarkerError::Malformed(err.to_string())),
    }
}

/// Decode the last tagged line in `text`.
pub fn extract_single(text: &str) -> Result<Message, MarkerError> {
    let payload = text.lines().filter_map(tagged_payload).last().ok_or(MarkerError::NotFound)?;
    decode_payload(payload)
}

/// Every tagged line that decodes to an object, in log order.
pub fn extract_stream(text: &str) -> Vec<Message> {
    text.lines().filter_map(tagged_payload).filter_map(|payload| decode_payload(payload).ok()).collect()
}

pub fn req_id(message: &Message) -> Option<&str> {
    message.get("req_id").and_then(Value::as_str)
}

/// Messages belonging to `wanted`, in order; interleaved events of other requests are dropped.
pub fn for_request<'a>(
    messages: impl IntoIterator<Item = Message> + 'a,
    wanted: &'a str,
) -> impl Iterator<Item = Message> + 'a {
    messages.into_iter().filter(move |message| req_id(message) == Some(wanted))
}

const LISP_MARKER_PREFIX: &str = "[MCP:LISP id=";

fn start_marker(marker_id: &str) -> String {
    format!("{LISP_MARKER_PREFIX}{marker_id} start]")
}

fn end_marker(marker_id: &str) -> String {
    format!("{LISP_MARKER_PREFIX}{marker_id} end]")
}

/// Bracket `expr` with printed start/end markers so its output can later be located in the log.
pub fn wrap(expr: &str, marker_id: &str) -> String {
    [
        format!("(prompt \"\\n{}\")", start_marker(marker_id)),
        "(princ)".to_owned(),
        expr.to_owned(),
        format!("(prompt \"\\n{}\")", end_marker(marker_id)),
        "(princ)".to_owned(),
    ]
    .join("\n")
}

/// Output printed by one wrapped invocation.
///
/// Starts after the last start marker of `marker_id` (the echo of the submitted script also
/// holds the marker text, so the last occurrence is the printed one) and runs up to its end
/// marker when that has arrived. When the start marker is gone, as in a short tail read, the
/// slice runs from the end marker of the preceding invocation to this one's end marker.
pub fn invocation_slice<'a>(text: &'a str, marker_id: &str) -> Option<&'a str> {
    let start = start_marker(marker_id);
    let end = end_marker(marker_id);

    if let Some(at) = text.rfind(&start) {
        let rest = &text[at + start.len()..];
        return Some(match rest.find(&end) {
            Some(until) => &rest[..until],
            None => rest,
        });
    }

    let until = text.rfind(&end)?;
    let before = &text[..until];
    let from = before
        .match_indices(LISP_MARKER_PREFIX)
        .filter_map(|(at, _)| {
            let marker = &before[at + LISP_MARKER_PREFIX.len()..];
            let close = marker.find(']')?;
            let (id, kind) = marker[..close].rsplit_once(' ')?;
            (kind == "end" && id != marker_id)
                .then_some(at + LISP_MARKER_PREFIX.len() + close + 1)
        })
        .last()
        .unwrap_or(0);
    Some(&before[from..])
}

/// Turns a byte stream that arrives in arbitrary chunks into decoded messages.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: String,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed another chunk. Complete lines are decoded immediately. A trailing partial line is
    /// decoded only if it already holds a complete payload; otherwise it waits for more bytes.
    pub fn push(&mut self, chunk: &str) -> Vec<Message> {
        self.pending.push_str(chunk);
        let mut out = Vec::new();

        let complete = match self.pending.rfind('\n') {
            Some(at) => at + 1,
            None => 0,
        };
        let tail = self.pending.split_off(complete);
        out.extend(extract_stream(&self.pending));
        self.pending = tail;

        if let Some(payload) = tagged_payload(&self.pending) {
            if let Ok(message) = decode_payload(payload) {
                out.push(message);
                self.pending.clear();
            }
        }
        out
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }
}

/// Check the `ok` flag of a single-shot payload and deserialize the rest into `T`.
pub fn unwrap_envelope<T: DeserializeOwned>(mut message: Message) -> Result<T, BridgeError> {
    match message.remove("ok") {
        Some(Value::Bool(true)) => {}
        Some(Value::Bool(false)) => {
            let error = match message.remove("error") {
                Some(Value::String(text)) => text,
                Some(other) if !other.is_null() => other.to_string(),
                _ => "unknown script error".to_owned(),
            };
            return Err(BridgeError::RemoteScript(error));
        }
        _ => return Err(BridgeError::Decode(MarkerError::Malformed("missing `ok` flag".to_owned()))),
    }
    Ok(serde_json::from_value(Value::Object(message))?)
}
