// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::output::{OutputStream, StreamMode};
use crate::script::{DxfPair, TypedValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StreamSummary {
    pub stream_id: String,
    pub mode: StreamMode,
    pub logfile_path: Option<String>,
    pub cursor: u64,
    pub started_by_server: bool,
    pub buffered_chunks: usize,
}

impl From<&OutputStream> for StreamSummary {
    fn from(stream: &OutputStream) -> Self {
        Self {
            stream_id: stream.stream_id().to_owned(),
            mode: stream.mode(),
            logfile_path: stream.logfile_path().map(|path| path.display().to_string()),
            cursor: stream.cursor(),
            started_by_server: stream.started_by_server(),
            buffered_chunks: stream.recent_chunks().count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatusReport {
    pub ts: String,
    pub session_id: String,
    pub connected: bool,
    pub dwg: Option<String>,
    pub acadver: Option<String>,
    pub acad_hwnd: Option<i64>,
    pub acad_pid: Option<u32>,
    pub default_stream: Option<StreamSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StartLoggingResponse {
    pub stream_id: String,
    pub mode: StreamMode,
    pub logfile_path: Option<String>,
    pub cursor: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StopLoggingResponse {
    pub stream_id: String,
    pub stopped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputChunkResponse {
    pub dwg: Option<String>,
    pub text: String,
    pub new_cursor: u64,
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputSource {
    #[default]
    Lastprompt,
    Logfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LastOutputResponse {
    pub dwg: Option<String>,
    pub text: String,
    pub timestamp: String,
    pub source: OutputSource,
}

/// New log output captured right after a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LogBlock {
    pub stream_id: String,
    pub cursor: u64,
    pub text: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CommandResponse {
    pub command_id: String,
    pub dwg: Option<String>,
    pub sent: String,
    pub completed: bool,
    pub needs_input: bool,
    pub last_prompt: String,
    pub log: Option<LogBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DictInfo {
    pub name: String,
    pub is_system_guess: bool,
    pub system_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DictListResponse {
    pub dicts: Vec<DictInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DictEntryInfo {
    pub key: String,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DictKeysResponse {
    pub found: bool,
    pub keys: Vec<String>,
    pub entries: Vec<DictEntryInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct RecordGetResponse {
    pub found: bool,
    pub values: Vec<DxfPair>,
}

/// Wire shape of a record read: values arrive as `[code, value]` arrays.
#[derive(Debug, Deserialize)]
pub(crate) struct RawRecordGet {
    found: bool,
    #[serde(default)]
    values: Vec<(i32, TypedValue)>,
}

impl From<RawRecordGet> for RecordGetResponse {
    fn from(raw: RawRecordGet) -> Self {
        Self {
            found: raw.found,
            values: raw.values.into_iter().map(|(code, value)| DxfPair::new(code, value)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecordSetResponse {
    pub written: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecordDeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DictDeleteResponse {
    pub deleted: bool,
    pub deleted_entries: u32,
}
