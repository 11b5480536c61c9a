// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use schemars::JsonSchema;
use serde::Deserialize;

use crate::output::StreamMode;
use crate::script::DxfPair;
use crate::session::OutputSource;

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct StartLoggingParams {
    /// `logfile` (default) tails the command-line log; `lastprompt` reads nothing.
    pub mode: Option<StreamMode>,
    /// Log file to pin; defaults to the application's current `LOGFILENAME`.
    pub logfile_path: Option<String>,
    /// Truncate the log first so earlier output is never returned.
    pub reset: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct StopLoggingParams {
    pub stream_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetNewOutputSinceParams {
    pub stream_id: String,
    /// Byte offset returned by the previous read (or `start_logging`).
    pub cursor: u64,
    pub max_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct GetLastOutputParams {
    pub source: Option<OutputSource>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SendCommandParams {
    /// Raw command-line text; a trailing newline is added when missing.
    pub command: String,
    pub wait: Option<bool>,
    pub timeout_sec: Option<f64>,
    pub poll_interval_sec: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LoadScriptFileParams {
    pub path: String,
    pub wait: Option<bool>,
    pub timeout_sec: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RunExprParams {
    /// AutoLISP expression.
    pub expr: String,
    pub wait: Option<bool>,
    pub timeout_sec: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DictKeysParams {
    pub dict_name: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DictRecordParams {
    pub dict_name: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DictRecordSetParams {
    pub dict_name: String,
    pub key: String,
    /// Group code / value pairs; points are numeric arrays.
    pub values: Vec<DxfPair>,
    /// Replace an existing record (default `true`).
    pub overwrite: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DictDeleteParams {
    pub dict_name: String,
    /// Also delete a non-empty dictionary (default `true`).
    pub recursive: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SelectionParams {
    /// Overall wait for the user (default 300).
    pub timeout_sec: Option<f64>,
    pub prompt: Option<String>,
    /// Selection filter, e.g. `[{"code": 0, "value": "LINE"}]`.
    pub filter: Option<Vec<DxfPair>>,
    pub max_objects: Option<u32>,
}
