// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! The per-process session: one endpoint bridge, its log streams and the audit journal.
//!
//! Every tool-facing operation lives here. The MCP layer only converts parameters and errors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::time::{sleep, Instant};

use crate::audit::{iso_now, AuditLog};
use crate::endpoint::{Bridge, ConnectOptions, Connector, Variable};
use crate::error::BridgeError;
use crate::marker::{
    extract_single, invocation_slice, unwrap_envelope, LineAssembler, MarkerError, Message,
};
use crate::output::{OutputStreamManager, StreamMode, DEFAULT_MAX_BYTES, DEFAULT_TAIL_BYTES};
use crate::script::{self, DxfPair};
use crate::selection::{
    EventCollector, SelectionOutcome, SelectionPhase, SelectionState, IMPLIED_PHASE_LIMIT,
    POLL_INTERVAL, SETTLE_TIMEOUT,
};

mod responses;

pub use responses::*;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long a library call keeps re-reading the log for a payload that has not arrived yet.
const PAYLOAD_GRACE: Duration = Duration::from_secs(2);
/// `CMDACTIVE` value assumed when the variable cannot be read.
const UNKNOWN_CMDACTIVE: i64 = 999;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Parent of the per-session directory holding the default log file and the audit journal.
    pub log_dir: PathBuf,
    pub connect: ConnectOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { log_dir: PathBuf::from("logs").join("acad-cmd"), connect: ConnectOptions::default() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionRequest {
    pub timeout: Duration,
    pub prompt: String,
    pub filter: Option<Vec<DxfPair>>,
    pub max_objects: u32,
}

impl Default for SelectionRequest {
    fn default() -> Self {
        Self {
            timeout: crate::selection::DEFAULT_TIMEOUT,
            prompt: crate::selection::DEFAULT_PROMPT.to_owned(),
            filter: None,
            max_objects: 1000,
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), BridgeError> {
    if value.trim().is_empty() {
        return Err(BridgeError::Validation(format!("{field} must be non-empty")));
    }
    Ok(())
}

struct TemporaryStream {
    stream_id: String,
    previous_default: Option<String>,
}

pub struct AcadSession {
    session_id: String,
    bridge: Bridge,
    streams: OutputStreamManager,
    audit: AuditLog,
}

impl AcadSession {
    pub fn new(connector: Box<dyn Connector>, config: SessionConfig) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let session_dir = config.log_dir.join(&session_id);
        tracing::info!(%session_id, dir = %session_dir.display(), "session created");
        Self {
            bridge: Bridge::new(connector, config.connect),
            streams: OutputStreamManager::new(&session_dir),
            audit: AuditLog::new(&session_dir, session_id.clone()),
            session_id,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn session_dir(&self) -> &Path {
        self.streams.base_dir()
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn streams(&self) -> &OutputStreamManager {
        &self.streams
    }

    async fn require_connection(&mut self) -> Result<(), BridgeError> {
        if self.bridge.ensure_connection().await {
            Ok(())
        } else {
            Err(BridgeError::ConnectionFailure)
        }
    }

    /// Drawing label for journal rows; never triggers a connection attempt.
    async fn current_drawing(&mut self) -> Option<String> {
        if self.bridge.is_attached() {
            self.bridge.drawing_label().await
        } else {
            None
        }
    }

    pub async fn status(&mut self) -> StatusReport {
        let connected = self.bridge.ensure_connection().await;
        let (dwg, acadver, acad_hwnd, acad_pid) = if connected {
            (
                self.bridge.drawing_label().await,
                self.bridge.version().await,
                self.bridge.window_handle().await,
                self.bridge.process_id(),
            )
        } else {
            (None, None, None, None)
        };
        StatusReport {
            ts: iso_now(),
            session_id: self.session_id.clone(),
            connected,
            dwg,
            acadver,
            acad_hwnd,
            acad_pid,
            default_stream: self.streams.default_stream().map(StreamSummary::from),
        }
    }

    async fn logfile_name(&mut self) -> Option<PathBuf> {
        let value = self.bridge.get_variable("LOGFILENAME").await.ok()?;
        value.into_text().map(PathBuf::from)
    }

    /// Set a system variable, falling back to a `setvar` script when the automation call is
    /// refused.
    async fn set_variable_or_script(
        &mut self,
        name: &str,
        value: Variable,
        lisp_value: String,
    ) -> Result<(), BridgeError> {
        match self.bridge.set_variable(name, value).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(name, %err, "SetVariable failed; falling back to setvar");
                self.bridge.send_command(&script::setvar(name, &lisp_value)).await.map(|_| ())
            }
        }
    }

    async fn enable_logfile(&mut self, pinned: Option<&Path>) -> Result<(), BridgeError> {
        if let Some(path) = pinned {
            let text = path.display().to_string();
            let lisp = script::lisp_string(&text.replace('\\', "/"));
            self.set_variable_or_script("LOGFILENAME", Variable::Text(text), lisp).await?;
        }
        self.set_variable_or_script("LOGFILEMODE", Variable::Int(1), "1".to_owned()).await
    }

    pub async fn start_logging(
        &mut self,
        mode: StreamMode,
        logfile_path: Option<PathBuf>,
        reset: bool,
    ) -> Result<StartLoggingResponse, BridgeError> {
        self.require_connection().await?;
        let stream_id = uuid::Uuid::new_v4().to_string();
        let dwg = self.bridge.drawing_label().await;

        if mode == StreamMode::Lastprompt {
            self.streams.start_lastprompt_stream(stream_id.clone());
            self.audit.record("start_logging", json!({ "mode": mode }), dwg.as_deref());
            return Ok(StartLoggingResponse { stream_id, mode, logfile_path: None, cursor: 0 });
        }

        let pinned = logfile_path.filter(|path| !path.as_os_str().is_empty());
        let already_enabled =
            self.bridge.get_variable("LOGFILEMODE").await.ok().and_then(|v| v.as_int()) == Some(1);

        let mut path = match &pinned {
            Some(path) => path.clone(),
            None => match self.logfile_name().await {
                Some(current) => current,
                None => self.streams.default_logfile_path(),
            },
        };

        if let Err(err) = self.enable_logfile(pinned.as_deref()).await {
            if pinned.is_some() {
                return Err(err);
            }
            tracing::warn!(%err, "could not enable command-line logging");
        }

        // The application may normalize or override the file name.
        if pinned.is_none() {
            if let Some(current) = self.logfile_name().await {
                path = current;
            }
        }

        let started_by_server = !already_enabled;
        if started_by_server {
            self.streams.mark_logging_enabled_by_server();
        }
        let stream =
            self.streams.start_logfile_stream(stream_id.clone(), path, reset, started_by_server);
        let cursor = stream.cursor();
        let logfile_path = stream.logfile_path().map(|path| path.display().to_string());

        self.audit.record(
            "start_logging",
            json!({ "mode": mode, "logfile_path": logfile_path, "cursor": cursor, "reset": reset }),
            dwg.as_deref(),
        );
        Ok(StartLoggingResponse { stream_id, mode, logfile_path, cursor })
    }

    pub async fn stop_logging(
        &mut self,
        stream_id: &str,
    ) -> Result<StopLoggingResponse, BridgeError> {
        let stopped = self.streams.stop(stream_id);

        if stopped.as_ref().is_some_and(|stream| stream.mode() == StreamMode::Logfile)
            && self.streams.release_logging_if_unused()
        {
            if self.bridge.ensure_connection().await {
                let off = self.set_variable_or_script("LOGFILEMODE", Variable::Int(0), "0".into());
                if let Err(err) = off.await {
                    tracing::warn!(%err, "could not disable command-line logging");
                }
            } else {
                tracing::warn!("not connected; command-line logging left enabled");
            }
        }

        let stopped = stopped.is_some();
        let dwg = self.current_drawing().await;
        self.audit.record(
            "stop_logging",
            json!({ "stream_id": stream_id, "stopped": stopped }),
            dwg.as_deref(),
        );
        Ok(StopLoggingResponse { stream_id: stream_id.to_owned(), stopped })
    }

    pub async fn read_new_output(
        &mut self,
        stream_id: &str,
        cursor: u64,
        max_bytes: u64,
    ) -> Result<OutputChunkResponse, BridgeError> {
        let chunk = self.streams.read_new(stream_id, cursor, max_bytes)?;
        let dwg = self.current_drawing().await;
        self.audit.record(
            "get_new_output_since",
            json!({
                "stream_id": stream_id,
                "cursor": cursor,
                "new_cursor": chunk.new_cursor,
                "bytes": chunk.text.len(),
            }),
            dwg.as_deref(),
        );
        Ok(OutputChunkResponse {
            dwg,
            text: chunk.text,
            new_cursor: chunk.new_cursor,
            truncated: chunk.truncated,
        })
    }

    pub async fn last_output(
        &mut self,
        source: OutputSource,
    ) -> Result<LastOutputResponse, BridgeError> {
        let text = match source {
            OutputSource::Logfile => match self.streams.default_stream() {
                Some(stream) => {
                    let id = stream.stream_id().to_owned();
                    self.streams.read_tail(&id, DEFAULT_TAIL_BYTES)?
                }
                None => String::new(),
            },
            OutputSource::Lastprompt => {
                self.require_connection().await?;
                self.bridge.last_prompt().await
            }
        };
        let dwg = self.current_drawing().await;
        self.audit.record(
            "get_last_output",
            json!({ "source": source, "bytes": text.len() }),
            dwg.as_deref(),
        );
        Ok(LastOutputResponse { dwg, text, timestamp: iso_now(), source })
    }

    pub async fn send_command(
        &mut self,
        command: &str,
        wait: bool,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<CommandResponse, BridgeError> {
        // An empty line repeats the previous command.
        require_non_empty("command", command)?;
        self.require_connection().await?;
        let dwg = self.bridge.drawing_label().await;
        let command_id = self.bridge.send_command(command).await?;
        self.audit.record(
            "send_command",
            json!({
                "command_id": command_id,
                "command": command,
                "wait": wait,
                "timeout_sec": timeout.as_secs_f64(),
            }),
            dwg.as_deref(),
        );

        let (completed, needs_input) = if wait {
            let outcome = self.bridge.wait_for_idle(timeout, poll_interval).await?;
            (outcome.completed, outcome.needs_input)
        } else {
            (false, false)
        };

        let last_prompt = self.bridge.last_prompt().await;
        let log = self.read_default_log()?;

        self.audit.record(
            "send_command_result",
            json!({
                "command_id": command_id,
                "completed": completed,
                "needs_input": needs_input,
                "last_prompt": last_prompt,
                "has_log": log.is_some(),
            }),
            dwg.as_deref(),
        );

        Ok(CommandResponse {
            command_id,
            dwg,
            sent: command.to_owned(),
            completed,
            needs_input,
            last_prompt,
            log,
            marker_id: None,
        })
    }

    /// Everything appended to the default logfile stream since its cursor.
    fn read_default_log(&mut self) -> Result<Option<LogBlock>, BridgeError> {
        let Some(stream) = self.streams.default_logfile_stream() else {
            return Ok(None);
        };
        let stream_id = stream.stream_id().to_owned();
        let cursor = stream.cursor();
        let chunk = self.streams.read_new(&stream_id, cursor, DEFAULT_MAX_BYTES)?;
        Ok(Some(LogBlock {
            stream_id,
            cursor: chunk.new_cursor,
            text: chunk.text,
            truncated: chunk.truncated,
        }))
    }

    pub async fn load_script_file(
        &mut self,
        path: &str,
        wait: bool,
        timeout: Duration,
    ) -> Result<CommandResponse, BridgeError> {
        require_non_empty("path", path)?;
        let command = script::load_command(Path::new(path))?;
        self.require_connection().await?;
        let dwg = self.bridge.drawing_label().await;
        self.audit.record(
            "load_script_file",
            json!({ "path": path, "command": command }),
            dwg.as_deref(),
        );
        self.send_command(&command, wait, timeout, DEFAULT_POLL_INTERVAL).await
    }

    pub async fn run_expr(
        &mut self,
        expr: &str,
        wait: bool,
        timeout: Duration,
    ) -> Result<CommandResponse, BridgeError> {
        require_non_empty("expr", expr)?;
        self.require_connection().await?;
        let dwg = self.bridge.drawing_label().await;
        let marker_id = uuid::Uuid::new_v4().to_string();
        self.audit.record(
            "run_expr",
            json!({ "expr": expr, "marker_id": marker_id }),
            dwg.as_deref(),
        );
        let wrapped = crate::marker::wrap(expr, &marker_id);
        let mut response = self.send_command(&wrapped, wait, timeout, DEFAULT_POLL_INTERVAL).await?;
        response.marker_id = Some(marker_id);
        Ok(response)
    }

    /// Make sure a logfile stream is the default. A stream started here must be handed back to
    /// [`Self::release_logfile_stream`].
    async fn claim_logfile_stream(&mut self) -> Result<Option<TemporaryStream>, BridgeError> {
        if self.streams.default_logfile_stream().is_some() {
            return Ok(None);
        }
        let previous_default =
            self.streams.default_stream().map(|stream| stream.stream_id().to_owned());
        let started = self.start_logging(StreamMode::Logfile, None, false).await?;
        tracing::debug!(stream_id = %started.stream_id, "claimed temporary logfile stream");
        Ok(Some(TemporaryStream { stream_id: started.stream_id, previous_default }))
    }

    async fn release_logfile_stream(&mut self, claim: Option<TemporaryStream>) {
        let Some(TemporaryStream { stream_id, previous_default }) = claim else {
            return;
        };
        if let Err(err) = self.stop_logging(&stream_id).await {
            tracing::warn!(%stream_id, %err, "could not release temporary logfile stream");
        }
        if let Some(previous) = previous_default {
            self.streams.set_default(&previous);
        }
    }

    async fn library_call<T: DeserializeOwned>(&mut self, call: String) -> Result<T, BridgeError> {
        self.require_connection().await?;
        let claim = self.claim_logfile_stream().await?;
        let result = self.library_call_on_stream(&call).await;
        self.release_logfile_stream(claim).await;
        unwrap_envelope(result?)
    }

    async fn library_call_on_stream(&mut self, call: &str) -> Result<Message, BridgeError> {
        let response = self.run_expr(call, true, DEFAULT_COMMAND_TIMEOUT).await?;
        let marker_id = response.marker_id.unwrap_or_default();
        let Some(mut log) = response.log else {
            return Err(BridgeError::Decode(MarkerError::NotFound));
        };

        let extract = |text: &str| {
            invocation_slice(text, &marker_id).map_or(Err(MarkerError::NotFound), extract_single)
        };

        let mut last_err = match extract(&log.text) {
            Ok(message) => return Ok(message),
            Err(err) => err,
        };

        // Output can trail the idle signal; keep reading for a moment.
        let deadline = Instant::now() + PAYLOAD_GRACE;
        while Instant::now() < deadline {
            sleep(DEFAULT_POLL_INTERVAL).await;
            let chunk = self.streams.read_new(&log.stream_id, log.cursor, DEFAULT_MAX_BYTES)?;
            if chunk.text.is_empty() {
                continue;
            }
            log.cursor = chunk.new_cursor;
            log.text.push_str(&chunk.text);
            match extract(&log.text) {
                Ok(message) => return Ok(message),
                Err(err) => last_err = err,
            }
        }

        let tail = self.streams.read_tail(&log.stream_id, DEFAULT_TAIL_BYTES)?;
        match extract(&tail) {
            Ok(message) => Ok(message),
            Err(err) => {
                tracing::debug!(%marker_id, first = %last_err, tail = %err, "no library payload");
                Err(BridgeError::Decode(last_err))
            }
        }
    }

    pub async fn dict_list(&mut self) -> Result<DictListResponse, BridgeError> {
        self.library_call(script::dict_list_call()).await
    }

    pub async fn dict_keys(&mut self, dict_name: &str) -> Result<DictKeysResponse, BridgeError> {
        require_non_empty("dict_name", dict_name)?;
        self.library_call(script::dict_keys_call(dict_name)).await
    }

    pub async fn record_get(
        &mut self,
        dict_name: &str,
        key: &str,
    ) -> Result<RecordGetResponse, BridgeError> {
        require_non_empty("dict_name", dict_name)?;
        require_non_empty("key", key)?;
        let raw: RawRecordGet = self.library_call(script::xrecord_get_call(dict_name, key)).await?;
        Ok(raw.into())
    }

    pub async fn record_set(
        &mut self,
        dict_name: &str,
        key: &str,
        values: &[DxfPair],
        overwrite: bool,
    ) -> Result<RecordSetResponse, BridgeError> {
        require_non_empty("dict_name", dict_name)?;
        require_non_empty("key", key)?;
        let call = script::xrecord_set_call(dict_name, key, values, overwrite)?;
        self.library_call(call).await
    }

    pub async fn record_delete(
        &mut self,
        dict_name: &str,
        key: &str,
    ) -> Result<RecordDeleteResponse, BridgeError> {
        require_non_empty("dict_name", dict_name)?;
        require_non_empty("key", key)?;
        self.library_call(script::xrecord_delete_call(dict_name, key)).await
    }

    pub async fn dict_delete(
        &mut self,
        dict_name: &str,
        recursive: bool,
    ) -> Result<DictDeleteResponse, BridgeError> {
        require_non_empty("dict_name", dict_name)?;
        self.library_call(script::dict_delete_call(dict_name, recursive)).await
    }

    pub async fn selection(
        &mut self,
        request: SelectionRequest,
    ) -> Result<SelectionOutcome, BridgeError> {
        if request.max_objects == 0 {
            return Err(BridgeError::Validation("max_objects must be at least 1".to_owned()));
        }
        // Render the filter up front so a bad filter fails before anything is sent.
        script::filter_list(request.filter.as_deref())?;

        self.require_connection().await?;
        let claim = self.claim_logfile_stream().await?;
        let result = self.acquire_selection(&request).await;
        self.release_logfile_stream(claim).await;

        if let Ok(outcome) = &result {
            let dwg = self.current_drawing().await;
            self.audit.record(
                "selection_result",
                json!({
                    "req_id": outcome.req_id,
                    "phase": outcome.phase,
                    "count": outcome.count,
                    "timed_out": outcome.timed_out,
                    "cancelled": outcome.cancelled,
                }),
                dwg.as_deref(),
            );
        }
        result
    }

    async fn acquire_selection(
        &mut self,
        request: &SelectionRequest,
    ) -> Result<SelectionOutcome, BridgeError> {
        let stream_id = self
            .streams
            .default_logfile_stream()
            .map(|stream| stream.stream_id().to_owned())
            .ok_or(BridgeError::Decode(MarkerError::NotFound))?;
        let filter = request.filter.as_deref();
        let max_objects = request.max_objects;

        let req_id = uuid::Uuid::new_v4().to_string();
        let call = script::selection_implied_call(&req_id, filter, max_objects)?;
        let dwg = self.bridge.drawing_label().await;
        self.audit.record(
            "selection",
            json!({
                "req_id": req_id,
                "phase": SelectionPhase::Implied,
                "max_objects": max_objects,
            }),
            dwg.as_deref(),
        );
        let limit = request.timeout.min(IMPLIED_PHASE_LIMIT);
        let (collector, cursor, timed_out) =
            self.collect_events(&stream_id, &call, &req_id, max_objects, limit).await?;
        if let Some(message) = collector.error() {
            return Err(BridgeError::RemoteScript(message.to_owned()));
        }

        match SelectionState::after_implied(timed_out, collector.found()) {
            SelectionState::PromptUser => {}
            _ => return Ok(collector.finish(timed_out, cursor, SelectionPhase::Implied)),
        }

        // Never prompt on top of somebody else's command.
        self.bridge.wait_for_idle(SETTLE_TIMEOUT, DEFAULT_POLL_INTERVAL).await?;
        let cmdactive = self.bridge.command_active().await.unwrap_or(UNKNOWN_CMDACTIVE);
        if cmdactive != 0 {
            return Err(BridgeError::CommandActive(cmdactive));
        }

        let req_id = uuid::Uuid::new_v4().to_string();
        let call = script::selection_prompt_call(&req_id, &request.prompt, filter, max_objects)?;
        self.audit.record(
            "selection",
            json!({ "req_id": req_id, "phase": SelectionPhase::Prompt, "prompt": request.prompt }),
            dwg.as_deref(),
        );
        let (collector, cursor, timed_out) =
            self.collect_events(&stream_id, &call, &req_id, max_objects, request.timeout).await?;
        if let Some(message) = collector.error() {
            return Err(BridgeError::RemoteScript(message.to_owned()));
        }
        let timed_out = SelectionState::after_prompt(timed_out) == SelectionState::TimedOut;
        Ok(collector.finish(timed_out, cursor, SelectionPhase::Prompt))
    }

    /// Send `call` without waiting for idle and follow the log until `req_id` reports `done` or
    /// `limit` elapses. Returns the collector, the final cursor and whether time ran out.
    async fn collect_events(
        &mut self,
        stream_id: &str,
        call: &str,
        req_id: &str,
        max_objects: u32,
        limit: Duration,
    ) -> Result<(EventCollector, u64, bool), BridgeError> {
        let mut cursor = self.streams.get(stream_id).map_or(0, |stream| stream.cursor());
        let mut lines = LineAssembler::new();
        let mut collector = EventCollector::new(req_id, max_objects as usize);

        self.bridge.send_command(call).await?;
        let started = Instant::now();
        loop {
            let chunk = self.streams.read_new(stream_id, cursor, DEFAULT_MAX_BYTES)?;
            cursor = chunk.new_cursor;
            collector.absorb_all(lines.push(&chunk.text));
            if collector.is_done() {
                return Ok((collector, cursor, false));
            }
            if chunk.truncated {
                continue;
            }
            if started.elapsed() >= limit {
                tracing::debug!(%req_id, found = collector.found(), "selection phase timed out");
                return Ok((collector, cursor, true));
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}
