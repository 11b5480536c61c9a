// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::{Json, Parameters};
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler, ServiceExt};
use tokio::sync::Mutex;

use crate::error::BridgeError;
use crate::output::{StreamMode, DEFAULT_MAX_BYTES};
use crate::selection::{SelectionOutcome, DEFAULT_PROMPT, DEFAULT_TIMEOUT};
use crate::session::*;

use super::types::*;

#[derive(Clone)]
pub struct AcadMcp {
    session: Arc<Mutex<AcadSession>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl AcadMcp {
    pub fn new(session: AcadSession) -> Self {
        Self { session: Arc::new(Mutex::new(session)), tool_router: Self::tool_router() }
    }

    pub async fn serve_stdio(self) -> Result<(), rmcp::RmcpError> {
        let service = self.serve((tokio::io::stdin(), tokio::io::stdout())).await?;
        service.waiting().await?;
        Ok(())
    }

    /// Connection state, active drawing, `ACADVER`, window handle, process id and the default
    /// log stream. Connects (or launches) on demand.
    #[tool(name = "get_status")]
    async fn get_status(&self) -> Result<Json<StatusReport>, ErrorData> {
        let mut session = self.session.lock().await;
        Ok(Json(session.status().await))
    }

    /// Start a log stream and make it the default; `reset` drops earlier log content. Returns
    /// the `stream_id` and the starting `cursor` for `get_new_output_since`.
    #[tool(name = "start_logging")]
    async fn start_logging(
        &self,
        params: Parameters<StartLoggingParams>,
    ) -> Result<Json<StartLoggingResponse>, ErrorData> {
        let StartLoggingParams { mode, logfile_path, reset } = params.0;
        let mut session = self.session.lock().await;
        session
            .start_logging(
                mode.unwrap_or(StreamMode::Logfile),
                logfile_path.map(PathBuf::from),
                reset.unwrap_or(false),
            )
            .await
            .map(Json)
            .map_err(tool_error)
    }

    /// Stop a log stream. Unknown ids report `stopped: false`.
    #[tool(name = "stop_logging")]
    async fn stop_logging(
        &self,
        params: Parameters<StopLoggingParams>,
    ) -> Result<Json<StopLoggingResponse>, ErrorData> {
        let mut session = self.session.lock().await;
        session.stop_logging(&params.0.stream_id).await.map(Json).map_err(tool_error)
    }

    /// Log text appended after `cursor`, at most `max_bytes` (default 65536). Pass the returned
    /// `new_cursor` to the next call; `truncated` means more is waiting.
    #[tool(name = "get_new_output_since")]
    async fn get_new_output_since(
        &self,
        params: Parameters<GetNewOutputSinceParams>,
    ) -> Result<Json<OutputChunkResponse>, ErrorData> {
        let GetNewOutputSinceParams { stream_id, cursor, max_bytes } = params.0;
        let mut session = self.session.lock().await;
        session
            .read_new_output(&stream_id, cursor, max_bytes.unwrap_or(DEFAULT_MAX_BYTES))
            .await
            .map(Json)
            .map_err(tool_error)
    }

    /// The current prompt line (`lastprompt`, default) or the tail of the default log stream
    /// (`logfile`).
    #[tool(name = "get_last_output")]
    async fn get_last_output(
        &self,
        params: Parameters<GetLastOutputParams>,
    ) -> Result<Json<LastOutputResponse>, ErrorData> {
        let mut session = self.session.lock().await;
        let source = params.0.source.unwrap_or_default();
        session.last_output(source).await.map(Json).map_err(tool_error)
    }

    /// Send raw command-line text. With `wait` (default) polls until idle; `needs_input` means
    /// the command is still waiting on the user. `log` holds new output of the default stream.
    #[tool(name = "send_command")]
    async fn send_command(
        &self,
        params: Parameters<SendCommandParams>,
    ) -> Result<Json<CommandResponse>, ErrorData> {
        let SendCommandParams { command, wait, timeout_sec, poll_interval_sec } = params.0;
        let timeout = seconds("timeout_sec", timeout_sec, DEFAULT_COMMAND_TIMEOUT)?;
        let poll = seconds("poll_interval_sec", poll_interval_sec, DEFAULT_POLL_INTERVAL)?;
        let mut session = self.session.lock().await;
        session
            .send_command(&command, wait.unwrap_or(true), timeout, poll)
            .await
            .map(Json)
            .map_err(tool_error)
    }

    /// Load an AutoLISP file by path.
    #[tool(name = "load_script_file")]
    async fn load_script_file(
        &self,
        params: Parameters<LoadScriptFileParams>,
    ) -> Result<Json<CommandResponse>, ErrorData> {
        let LoadScriptFileParams { path, wait, timeout_sec } = params.0;
        let timeout = seconds("timeout_sec", timeout_sec, DEFAULT_COMMAND_TIMEOUT)?;
        let mut session = self.session.lock().await;
        session
            .load_script_file(&path, wait.unwrap_or(true), timeout)
            .await
            .map(Json)
            .map_err(tool_error)
    }

    /// Evaluate an AutoLISP expression wrapped in start/end markers; `marker_id` locates its
    /// output in the log.
    #[tool(name = "run_expr")]
    async fn run_expr(
        &self,
        params: Parameters<RunExprParams>,
    ) -> Result<Json<CommandResponse>, ErrorData> {
        let RunExprParams { expr, wait, timeout_sec } = params.0;
        let timeout = seconds("timeout_sec", timeout_sec, DEFAULT_COMMAND_TIMEOUT)?;
        let mut session = self.session.lock().await;
        session.run_expr(&expr, wait.unwrap_or(true), timeout).await.map(Json).map_err(tool_error)
    }

    /// Named dictionaries of the drawing, with a guess whether each belongs to the application.
    #[tool(name = "dict_list")]
    async fn dict_list(&self) -> Result<Json<DictListResponse>, ErrorData> {
        let mut session = self.session.lock().await;
        session.dict_list().await.map(Json).map_err(tool_error)
    }

    /// Keys and entry types of one named dictionary.
    #[tool(name = "dict_keys")]
    async fn dict_keys(
        &self,
        params: Parameters<DictKeysParams>,
    ) -> Result<Json<DictKeysResponse>, ErrorData> {
        let mut session = self.session.lock().await;
        session.dict_keys(&params.0.dict_name).await.map(Json).map_err(tool_error)
    }

    /// Read an xrecord as `{code, value}` pairs; structural group codes are skipped.
    #[tool(name = "dict_record_get")]
    async fn dict_record_get(
        &self,
        params: Parameters<DictRecordParams>,
    ) -> Result<Json<RecordGetResponse>, ErrorData> {
        let DictRecordParams { dict_name, key } = params.0;
        let mut session = self.session.lock().await;
        session.record_get(&dict_name, &key).await.map(Json).map_err(tool_error)
    }

    /// Write an xrecord, creating the dictionary as needed.
    #[tool(name = "dict_record_set")]
    async fn dict_record_set(
        &self,
        params: Parameters<DictRecordSetParams>,
    ) -> Result<Json<RecordSetResponse>, ErrorData> {
        let DictRecordSetParams { dict_name, key, values, overwrite } = params.0;
        let mut session = self.session.lock().await;
        session
            .record_set(&dict_name, &key, &values, overwrite.unwrap_or(true))
            .await
            .map(Json)
            .map_err(tool_error)
    }

    #[tool(name = "dict_record_delete", description = "Delete one entry of a named dictionary.")]
    async fn dict_record_delete(
        &self,
        params: Parameters<DictRecordParams>,
    ) -> Result<Json<RecordDeleteResponse>, ErrorData> {
        let DictRecordParams { dict_name, key } = params.0;
        let mut session = self.session.lock().await;
        session.record_delete(&dict_name, &key).await.map(Json).map_err(tool_error)
    }

    /// Delete a named dictionary; without `recursive` it must be empty.
    #[tool(name = "dict_delete")]
    async fn dict_delete(
        &self,
        params: Parameters<DictDeleteParams>,
    ) -> Result<Json<DictDeleteResponse>, ErrorData> {
        let DictDeleteParams { dict_name, recursive } = params.0;
        let mut session = self.session.lock().await;
        let recursive = recursive.unwrap_or(true);
        session.dict_delete(&dict_name, recursive).await.map(Json).map_err(tool_error)
    }

    /// Objects the user selected: the current pickfirst set if there is one, otherwise an
    /// interactive prompt that waits up to `timeout_sec` (default 300). Returns `{handle, type}`
    /// per object, and `cancelled` when the user dismissed the prompt. Calls are handled one at
    /// a time, so other tools wait until the selection returns.
    #[tool(name = "selection")]
    async fn selection(
        &self,
        params: Parameters<SelectionParams>,
    ) -> Result<Json<SelectionOutcome>, ErrorData> {
        let SelectionParams { timeout_sec, prompt, filter, max_objects } = params.0;
        let request = SelectionRequest {
            timeout: seconds("timeout_sec", timeout_sec, DEFAULT_TIMEOUT)?,
            prompt: prompt
                .filter(|prompt| !prompt.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PROMPT.to_owned()),
            filter,
            max_objects: max_objects.unwrap_or(SelectionRequest::default().max_objects),
        };
        let mut session = self.session.lock().await;
        session.selection(request).await.map(Json).map_err(tool_error)
    }
}

#[tool_handler]
impl ServerHandler for AcadMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "AutoCAD command-line bridge (tools: get_status, start_logging, stop_logging, get_new_output_since, get_last_output, send_command, load_script_file, run_expr, dict_list, dict_keys, dict_record_get, dict_record_set, dict_record_delete, dict_delete, selection). Start a logfile stream before sending commands to receive their output. Tool calls run one at a time; an interactive selection holds the session until it returns."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// Parameter conversion and error mapping for the tool handlers.
include!("server/helpers.rs");

#[cfg(test)]
mod e2e;

#[cfg(test)]
mod tests;
