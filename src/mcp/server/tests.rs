// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeSet;

use rmcp::model::ErrorCode;
use tempfile::TempDir;

use super::*;
use crate::endpoint::testing::FakeHost;
use crate::endpoint::{ConnectOptions, Variable};

fn server_with(host: &FakeHost) -> (TempDir, AcadMcp) {
    let dir = tempfile::tempdir().expect("temp dir");
    let log = dir.path().join("acad.log");
    host.set_variable("LOGFILENAME", Variable::from(log.to_str().expect("utf-8 path")));
    let config =
        SessionConfig { log_dir: dir.path().join("sessions"), connect: ConnectOptions::default() };
    let session = AcadSession::new(host.connector(), config);
    (dir, AcadMcp::new(session))
}

fn error_kind(err: &ErrorData) -> Option<&str> {
    err.data.as_ref().and_then(|data| data.get("kind")).and_then(|kind| kind.as_str())
}

#[test]
fn tools_advertise_descriptions_and_schemas() {
    let tools = AcadMcp::tool_router().list_all();
    assert!(!tools.is_empty(), "expected at least one tool");

    let mut missing_description = Vec::new();
    let mut missing_output_schema = Vec::new();
    let mut non_object_input_schema = Vec::new();
    let mut seen_names = BTreeSet::new();

    for tool in tools {
        let name = tool.name.to_string();
        assert!(seen_names.insert(name.clone()), "duplicate tool name: {name}");

        if tool.description.as_deref().map(|desc| desc.trim().is_empty()).unwrap_or(true) {
            missing_description.push(name.clone());
        }
        if tool.input_schema.get("type").and_then(|v| v.as_str()) != Some("object") {
            non_object_input_schema.push(name.clone());
        }
        match tool.output_schema.as_ref() {
            Some(schema) if schema.get("type").and_then(|v| v.as_str()) == Some("object") => {}
            _ => missing_output_schema.push(name.clone()),
        }
    }

    assert!(missing_description.is_empty(), "tools without description: {missing_description:?}");
    assert!(
        missing_output_schema.is_empty(),
        "tools without object output schema: {missing_output_schema:?}"
    );
    assert!(
        non_object_input_schema.is_empty(),
        "tools with non-object input schema: {non_object_input_schema:?}"
    );

    let expected = [
        "dict_delete",
        "dict_keys",
        "dict_list",
        "dict_record_delete",
        "dict_record_get",
        "dict_record_set",
        "get_last_output",
        "get_new_output_since",
        "get_status",
        "load_script_file",
        "run_expr",
        "selection",
        "send_command",
        "start_logging",
        "stop_logging",
    ];
    assert_eq!(seen_names.iter().map(String::as_str).collect::<Vec<_>>(), expected);
}

#[tokio::test(start_paused = true)]
async fn logging_round_trip_through_tools() {
    let host = FakeHost::running();
    let (_dir, server) = server_with(&host);

    let Json(started) = server
        .start_logging(Parameters(StartLoggingParams { reset: Some(true), ..Default::default() }))
        .await
        .expect("start_logging");
    assert_eq!(started.mode, StreamMode::Logfile);
    assert_eq!(started.cursor, 0);

    let Json(sent) = server
        .send_command(Parameters(SendCommandParams {
            command: "(+ 1 2)".into(),
            wait: None,
            timeout_sec: None,
            poll_interval_sec: None,
        }))
        .await
        .expect("send_command");
    assert!(sent.completed);
    let log = sent.log.expect("log block");
    assert_eq!(log.text, "Command: (+ 1 2)\n");

    let Json(again) = server
        .get_new_output_since(Parameters(GetNewOutputSinceParams {
            stream_id: started.stream_id.clone(),
            cursor: log.cursor,
            max_bytes: None,
        }))
        .await
        .expect("get_new_output_since");
    assert_eq!(again.text, "");
    assert_eq!(again.new_cursor, log.cursor);
    assert!(!again.truncated);

    let Json(status) = server.get_status().await.expect("get_status");
    assert_eq!(status.default_stream.map(|s| s.stream_id), Some(started.stream_id.clone()));

    let Json(stopped) = server
        .stop_logging(Parameters(StopLoggingParams { stream_id: started.stream_id }))
        .await
        .expect("stop_logging");
    assert!(stopped.stopped);
}

#[tokio::test(start_paused = true)]
async fn unknown_stream_maps_to_invalid_params() {
    let host = FakeHost::running();
    let (_dir, server) = server_with(&host);

    let err = server
        .get_new_output_since(Parameters(GetNewOutputSinceParams {
            stream_id: "nope".into(),
            cursor: 0,
            max_bytes: Some(10),
        }))
        .await
        .err().expect("tool error");
    assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    assert_eq!(error_kind(&err), Some("unknown_stream"));
}

#[tokio::test(start_paused = true)]
async fn connection_failures_are_internal_errors() {
    let host = FakeHost::new();
    let (_dir, server) = server_with(&host);

    let err = server
        .run_expr(Parameters(RunExprParams { expr: "(+ 1 2)".into(), wait: None, timeout_sec: None }))
        .await
        .err().expect("tool error");
    assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    assert_eq!(error_kind(&err), Some("connection_failure"));
}

#[tokio::test(start_paused = true)]
async fn negative_timeouts_are_rejected() {
    let host = FakeHost::running();
    let (_dir, server) = server_with(&host);

    let err = server
        .send_command(Parameters(SendCommandParams {
            command: "LINE".into(),
            wait: Some(true),
            timeout_sec: Some(-1.0),
            poll_interval_sec: None,
        }))
        .await
        .err().expect("tool error");
    assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    assert!(host.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_dict_name_maps_to_invalid_params() {
    let host = FakeHost::running();
    let (_dir, server) = server_with(&host);

    let err = server
        .dict_record_get(Parameters(DictRecordParams { dict_name: "".into(), key: "A".into() }))
        .await
        .err().expect("tool error");
    assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    assert_eq!(error_kind(&err), Some("validation"));
}

#[tokio::test(start_paused = true)]
async fn last_output_defaults_to_the_prompt_line() {
    let host = FakeHost::running();
    host.set_variable("LASTPROMPT", Variable::from("Specify next point or [Undo]:"));
    let (_dir, server) = server_with(&host);

    let Json(last) = server
        .get_last_output(Parameters(GetLastOutputParams::default()))
        .await
        .expect("get_last_output");
    assert_eq!(last.source, OutputSource::Lastprompt);
    assert_eq!(last.text, "Specify next point or [Undo]:");
}

#[test]
fn selection_params_accept_a_filter_of_code_value_pairs() {
    let params: SelectionParams = serde_json::from_value(serde_json::json!({
        "filter": [{"code": 0, "value": "LINE"}, {"code": 10, "value": [1.0, 2.0, 0.0]}],
        "max_objects": 1,
    }))
    .expect("params");
    let filter = params.filter.expect("filter");
    assert_eq!(filter.len(), 2);
    assert_eq!(filter[0].code, 0);
    assert_eq!(params.max_objects, Some(1));
    assert_eq!(params.timeout_sec, None);
}
