// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use super::*;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use regex::Regex;
use rmcp::transport::{
    streamable_http_server::session::local::LocalSessionManager, StreamableHttpServerConfig,
    StreamableHttpService,
};

use crate::endpoint::testing::FakeHost;
use crate::endpoint::{ConnectOptions, Variable};

struct Harness {
    _dir: tempfile::TempDir,
    host: FakeHost,
    server: AcadMcp,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let host = FakeHost::running();
        let log = dir.path().join("acad.log");
        host.set_variable("LOGFILENAME", Variable::from(log.to_str().expect("utf-8 path")));
        let config = SessionConfig {
            log_dir: dir.path().join("sessions"),
            connect: ConnectOptions::default(),
        };
        let server = AcadMcp::new(AcadSession::new(host.connector(), config));
        Self { _dir: dir, host, server }
    }
}

async fn call_over_http(server: &AcadMcp, body: serde_json::Value) -> String {
    let config = StreamableHttpServerConfig {
        stateful_mode: false,
        sse_keep_alive: None,
        ..StreamableHttpServerConfig::default()
    };
    let session_manager = Arc::new(LocalSessionManager::default());
    let service = {
        let server = server.clone();
        StreamableHttpService::new(move || Ok(server.clone()), session_manager, config)
    };

    let response = service
        .handle(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header(axum::http::header::ACCEPT, "application/json, text/event-stream")
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let bytes = tokio::time::timeout(
        Duration::from_secs(3),
        to_bytes(Body::new(response.into_body()), usize::MAX),
    )
    .await
    .expect("timeout collecting response body")
    .expect("collect response body");
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn e2e_get_status_over_streamable_http() {
    let harness = Harness::new();
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": { "name": "get_status", "arguments": {} }
    });

    let text = call_over_http(&harness.server, body).await;
    assert!(text.contains("structuredContent"), "unexpected response: {text}");
    assert!(text.contains("Drawing1.dwg"));
    assert!(text.contains("25.0s (LMS Tech)"));
}

#[tokio::test]
async fn e2e_send_command_over_streamable_http_is_audited() {
    let harness = Harness::new();
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "tools/call",
        "params": {
            "name": "send_command",
            "arguments": { "command": "REGEN", "timeout_sec": 1.0 }
        }
    });

    let text = call_over_http(&harness.server, body).await;
    assert!(text.contains("\"completed\":true"), "unexpected response: {text}");
    assert_eq!(harness.host.sent(), vec!["REGEN\n".to_owned()]);

    let session = harness.server.session.lock().await;
    let journal = std::fs::read_to_string(session.audit().path()).expect("audit journal");
    assert!(journal.contains("\"event\":\"send_command\""));
    assert!(journal.contains("\"event\":\"send_command_result\""));
}

/// Selection driven end to end through the tool handler: nothing preselected, the user picks
/// one object at the prompt.
#[tokio::test(start_paused = true)]
async fn e2e_selection_prompts_and_returns_the_picked_object() {
    let harness = Harness::new();
    let implied = Regex::new(r#"mcp-selection-implied-lite "([^"]+)""#).expect("regex");
    let prompt = Regex::new(r#"mcp-selection-prompt "([^"]+)""#).expect("regex");
    harness.host.respond_with(move |text| {
        let tag = |req: &str, body: serde_json::Value| {
            let mut body = body;
            body["req_id"] = serde_json::json!(req);
            format!("[MCP:JSON]{body}")
        };
        if let Some(caps) = implied.captures(text) {
            let req = &caps[1];
            return vec![
                tag(req, serde_json::json!({"event": "start", "phase": "implied", "errno": 0})),
                tag(req, serde_json::json!({"event": "done", "count": 0})),
            ];
        }
        if let Some(caps) = prompt.captures(text) {
            let req = &caps[1];
            return vec![
                "Select objects:".to_owned(),
                tag(req, serde_json::json!({"event": "start", "phase": "prompt", "errno": 0})),
                tag(req, serde_json::json!({"event": "item_begin", "index": 0, "handle": "2A", "type": "LINE"})),
                tag(req, serde_json::json!({"event": "done", "count": 1})),
            ];
        }
        Vec::new()
    });

    let Json(outcome) = harness
        .server
        .selection(Parameters(SelectionParams { max_objects: Some(1), ..Default::default() }))
        .await
        .expect("selection");
    assert_eq!(outcome.count, 1);
    assert!(!outcome.timed_out);
    assert_eq!(outcome.objects.len(), 1);
    assert_eq!(outcome.objects[0].handle.as_deref(), Some("2A"));
    assert_eq!(outcome.objects[0].object_type.as_deref(), Some("LINE"));
}

/// Tool calls queue behind an interactive selection rather than interleaving with its prompt.
#[tokio::test(start_paused = true)]
async fn e2e_status_waits_for_a_running_selection() {
    let harness = Harness::new();
    let implied = Regex::new(r#"mcp-selection-implied-lite "([^"]+)""#).expect("regex");
    harness.host.respond_with(move |text| match implied.captures(text) {
        Some(caps) => vec![format!(r#"[MCP:JSON]{{"req_id":"{}","event":"done","count":0}}"#, &caps[1])],
        // The prompt never finishes; the selection runs into its timeout.
        None => Vec::new(),
    });

    let server = harness.server.clone();
    let selection = tokio::spawn(async move {
        server
            .selection(Parameters(SelectionParams { timeout_sec: Some(20.0), ..Default::default() }))
            .await
    });
    while harness.server.session.try_lock().is_ok() {
        tokio::task::yield_now().await;
    }

    let started = tokio::time::Instant::now();
    let Json(status) = harness.server.get_status().await.expect("status");
    assert!(status.connected);
    assert!(started.elapsed() >= Duration::from_secs(15), "status did not wait: {:?}", started.elapsed());

    let Json(outcome) = selection.await.expect("join").expect("selection");
    assert!(outcome.timed_out);
    assert_eq!(outcome.phase, crate::selection::SelectionPhase::Prompt);
}
