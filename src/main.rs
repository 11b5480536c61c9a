// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! acad-cmd CLI entrypoint.
//!
//! Serves MCP over stdio by default. `--mcp-http-port` serves streamable HTTP at
//! `http://127.0.0.1:<port>/mcp` instead.

use std::error::Error;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use rmcp::transport::{
    streamable_http_server::session::local::LocalSessionManager, StreamableHttpServerConfig,
    StreamableHttpService,
};

use acad_cmd::config::Cli;
use acad_cmd::endpoint::default_connector;
use acad_cmd::mcp::AcadMcp;
use acad_cmd::session::AcadSession;

async fn serve_http(mcp: AcadMcp, port: u16) -> Result<(), Box<dyn Error>> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "serving MCP over streamable HTTP at /mcp");

    let config =
        StreamableHttpServerConfig { stateful_mode: true, ..StreamableHttpServerConfig::default() };
    let shutdown = config.cancellation_token.clone();

    let session_manager = Arc::new(LocalSessionManager::default());
    let mcp_service = StreamableHttpService::new(move || Ok(mcp.clone()), session_manager, config);
    let router = Router::new().nest_service("/mcp", mcp_service);

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    acad_cmd::logging::init_logging(cli.verbose);

    let result = (|| -> Result<(), Box<dyn Error>> {
        let session = AcadSession::new(default_connector(), cli.session_config());
        tracing::info!(
            session_id = session.session_id(),
            dir = %session.session_dir().display(),
            "starting acad-cmd"
        );
        let mcp = AcadMcp::new(session);

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        match cli.mcp_http_port {
            Some(port) => runtime.block_on(serve_http(mcp, port))?,
            None => runtime.block_on(mcp.serve_stdio())?,
        }
        Ok(())
    })();

    if let Err(err) = result {
        eprintln!("acad-cmd: {err}");
        std::process::exit(1);
    }
}
