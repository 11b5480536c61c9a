// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Command-line flags with environment fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::endpoint::ConnectOptions;
use crate::session::SessionConfig;

fn parse_seconds(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw.trim().parse().map_err(|err| format!("{raw:?}: {err}"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("{raw:?} is not a non-negative duration"))
}

#[derive(Parser, Debug, Clone)]
#[command(name = "acad-cmd")]
#[command(about = "MCP server for the AutoCAD command line, its log output and drawing dictionaries")]
#[command(version)]
pub struct Cli {
    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Directory for per-session log files and the audit journal
    #[arg(long, env = "AUTOCAD_MCP_LOG_DIR", value_name = "DIR", default_value = "logs/acad-cmd")]
    pub log_dir: PathBuf,

    /// Only attach to instances of this major version (e.g. 25)
    #[arg(long, env = "AUTOCAD_MCP_TARGET_MAJOR", value_name = "MAJOR")]
    pub target_major: Option<u32>,

    /// Try the registered current version before the versioned identities
    #[arg(long, env = "AUTOCAD_MCP_PREFER_CURVER")]
    pub prefer_curver: bool,

    /// Executable to launch when no running instance can be attached
    #[arg(long, env = "AUTOCAD_MCP_ACAD_EXE", value_name = "FILE")]
    pub acad_exe: Option<PathBuf>,

    /// Whitespace-separated arguments for the launched executable
    #[arg(long, env = "AUTOCAD_MCP_ACAD_ARGS", value_name = "ARGS", allow_hyphen_values = true)]
    pub acad_args: Option<String>,

    /// Seconds to keep attaching after a launch
    #[arg(
        long,
        env = "AUTOCAD_MCP_LAUNCH_WAIT_SEC",
        value_name = "SECS",
        default_value = "30",
        value_parser = parse_seconds
    )]
    pub launch_wait: Duration,

    /// Leave the application window hidden after attaching
    #[arg(long)]
    pub hidden: bool,

    /// Serve MCP over streamable HTTP at `http://127.0.0.1:<port>/mcp` instead of stdio
    /// (0 = ephemeral)
    #[arg(long, value_name = "PORT")]
    pub mcp_http_port: Option<u16>,
}

impl Cli {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            target_major: self.target_major,
            prefer_registry_alias: self.prefer_curver,
            visible: !self.hidden,
            launch_exe: self.acad_exe.clone(),
            launch_args: self
                .acad_args
                .as_deref()
                .map(|args| args.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_default(),
            launch_wait: self.launch_wait,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig { log_dir: self.log_dir.clone(), connect: self.connect_options() }
    }
}
