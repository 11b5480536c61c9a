// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Append-only session journal, one JSON object per line.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

pub const AUDIT_FILE_NAME: &str = "session.jsonl";

/// Current UTC time at millisecond precision, e.g. `2026-10-14T09:30:00.123Z`.
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Serialize)]
struct AuditRow<'a> {
    ts: String,
    session_id: &'a str,
    event: &'a str,
    dwg: Option<&'a str>,
    payload: &'a Value,
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    session_id: String,
}

impl AuditLog {
    /// Journal at `<session_dir>/session.jsonl`.
    pub fn new(session_dir: &Path, session_id: impl Into<String>) -> Self {
        if let Err(err) = fs::create_dir_all(session_dir) {
            tracing::warn!(dir = %session_dir.display(), %err, "could not create session directory");
        }
        Self { path: session_dir.join(AUDIT_FILE_NAME), session_id: session_id.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append one row. Failures are logged and otherwise ignored.
    pub fn record(&self, event: &str, payload: Value, dwg: Option<&str>) {
        let row = AuditRow { ts: iso_now(), session_id: &self.session_id, event, dwg, payload: &payload };
        if let Err(err) = self.append(&row) {
            tracing::warn!(path = %self.path.display(), event, %err, "audit write failed");
        }
    }

    fn append(&self, row: &AuditRow<'_>) -> std::io::Result<()> {
        let mut line = serde_json::to_string(row)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}
