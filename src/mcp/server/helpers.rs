// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

/// Caller mistakes become `invalid_params`; everything else is an internal error. Both carry
/// the error kind.
fn tool_error(err: BridgeError) -> ErrorData {
    let data = Some(serde_json::json!({ "kind": err.kind() }));
    if err.is_invalid_params() {
        ErrorData::invalid_params(err.to_string(), data)
    } else {
        tracing::warn!(kind = err.kind(), %err, "tool call failed");
        ErrorData::internal_error(err.to_string(), data)
    }
}

/// Optional seconds parameter as a duration; negative and non-finite values are rejected.
fn seconds(name: &str, value: Option<f64>, default: Duration) -> Result<Duration, ErrorData> {
    let Some(value) = value else {
        return Ok(default);
    };
    Duration::try_from_secs_f64(value).map_err(|_| {
        ErrorData::invalid_params(
            format!("{name} must be a non-negative number of seconds"),
            Some(serde_json::json!({ "param": name, "value": value })),
        )
    })
}
