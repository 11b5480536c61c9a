// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use thiserror::Error;

use crate::endpoint::EndpointError;
use crate::marker::MarkerError;

/// Failure of a tool-facing operation. Timeouts are reported as values, never as errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to connect to the CAD application")]
    ConnectionFailure,
    #[error("not connected to the CAD application")]
    NotConnected,
    #[error("endpoint call failed: {0}")]
    Endpoint(#[from] EndpointError),
    #[error("could not decode script output: {0}")]
    Decode(#[from] MarkerError),
    #[error("script reported an error: {0}")]
    RemoteScript(String),
    #[error("{0}")]
    Validation(String),
    #[error("unknown stream id `{0}`")]
    UnknownStream(String),
    #[error("another command is active (CMDACTIVE={0}); not starting a prompt")]
    CommandActive(i64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unexpected script payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl BridgeError {
    /// Stable short name used in error data returned to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailure => "connection_failure",
            Self::NotConnected => "not_connected",
            Self::Endpoint(EndpointError::Busy) => "busy",
            Self::Endpoint(_) => "endpoint",
            Self::Decode(_) => "decode",
            Self::RemoteScript(_) => "remote_script",
            Self::Validation(_) => "validation",
            Self::UnknownStream(_) => "unknown_stream",
            Self::CommandActive(_) => "command_active",
            Self::Io(_) => "io",
            Self::Payload(_) => "payload",
        }
    }

    /// Errors caused by the caller's arguments rather than the application.
    pub fn is_invalid_params(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::UnknownStream(_))
    }
}
