// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Access to the CAD application's automation endpoint.
//!
//! The endpoint itself is a black box reached through [`Connector`] (find and attach to an
//! instance) and [`Automation`] (talk to the attached instance). [`Bridge`] owns the single
//! live handle and layers candidate selection, liveness checks and busy-retry on top.

use std::fmt;
use std::path::Path;

use thiserror::Error;

mod bridge;
#[cfg(windows)]
mod com;
mod identity;
mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{Bridge, ConnectOptions, WaitOutcome};
pub use identity::{candidate_identities, parse_version_major, GENERIC_IDENTITY};
pub use retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// The endpoint is processing another call and rejected this one. Retryable.
    #[error("endpoint is busy processing another call")]
    Busy,
    #[error("no endpoint available for `{0}`")]
    Unavailable(String),
    #[error("{0}")]
    Call(String),
}

impl EndpointError {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

/// Value of a system variable as reported by the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Empty,
    Int(i64),
    Real(f64),
    Text(String),
}

impl Variable {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Real(value) if value.fract() == 0.0 => Some(*value as i64),
            Self::Text(value) => value.trim().parse().ok(),
            Self::Empty | Self::Real(_) => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Text(value) if value.is_empty() => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Int(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Variable {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<i64> for Variable {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// An attached application instance and its active document.
///
/// Every method is a single blocking call into the endpoint and may fail with
/// [`EndpointError::Busy`] while the application is processing something else.
pub trait Automation: Send {
    fn set_visible(&mut self, visible: bool) -> Result<(), EndpointError>;
    fn document_name(&mut self) -> Result<String, EndpointError>;
    fn document_path(&mut self) -> Result<String, EndpointError>;
    fn get_variable(&mut self, name: &str) -> Result<Variable, EndpointError>;
    fn set_variable(&mut self, name: &str, value: Variable) -> Result<(), EndpointError>;
    fn send_command(&mut self, text: &str) -> Result<(), EndpointError>;
    fn is_quiescent(&mut self) -> Result<bool, EndpointError>;
    fn window_handle(&mut self) -> Result<Option<i64>, EndpointError>;

    fn process_id(&mut self) -> Option<u32> {
        None
    }
}

/// Locates application instances by automation identity.
pub trait Connector: Send {
    /// Attach to an already-running instance registered under `identity`.
    fn attach(&mut self, identity: &str) -> Result<Box<dyn Automation>, EndpointError>;

    /// Identity the system registry currently aliases the generic identity to, if any.
    fn registry_alias(&mut self) -> Option<String> {
        None
    }

    fn launch(&mut self, exe: &Path, args: &[String]) -> Result<(), EndpointError> {
        std::process::Command::new(exe)
            .args(args)
            .spawn()
            .map(|_| ())
            .map_err(|err| EndpointError::Call(format!("failed to launch {}: {err}", exe.display())))
    }
}

/// Connector used on platforms without COM automation; every attach fails.
#[derive(Debug, Default)]
pub struct UnsupportedConnector;

impl Connector for UnsupportedConnector {
    fn attach(&mut self, identity: &str) -> Result<Box<dyn Automation>, EndpointError> {
        Err(EndpointError::Unavailable(format!("{identity} (COM automation requires Windows)")))
    }
}

/// Connector for the current platform.
pub fn default_connector() -> Box<dyn Connector> {
    #[cfg(windows)]
    {
        Box::new(com::ComConnector::new())
    }
    #[cfg(not(windows))]
    {
        Box::new(UnsupportedConnector)
    }
}
