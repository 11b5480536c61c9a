// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! acad-cmd: an MCP bridge to a running AutoCAD instance.
//!
//! Commands go in through the automation endpoint; results come back by tailing the
//! command-line log and decoding tagged script output.

pub mod audit;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod marker;
pub mod mcp;
pub mod output;
pub mod script;
pub mod selection;
pub mod session;
