// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Scriptable in-process stand-in for the CAD application.
//!
//! Like the real application, it appends command echo and script output to the file named by
//! `LOGFILENAME` while `LOGFILEMODE` is 1.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Automation, Connector, EndpointError, Variable};

type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

struct FakeState {
    attachable: BTreeSet<String>,
    register_on_launch: Option<String>,
    registry_alias: Option<String>,
    attach_attempts: Vec<String>,
    launches: Vec<(PathBuf, Vec<String>)>,
    document_alive: bool,
    variables: BTreeMap<String, Variable>,
    sent: Vec<String>,
    busy_calls: u32,
    busy_polls: u32,
    fail_set_variable: bool,
    responder: Option<Responder>,
}

impl FakeState {
    fn take_busy(&mut self) -> Result<(), EndpointError> {
        if self.busy_calls > 0 {
            self.busy_calls -= 1;
            return Err(EndpointError::Busy);
        }
        Ok(())
    }

    fn log_path(&self) -> Option<PathBuf> {
        if self.variables.get("LOGFILEMODE").and_then(Variable::as_int) != Some(1) {
            return None;
        }
        match self.variables.get("LOGFILENAME") {
            Some(Variable::Text(path)) if !path.is_empty() => Some(PathBuf::from(path)),
            _ => None,
        }
    }
}

/// Handle shared between a test and the connector/endpoint built from it.
#[derive(Clone)]
pub(crate) struct FakeHost {
    state: Arc<Mutex<FakeState>>,
}

impl FakeHost {
    pub(crate) fn new() -> Self {
        let mut variables = BTreeMap::new();
        variables.insert("ACADVER".to_owned(), Variable::from("25.0s (LMS Tech)"));
        variables.insert("CMDACTIVE".to_owned(), Variable::Int(0));
        variables.insert("LOGFILEMODE".to_owned(), Variable::Int(0));
        variables.insert("LASTPROMPT".to_owned(), Variable::from("Command:"));
        variables.insert("ERRNO".to_owned(), Variable::Int(0));

        Self {
            state: Arc::new(Mutex::new(FakeState {
                attachable: BTreeSet::new(),
                register_on_launch: None,
                registry_alias: None,
                attach_attempts: Vec::new(),
                launches: Vec::new(),
                document_alive: true,
                variables,
                sent: Vec::new(),
                busy_calls: 0,
                busy_polls: 0,
                fail_set_variable: false,
                responder: None,
            })),
        }
    }

    /// Host that is attachable right away under a current versioned identity.
    pub(crate) fn running() -> Self {
        let host = Self::new();
        host.make_attachable("AutoCAD.Application.25");
        host
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake host lock poisoned")
    }

    pub(crate) fn connector(&self) -> Box<dyn Connector> {
        Box::new(FakeConnector { host: self.clone() })
    }

    pub(crate) fn make_attachable(&self, identity: &str) {
        self.lock().attachable.insert(identity.to_owned());
    }

    pub(crate) fn register_on_launch(&self, identity: &str) {
        self.lock().register_on_launch = Some(identity.to_owned());
    }

    pub(crate) fn set_registry_alias(&self, alias: &str) {
        self.lock().registry_alias = Some(alias.to_owned());
    }

    pub(crate) fn attach_attempts(&self) -> Vec<String> {
        self.lock().attach_attempts.clone()
    }

    pub(crate) fn launches(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.lock().launches.clone()
    }

    pub(crate) fn kill_document(&self) {
        self.lock().document_alive = false;
    }

    pub(crate) fn set_variable(&self, name: &str, value: Variable) {
        self.lock().variables.insert(name.to_owned(), value);
    }

    pub(crate) fn variable(&self, name: &str) -> Option<Variable> {
        self.lock().variables.get(name).cloned()
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// The next `count` endpoint calls of any kind are rejected as busy.
    pub(crate) fn reject_next_calls(&self, count: u32) {
        self.lock().busy_calls = count;
    }

    /// The next `count` quiescence polls report the application as busy.
    pub(crate) fn stay_busy_for_polls(&self, count: u32) {
        self.lock().busy_polls = count;
    }

    pub(crate) fn fail_set_variable(&self) {
        self.lock().fail_set_variable = true;
    }

    /// Lines the application "prints" in response to each submitted command text.
    pub(crate) fn respond_with(&self, responder: impl FnMut(&str) -> Vec<String> + Send + 'static) {
        self.lock().responder = Some(Box::new(responder));
    }

    /// Append raw text to the active log file, as asynchronous application output would.
    pub(crate) fn append_log(&self, text: &str) {
        let state = self.lock();
        if let Some(path) = state.log_path() {
            append(&path, text);
        }
    }
}

fn append(path: &Path, text: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("open fake log file");
    file.write_all(text.as_bytes()).expect("append fake log file");
}

struct FakeConnector {
    host: FakeHost,
}

impl Connector for FakeConnector {
    fn attach(&mut self, identity: &str) -> Result<Box<dyn Automation>, EndpointError> {
        let mut state = self.host.lock();
        state.take_busy()?;
        state.attach_attempts.push(identity.to_owned());
        if !state.attachable.contains(identity) {
            return Err(EndpointError::Unavailable(identity.to_owned()));
        }
        state.document_alive = true;
        Ok(Box::new(FakeEndpoint { host: self.host.clone() }))
    }

    fn registry_alias(&mut self) -> Option<String> {
        self.host.lock().registry_alias.clone()
    }

    fn launch(&mut self, exe: &Path, args: &[String]) -> Result<(), EndpointError> {
        let mut state = self.host.lock();
        state.launches.push((exe.to_path_buf(), args.to_vec()));
        if let Some(identity) = state.register_on_launch.take() {
            state.attachable.insert(identity);
        }
        Ok(())
    }
}

struct FakeEndpoint {
    host: FakeHost,
}

impl FakeEndpoint {
    fn with_state<T>(
        &mut self,
        op: impl FnOnce(&mut FakeState) -> Result<T, EndpointError>,
    ) -> Result<T, EndpointError> {
        let mut state = self.host.lock();
        state.take_busy()?;
        op(&mut state)
    }
}

impl Automation for FakeEndpoint {
    fn set_visible(&mut self, _visible: bool) -> Result<(), EndpointError> {
        self.with_state(|_| Ok(()))
    }

    fn document_name(&mut self) -> Result<String, EndpointError> {
        self.with_state(|state| {
            if state.document_alive {
                Ok("Drawing1.dwg".to_owned())
            } else {
                Err(EndpointError::Call("RPC server unavailable".to_owned()))
            }
        })
    }

    fn document_path(&mut self) -> Result<String, EndpointError> {
        self.with_state(|_| Ok(String::new()))
    }

    fn get_variable(&mut self, name: &str) -> Result<Variable, EndpointError> {
        self.with_state(|state| {
            state
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| EndpointError::Call(format!("unknown variable {name}")))
        })
    }

    fn set_variable(&mut self, name: &str, value: Variable) -> Result<(), EndpointError> {
        self.with_state(|state| {
            if state.fail_set_variable {
                return Err(EndpointError::Call("SetVariable blocked".to_owned()));
            }
            state.variables.insert(name.to_owned(), value);
            Ok(())
        })
    }

    fn send_command(&mut self, text: &str) -> Result<(), EndpointError> {
        self.with_state(|state| {
            state.sent.push(text.to_owned());
            let lines = match state.responder.as_mut() {
                Some(responder) => responder(text),
                None => vec![format!("Command: {}", text.trim_end())],
            };
            if let Some(path) = state.log_path() {
                let mut out = String::new();
                for line in lines {
                    out.push_str(&line);
                    out.push('\n');
                }
                append(&path, &out);
            }
            Ok(())
        })
    }

    fn is_quiescent(&mut self) -> Result<bool, EndpointError> {
        self.with_state(|state| {
            if state.busy_polls > 0 {
                state.busy_polls -= 1;
                return Ok(false);
            }
            Ok(true)
        })
    }

    fn window_handle(&mut self) -> Result<Option<i64>, EndpointError> {
        self.with_state(|_| Ok(Some(0x1234)))
    }

    fn process_id(&mut self) -> Option<u32> {
        Some(4242)
    }
}
