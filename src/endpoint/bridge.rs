// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::{sleep, Instant};

use super::{
    candidate_identities, parse_version_major, Automation, Connector, EndpointError, RetryPolicy,
    Variable,
};
use crate::error::BridgeError;

const LAUNCH_ATTACH_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    /// Only accept instances whose `ACADVER` major matches.
    pub target_major: Option<u32>,
    pub prefer_registry_alias: bool,
    pub visible: bool,
    /// Executable started when no running instance can be attached.
    pub launch_exe: Option<PathBuf>,
    pub launch_args: Vec<String>,
    pub launch_wait: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            target_major: None,
            prefer_registry_alias: false,
            visible: true,
            launch_exe: None,
            launch_args: Vec::new(),
            launch_wait: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    pub completed: bool,
    /// The command is still active after the timeout, most likely waiting on user input.
    pub needs_input: bool,
    pub quiescent: bool,
}

/// Owner of the single endpoint handle.
pub struct Bridge {
    connector: Box<dyn Connector>,
    options: ConnectOptions,
    retry: RetryPolicy,
    endpoint: Option<Box<dyn Automation>>,
}

impl Bridge {
    pub fn new(connector: Box<dyn Connector>, options: ConnectOptions) -> Self {
        Self { connector, options, retry: RetryPolicy::default(), endpoint: None }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn is_attached(&self) -> bool {
        self.endpoint.is_some()
    }

    fn candidates(&mut self) -> Vec<String> {
        let alias =
            if self.options.prefer_registry_alias { self.connector.registry_alias() } else { None };
        candidate_identities(self.options.target_major, alias.as_deref())
    }

    async fn try_attach(&mut self, identity: &str) -> Result<Box<dyn Automation>, EndpointError> {
        let retry = self.retry;
        let visible = self.options.visible;
        let connector = &mut self.connector;
        let mut endpoint = retry.run(|| connector.attach(identity)).await?;
        retry.run(|| endpoint.set_visible(visible)).await?;
        retry.run(|| endpoint.document_name()).await?;

        if let Some(target) = self.options.target_major {
            let version = retry.run(|| endpoint.get_variable("ACADVER")).await?;
            let major = parse_version_major(&version.to_string());
            if major != Some(target) {
                return Err(EndpointError::Unavailable(format!(
                    "{identity} reports ACADVER {version:?}, expected major {target}"
                )));
            }
        }

        Ok(endpoint)
    }

    async fn attach_any(&mut self) -> bool {
        for identity in self.candidates() {
            match self.try_attach(&identity).await {
                Ok(endpoint) => {
                    tracing::info!(%identity, "attached to automation endpoint");
                    self.endpoint = Some(endpoint);
                    return true;
                }
                Err(err) => tracing::debug!(%identity, %err, "candidate rejected"),
            }
        }
        false
    }

    /// Attach to the best candidate, launching the configured executable as a last resort.
    pub async fn connect(&mut self) -> bool {
        self.endpoint = None;
        if self.attach_any().await {
            return true;
        }

        let exe = self.options.launch_exe.clone().filter(|exe| exe.exists());
        if let Some(exe) = exe {
            tracing::info!(exe = %exe.display(), "no running instance attachable; launching");
            let args = self.options.launch_args.clone();
            if let Err(err) = self.connector.launch(&exe, &args) {
                tracing::warn!(%err, "launch failed");
            }

            let started = Instant::now();
            while started.elapsed() < self.options.launch_wait {
                if self.attach_any().await {
                    return true;
                }
                sleep(LAUNCH_ATTACH_INTERVAL).await;
            }
        }

        tracing::warn!("no automation endpoint could be attached");
        false
    }

    /// Keep the current handle if a liveness probe succeeds, otherwise reconnect.
    pub async fn ensure_connection(&mut self) -> bool {
        let retry = self.retry;
        if let Some(endpoint) = self.endpoint.as_mut() {
            if retry.run(|| endpoint.document_name()).await.is_ok() {
                return true;
            }
            tracing::warn!("endpoint liveness probe failed; reconnecting");
            self.endpoint = None;
        }
        self.connect().await
    }

    async fn call_attached<T, F>(&mut self, mut op: F) -> Result<T, BridgeError>
    where
        F: FnMut(&mut dyn Automation) -> Result<T, EndpointError>,
    {
        let retry = self.retry;
        let endpoint = self.endpoint.as_deref_mut().ok_or(BridgeError::NotConnected)?;
        Ok(retry.run(|| op(&mut *endpoint)).await?)
    }

    async fn call<T, F>(&mut self, op: F) -> Result<T, BridgeError>
    where
        F: FnMut(&mut dyn Automation) -> Result<T, EndpointError>,
    {
        if !self.ensure_connection().await {
            return Err(BridgeError::NotConnected);
        }
        self.call_attached(op).await
    }

    pub async fn get_variable(&mut self, name: &str) -> Result<Variable, BridgeError> {
        self.call(|endpoint| endpoint.get_variable(name)).await
    }

    pub async fn set_variable(&mut self, name: &str, value: Variable) -> Result<(), BridgeError> {
        self.call(|endpoint| endpoint.set_variable(name, value.clone())).await
    }

    /// Submit `text` to the command line and return a fresh command id without waiting.
    pub async fn send_command(&mut self, text: &str) -> Result<String, BridgeError> {
        let text = terminate_command(text);
        self.call(|endpoint| endpoint.send_command(&text)).await?;
        Ok(uuid::Uuid::new_v4().to_string())
    }

    /// Poll until the application is quiescent with no active command, or `timeout` elapses.
    pub async fn wait_for_idle(
        &mut self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<WaitOutcome, BridgeError> {
        if !self.ensure_connection().await {
            return Err(BridgeError::NotConnected);
        }

        let started = Instant::now();
        loop {
            let quiescent = self.call_attached(|endpoint| endpoint.is_quiescent()).await;
            let quiescent = quiescent.unwrap_or(false);
            let cmdactive = self.command_active_attached().await;

            if quiescent && cmdactive == Some(0) {
                return Ok(WaitOutcome { completed: true, needs_input: false, quiescent: true });
            }

            if started.elapsed() >= timeout {
                tracing::debug!(quiescent, ?cmdactive, "idle wait timed out");
                return Ok(WaitOutcome {
                    completed: false,
                    needs_input: cmdactive != Some(0),
                    quiescent,
                });
            }

            sleep(poll_interval).await;
        }
    }

    async fn command_active_attached(&mut self) -> Option<i64> {
        let value = self.call_attached(|endpoint| endpoint.get_variable("CMDACTIVE")).await;
        value.ok().and_then(|value| value.as_int())
    }

    /// Current `CMDACTIVE` value; `None` when it cannot be read.
    pub async fn command_active(&mut self) -> Option<i64> {
        self.get_variable("CMDACTIVE").await.ok().and_then(|value| value.as_int())
    }

    pub async fn last_prompt(&mut self) -> String {
        match self.get_variable("LASTPROMPT").await {
            Ok(value) => value.to_string(),
            Err(err) => {
                tracing::debug!(%err, "LASTPROMPT unavailable");
                String::new()
            }
        }
    }

    pub async fn version(&mut self) -> Option<String> {
        self.get_variable("ACADVER").await.ok().and_then(Variable::into_text)
    }

    /// `<path>/<name>` of the active drawing, or just its name for unsaved drawings.
    pub async fn drawing_label(&mut self) -> Option<String> {
        let name = self.call(|endpoint| endpoint.document_name()).await.ok()?;
        let path = self.call_attached(|endpoint| endpoint.document_path()).await.unwrap_or_default();
        if path.is_empty() {
            Some(name)
        } else {
            Some(Path::new(&path).join(name).display().to_string())
        }
    }

    pub async fn window_handle(&mut self) -> Option<i64> {
        self.call(|endpoint| endpoint.window_handle()).await.ok().flatten()
    }

    pub fn process_id(&mut self) -> Option<u32> {
        self.endpoint.as_deref_mut().and_then(|endpoint| endpoint.process_id())
    }
}

/// Append exactly one trailing newline. A leading blank line would repeat the previous
/// command, so nothing is ever prepended.
pub(crate) fn terminate_command(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_owned()
    } else {
        format!("{text}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::testing::FakeHost;

    fn bridge(host: &FakeHost, options: ConnectOptions) -> Bridge {
        Bridge::new(host.connector(), options)
    }

    #[test]
    fn terminate_command_appends_single_newline() {
        assert_eq!(terminate_command("LINE"), "LINE\n");
        assert_eq!(terminate_command("LINE\n"), "LINE\n");
        assert_eq!(terminate_command(""), "\n");
        assert_eq!(terminate_command("(+ 1 2)\n\n"), "(+ 1 2)\n\n");
    }

    #[tokio::test(start_paused = true)]
    async fn pinned_candidate_is_tried_before_generic() {
        let host = FakeHost::new();
        host.set_registry_alias("AutoCAD.Application.24");
        host.make_attachable("AutoCAD.Application");
        host.set_variable("ACADVER", Variable::from("24.0s (LMS Tech)"));

        let mut bridge = bridge(
            &host,
            ConnectOptions {
                target_major: Some(24),
                prefer_registry_alias: true,
                ..ConnectOptions::default()
            },
        );
        assert!(bridge.connect().await);

        let attempts = host.attach_attempts();
        let pinned = attempts.iter().position(|id| id == "AutoCAD.Application.24").unwrap();
        let generic = attempts.iter().position(|id| id == "AutoCAD.Application").unwrap();
        assert_eq!(pinned, 0);
        assert!(pinned < generic);
        assert_eq!(generic, attempts.len() - 1);
    }

    #[tokio::test(start_paused = true)]
    async fn version_mismatch_rejects_candidate() {
        let host = FakeHost::new();
        host.make_attachable("AutoCAD.Application.23");
        host.set_variable("ACADVER", Variable::from("23.1s (LMS Tech)"));

        let mut bridge = bridge(
            &host,
            ConnectOptions { target_major: Some(24), ..ConnectOptions::default() },
        );
        assert!(!bridge.connect().await);
        assert!(!bridge.is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_absorbs_busy_rejections() {
        let host = FakeHost::new();
        host.make_attachable("AutoCAD.Application.25");
        host.reject_next_calls(5);

        let mut bridge = bridge(&host, ConnectOptions::default());
        assert!(bridge.connect().await);
        assert_eq!(bridge.drawing_label().await.as_deref(), Some("Drawing1.dwg"));
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_connection_reattaches_after_failed_probe() {
        let host = FakeHost::new();
        host.make_attachable("AutoCAD.Application.25");

        let mut bridge = bridge(&host, ConnectOptions::default());
        assert!(bridge.ensure_connection().await);
        let first_round = host.attach_attempts().len();

        host.kill_document();
        assert!(bridge.ensure_connection().await);
        assert!(host.attach_attempts().len() > first_round);
    }

    #[tokio::test(start_paused = true)]
    async fn accessors_fail_with_not_connected() {
        let host = FakeHost::new();
        let mut bridge = bridge(&host, ConnectOptions::default());

        let err = bridge.get_variable("CMDACTIVE").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected));
        assert_eq!(bridge.last_prompt().await, "");
    }

    #[tokio::test(start_paused = true)]
    async fn launch_fallback_waits_for_instance_to_register() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = tmp.path().join("acad.exe");
        std::fs::write(&exe, b"").unwrap();

        let host = FakeHost::new();
        host.register_on_launch("AutoCAD.Application.25");

        let mut bridge = bridge(
            &host,
            ConnectOptions {
                launch_exe: Some(exe.clone()),
                launch_args: vec!["/nologo".to_owned()],
                ..ConnectOptions::default()
            },
        );
        assert!(bridge.connect().await);
        assert_eq!(host.launches(), vec![(exe, vec!["/nologo".to_owned()])]);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_launch_wait_does_not_overflow_the_deadline() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = tmp.path().join("acad.exe");
        std::fs::write(&exe, b"").unwrap();

        let host = FakeHost::new();
        host.register_on_launch("AutoCAD.Application.25");

        let mut bridge = bridge(
            &host,
            ConnectOptions { launch_exe: Some(exe), launch_wait: Duration::MAX, ..ConnectOptions::default() },
        );
        assert!(bridge.connect().await);
    }

    #[tokio::test(start_paused = true)]
    async fn send_command_terminates_text() {
        let host = FakeHost::new();
        host.make_attachable("AutoCAD.Application.25");
        let mut bridge = bridge(&host, ConnectOptions::default());

        let first = bridge.send_command("(+ 1 2)").await.unwrap();
        let second = bridge.send_command("REGEN\n").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(host.sent(), vec!["(+ 1 2)\n".to_owned(), "REGEN\n".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_idle_completes_once_both_signals_clear() {
        let host = FakeHost::new();
        host.make_attachable("AutoCAD.Application.25");
        host.stay_busy_for_polls(3);
        let mut bridge = bridge(&host, ConnectOptions::default());

        let outcome = bridge
            .wait_for_idle(Duration::from_secs(10), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome { completed: true, needs_input: false, quiescent: true });
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_idle_reports_needs_input_on_timeout() {
        let host = FakeHost::new();
        host.make_attachable("AutoCAD.Application.25");
        host.set_variable("CMDACTIVE", Variable::Int(1));
        let mut bridge = bridge(&host, ConnectOptions::default());

        let started = Instant::now();
        let outcome = bridge
            .wait_for_idle(Duration::from_secs(2), Duration::from_millis(100))
            .await
            .unwrap();
        assert!(!outcome.completed);
        assert!(outcome.needs_input);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
