//! Device session: the prompt automaton layered over a [`Terminal`].

use regex::Regex;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::prompts::PromptSet;
use crate::constants::commands::COMMIT_FAILED;
use crate::constants::device::RESYNC_ATTEMPTS;
use crate::errors::DeviceError;
use crate::transport::{ExpectMatch, SessionLog, Terminal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// Hop chain open and logged in, paging not yet disabled
    Connected,
    Exec,
    Admin,
    Config,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connected => "connected",
            SessionState::Exec => "exec",
            SessionState::Admin => "admin",
            SessionState::Config => "config",
        };
        f.write_str(name)
    }
}

/// How to leave configuration mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigExit {
    End,
    Commit,
    Abort,
}

pub struct DeviceSession {
    terminal: Terminal,
    prompts: PromptSet,
    state: SessionState,
    command_timeout: Duration,
    /// Commands that needed admin mode during this session
    elevated: Vec<String>,
}

impl DeviceSession {
    pub fn new(terminal: Terminal, prompts: PromptSet, command_timeout: Duration) -> Self {
        Self {
            terminal,
            prompts,
            state: SessionState::Disconnected,
            command_timeout,
            elevated: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    pub fn session_log(&self) -> &SessionLog {
        self.terminal.session_log()
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn elevated_commands(&self) -> &[String] {
        &self.elevated
    }

    /// Current prompt of the automaton
    fn current_prompt(&self) -> &Regex {
        match self.state {
            SessionState::Admin => &self.prompts.admin,
            SessionState::Config => &self.prompts.config,
            _ => &self.prompts.exec,
        }
    }

    /// Opens the hop chain, logs into the device and disables paging.
    #[instrument(skip(self))]
    pub async fn connect(&mut self) -> Result<(), DeviceError> {
        if self.state != SessionState::Disconnected {
            return Ok(());
        }

        let login = self.prompts.login.clone();
        self.terminal.connect(&login).await?;

        let target = match self.terminal.target() {
            Some(hop) => hop.clone(),
            None => return Err(DeviceError::Disconnected),
        };

        let exec = self.prompts.exec.clone();
        if let Err(e) = self
            .terminal
            .login(&target, &login, &[&exec], self.command_timeout)
            .await
        {
            self.terminal.disconnect().await;
            return Err(e);
        }
        self.state = SessionState::Connected;
        debug!("Logged into {}", target.host);

        // Paging off is an invariant of Exec
        match self
            .terminal
            .send("terminal length 0", &[&exec], self.command_timeout)
            .await
        {
            Ok(_) => {
                self.state = SessionState::Exec;
                info!("Session to {} ready", target.host);
                Ok(())
            }
            Err(e) => {
                self.disconnect().await;
                Err(e)
            }
        }
    }

    /// Runs a command in the current mode and returns its output
    pub async fn execute(&mut self, command: &str) -> Result<String, DeviceError> {
        self.execute_with_timeout(command, self.command_timeout).await
    }

    pub async fn execute_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, DeviceError> {
        self.require_ready()?;
        let prompt = self.current_prompt().clone();
        let found = self.terminal.send(command, &[&prompt], timeout).await?;
        self.check_syntax(command, &found.before)?;
        Ok(found.before)
    }

    /// Sends a command and waits for either one of `extra` or the current
    /// prompt. Used for dialogs such as reload confirmations. An `index`
    /// equal to `extra.len()` means the prompt came back.
    pub async fn execute_expecting(
        &mut self,
        command: &str,
        extra: &[&Regex],
        timeout: Duration,
    ) -> Result<ExpectMatch, DeviceError> {
        self.require_ready()?;
        let prompt = self.current_prompt().clone();
        let mut patterns: Vec<&Regex> = extra.to_vec();
        patterns.push(&prompt);
        let found = self.terminal.send(command, &patterns, timeout).await?;
        self.check_syntax(command, &found.before)?;
        Ok(found)
    }

    /// Waits for more output without sending anything
    pub async fn expect(
        &mut self,
        patterns: &[&Regex],
        timeout: Duration,
    ) -> Result<ExpectMatch, DeviceError> {
        self.terminal.expect(patterns, timeout).await
    }

    /// Answers a dialog without waiting for the result
    pub async fn answer(&mut self, line: &str) -> Result<(), DeviceError> {
        self.terminal.send_line(line).await
    }

    /// Runs one command in admin mode and returns to Exec
    pub async fn execute_elevated(&mut self, command: &str) -> Result<String, DeviceError> {
        let was_exec = self.state == SessionState::Exec;
        if was_exec {
            self.enter_admin().await?;
        }
        if !self.elevated.iter().any(|c| c == command) {
            self.elevated.push(command.to_string());
        }
        let result = self.execute(command).await;
        if was_exec && self.state == SessionState::Admin {
            self.exit_admin().await?;
        }
        result
    }

    pub async fn enter_admin(&mut self) -> Result<(), DeviceError> {
        self.expect_state(SessionState::Exec, "admin")?;
        let admin = self.prompts.admin.clone();
        let found = self.terminal.send("admin", &[&admin], self.command_timeout).await?;
        self.check_syntax("admin", &found.before)?;
        self.state = SessionState::Admin;
        Ok(())
    }

    pub async fn exit_admin(&mut self) -> Result<(), DeviceError> {
        self.expect_state(SessionState::Admin, "exit")?;
        let exec = self.prompts.exec.clone();
        self.terminal.send("exit", &[&exec], self.command_timeout).await?;
        self.state = SessionState::Exec;
        Ok(())
    }

    pub async fn enter_config(&mut self) -> Result<(), DeviceError> {
        self.expect_state(SessionState::Exec, "configure")?;
        let config = self.prompts.config.clone();
        let found = self
            .terminal
            .send("configure", &[&config], self.command_timeout)
            .await?;
        self.check_syntax("configure", &found.before)?;
        self.state = SessionState::Config;
        Ok(())
    }

    /// Leaves configuration mode. A rejected commit aborts the candidate
    /// configuration and fails with the device's reason. When the exec
    /// prompt does not show up in time the terminal is resynchronized
    /// against it.
    pub async fn leave_config(&mut self, how: ConfigExit) -> Result<(), DeviceError> {
        self.expect_state(SessionState::Config, "leave configuration")?;
        let config = self.prompts.config.clone();
        let mut rejected = None;
        if how == ConfigExit::Commit {
            let found = self
                .terminal
                .send("commit", &[&config], self.command_timeout)
                .await?;
            self.check_syntax("commit", &found.before)?;
            rejected = found
                .before
                .lines()
                .find(|line| line.contains(COMMIT_FAILED))
                .map(|line| line.trim().to_string());
        }

        let command = match (how, &rejected) {
            (ConfigExit::Abort, _) | (ConfigExit::Commit, Some(_)) => "abort",
            _ => "end",
        };
        self.return_to_exec(command).await?;

        match rejected {
            Some(reason) => Err(DeviceError::operation_failed(reason)),
            None => Ok(()),
        }
    }

    async fn return_to_exec(&mut self, command: &str) -> Result<(), DeviceError> {
        let exec = self.prompts.exec.clone();
        match self.terminal.send(command, &[&exec], self.command_timeout).await {
            Ok(_) => {
                self.state = SessionState::Exec;
                Ok(())
            }
            Err(DeviceError::Timeout { .. }) => {
                warn!("No exec prompt after '{}', resynchronizing", command);
                self.state = SessionState::Exec;
                self.resync().await
            }
            Err(e) => Err(e),
        }
    }

    /// Brings a desynchronized terminal back to the current prompt. If the
    /// prompt does not come back the session is torn down.
    pub async fn resync(&mut self) -> Result<(), DeviceError> {
        if self.state == SessionState::Disconnected {
            return Err(DeviceError::Disconnected);
        }
        let prompt = self.current_prompt().clone();
        match self
            .terminal
            .resync(&[&prompt], RESYNC_ATTEMPTS, self.command_timeout)
            .await
        {
            Ok(_) => {
                info!("Terminal resynchronized in {} mode", self.state);
                Ok(())
            }
            Err(e) => {
                warn!("Resync failed ({}), disconnecting", e);
                self.terminal.disconnect().await;
                self.state = SessionState::Disconnected;
                Err(DeviceError::Disconnected)
            }
        }
    }

    /// Returns to Exec when possible, then closes the hop chain. Idempotent.
    pub async fn disconnect(&mut self) {
        if self.terminal.is_connected() && !self.terminal.is_desynchronized() {
            let outcome = match self.state {
                SessionState::Config => self.leave_config(ConfigExit::Abort).await,
                SessionState::Admin => self.exit_admin().await,
                _ => Ok(()),
            };
            if let Err(e) = outcome {
                debug!("Could not return to exec before disconnect: {}", e);
            }
        }
        self.terminal.disconnect().await;
        self.state = SessionState::Disconnected;
    }

    /// True when the stream is closed but the state machine did not go
    /// through `disconnect`, e.g. the device reloaded
    pub fn link_lost(&self) -> bool {
        self.state != SessionState::Disconnected && !self.terminal.is_connected()
    }

    pub fn mark_disconnected(&mut self) {
        self.state = SessionState::Disconnected;
    }

    fn require_ready(&self) -> Result<(), DeviceError> {
        match self.state {
            SessionState::Disconnected | SessionState::Connected => Err(DeviceError::Disconnected),
            _ => Ok(()),
        }
    }

    fn expect_state(&self, wanted: SessionState, action: &str) -> Result<(), DeviceError> {
        if self.state == SessionState::Disconnected {
            return Err(DeviceError::Disconnected);
        }
        if self.state != wanted {
            return Err(DeviceError::operation_failed(format!(
                "cannot {} from {} mode",
                action, self.state
            )));
        }
        Ok(())
    }

    fn check_syntax(&self, command: &str, output: &str) -> Result<(), DeviceError> {
        if let Some(marker) = self.prompts.syntax_error.find(output) {
            return Err(DeviceError::CommandSyntaxError {
                command: command.to_string(),
                marker: marker.as_str().trim().to_string(),
            });
        }
        Ok(())
    }
}
