//! Expect engine over a hop chain.
//!
//! The terminal is prompt-agnostic: every pattern it waits for is supplied by
//! the caller. It dials the first hop through a [`Dialer`], reaches later hops
//! by typing `telnet`/`ssh` commands on the previous one, and tees all traffic
//! into the job's [`SessionLog`].

use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::channel::{Dialer, TerminalChannel};
use super::session_log::SessionLog;
use super::url::HopUrl;
use crate::constants::device::{LOGIN_TIMEOUT, MAX_PASSWORD_ATTEMPTS};
use crate::database::ConnectionType;
use crate::errors::DeviceError;

/// Text consumed by one successful expect
#[derive(Debug, Clone)]
pub struct ExpectMatch {
    /// Index of the pattern that matched
    pub index: usize,
    /// Everything received before the match
    pub before: String,
    /// The matched text itself
    pub matched: String,
}

/// Login-phase patterns, supplied by the device layer
#[derive(Debug, Clone)]
pub struct LoginPatterns {
    pub username: Regex,
    pub password: Regex,
    pub auth_failed: Regex,
    pub unable_to_connect: Regex,
    pub press_return: Regex,
    pub host_key_confirm: Regex,
    /// Prompt of an intermediate jump host shell
    pub shell_prompt: Regex,
}

pub struct Terminal {
    hops: Vec<HopUrl>,
    dialer: Arc<dyn Dialer>,
    channel: Option<Box<dyn TerminalChannel>>,
    buffer: String,
    log: SessionLog,
    connect_timeout: Duration,
    desynchronized: bool,
}

impl Terminal {
    pub fn new(
        hops: Vec<HopUrl>,
        dialer: Arc<dyn Dialer>,
        log: SessionLog,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            hops,
            dialer,
            channel: None,
            buffer: String::new(),
            log,
            connect_timeout,
            desynchronized: false,
        }
    }

    pub fn hops(&self) -> &[HopUrl] {
        &self.hops
    }

    /// Final hop, the device itself
    pub fn target(&self) -> Option<&HopUrl> {
        self.hops.last()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    pub fn session_log(&self) -> &SessionLog {
        &self.log
    }

    /// Opens every hop in order and leaves the stream at the device's login.
    /// Intermediate hops are logged into here; the device login is the
    /// caller's, because only it knows the device prompts.
    pub async fn connect(&mut self, login: &LoginPatterns) -> Result<(), DeviceError> {
        if self.hops.is_empty() {
            return Err(DeviceError::ConnectFailed {
                target: "<none>".to_string(),
                reason: "empty hop chain".to_string(),
            });
        }

        for hop in &self.hops {
            if let Some(password) = &hop.password {
                self.log.add_mask(password).await;
            }
        }

        match self.open_chain(login).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Hop chain failed: {}", e);
                self.disconnect().await;
                Err(e)
            }
        }
    }

    async fn open_chain(&mut self, login: &LoginPatterns) -> Result<(), DeviceError> {
        let hops = self.hops.clone();
        let last = hops.len() - 1;

        for (index, hop) in hops.iter().enumerate() {
            if index == 0 {
                self.log.note(&format!("CONNECT {}", hop.redacted())).await;
                let channel = self.dialer.dial(hop, self.connect_timeout).await?;
                self.channel = Some(channel);
                self.buffer.clear();
                self.desynchronized = false;
            } else {
                self.log.note(&format!("HOP {}", hop.redacted())).await;
                self.write_line(&hop.in_band_command()).await?;
            }

            if index < last {
                let prompt = [&login.shell_prompt];
                self.login(hop, login, &prompt, self.connect_timeout).await?;
                info!("Logged into jump host {}", hop.host);
            }
        }
        Ok(())
    }

    /// Drives a username/password exchange until one of `ready` matches.
    /// Returns the index of the ready pattern that ended the login.
    pub async fn login(
        &mut self,
        hop: &HopUrl,
        login: &LoginPatterns,
        ready: &[&Regex],
        timeout: Duration,
    ) -> Result<usize, DeviceError> {
        let mut patterns: Vec<&Regex> = vec![
            &login.username,
            &login.password,
            &login.auth_failed,
            &login.unable_to_connect,
            &login.press_return,
            &login.host_key_confirm,
        ];
        let fixed = patterns.len();
        patterns.extend_from_slice(ready);

        let mut password_attempts = 0usize;
        let step_timeout = timeout.max(LOGIN_TIMEOUT);

        loop {
            let found = self.expect(&patterns, step_timeout).await?;
            match found.index {
                0 => self.write_line(&hop.username).await?,
                1 => {
                    password_attempts += 1;
                    if password_attempts > MAX_PASSWORD_ATTEMPTS {
                        return Err(DeviceError::AuthFailed {
                            target: hop.target(),
                        });
                    }
                    let password = hop.password.clone().unwrap_or_default();
                    self.write_line(&password).await?;
                }
                2 => {
                    return Err(DeviceError::AuthFailed {
                        target: hop.target(),
                    })
                }
                3 => {
                    return Err(DeviceError::ConnectFailed {
                        target: hop.target(),
                        reason: found.matched.trim().to_string(),
                    })
                }
                4 => self.write_line("").await?,
                5 => self.write_line("yes").await?,
                index => {
                    debug!("Login on {} reached ready pattern {}", hop.host, index - fixed);
                    return Ok(index - fixed);
                }
            }
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), DeviceError> {
        let channel = self.channel.as_mut().ok_or(DeviceError::Disconnected)?;
        let data = format!("{}\n", line);
        self.log.record_sent(&data).await;
        if let Err(e) = channel.write_all(data.as_bytes()).await {
            self.channel = None;
            self.log.note("REMOTE CLOSED").await;
            return Err(e);
        }
        Ok(())
    }

    /// Writes `command\n` then waits for one of `patterns`. The echoed
    /// command line is stripped from the returned output.
    pub async fn send(
        &mut self,
        command: &str,
        patterns: &[&Regex],
        timeout: Duration,
    ) -> Result<ExpectMatch, DeviceError> {
        if self.desynchronized {
            return Err(DeviceError::Desynchronized);
        }
        self.write_line(command).await?;
        let mut found = self.expect(patterns, timeout).await?;
        found.before = strip_echo(&found.before, command);
        Ok(found)
    }

    /// Writes raw text without waiting, e.g. answers to confirmations
    pub async fn send_line(&mut self, line: &str) -> Result<(), DeviceError> {
        if self.desynchronized {
            return Err(DeviceError::Desynchronized);
        }
        self.write_line(line).await
    }

    /// Discards stale output and sends bare newlines until `prompt` matches.
    pub async fn resync(
        &mut self,
        prompts: &[&Regex],
        attempts: usize,
        timeout: Duration,
    ) -> Result<ExpectMatch, DeviceError> {
        let mut last_error = DeviceError::Desynchronized;
        for attempt in 1..=attempts {
            self.buffer.clear();
            self.log.note(&format!("RESYNC attempt {}", attempt)).await;
            self.write_line("").await?;
            match self.expect(prompts, timeout).await {
                Ok(found) => {
                    self.desynchronized = false;
                    return Ok(found);
                }
                Err(e @ DeviceError::Timeout { .. }) => last_error = e,
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    /// Reads until one of `patterns` matches the buffer. The earliest match
    /// wins, ties go to the lower index. On timeout the terminal becomes
    /// desynchronized.
    pub async fn expect(
        &mut self,
        patterns: &[&Regex],
        timeout: Duration,
    ) -> Result<ExpectMatch, DeviceError> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(found) = self.take_match(patterns) {
                return Ok(found);
            }

            let channel = self.channel.as_mut().ok_or(DeviceError::Disconnected)?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.timed_out(patterns, timeout));
            }

            let mut chunk = Vec::new();
            match tokio::time::timeout(remaining, channel.read_some(&mut chunk)).await {
                Ok(Ok(_)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    let text = String::from_utf8_lossy(&chunk).replace('\r', "");
                    self.log.record_received(&text).await;
                    self.buffer.push_str(&text);
                }
                Ok(Err(e)) => {
                    self.channel = None;
                    self.log.note("REMOTE CLOSED").await;
                    return Err(e);
                }
                Err(_) => return Err(self.timed_out(patterns, timeout)),
            }
        }
    }

    fn take_match(&mut self, patterns: &[&Regex]) -> Option<ExpectMatch> {
        let mut best: Option<(usize, usize, usize)> = None;
        for (index, pattern) in patterns.iter().enumerate() {
            if let Some(m) = pattern.find(&self.buffer) {
                let better = match best {
                    Some((_, start, _)) => m.start() < start,
                    None => true,
                };
                if better {
                    best = Some((index, m.start(), m.end()));
                }
            }
        }

        best.map(|(index, start, end)| {
            let before = self.buffer[..start].to_string();
            let matched = self.buffer[start..end].to_string();
            self.buffer.drain(..end);
            ExpectMatch {
                index,
                before,
                matched,
            }
        })
    }

    fn timed_out(&mut self, patterns: &[&Regex], after: Duration) -> DeviceError {
        self.desynchronized = true;
        let waiting_for = patterns
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        DeviceError::Timeout { waiting_for, after }
    }

    /// Idempotent; always safe
    pub async fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
            self.log.note("DISCONNECT").await;
        }
        self.buffer.clear();
        self.desynchronized = false;
    }
}

/// Removes the device's echo of `command` from the head of the output
fn strip_echo(output: &str, command: &str) -> String {
    let trimmed = output.trim_start_matches('\n');
    if command.is_empty() {
        return trimmed.to_string();
    }
    match trimmed.split_once('\n') {
        Some((first, rest)) if first.trim_end().ends_with(command.trim()) => rest.to_string(),
        None if trimmed.trim_end().ends_with(command.trim()) => String::new(),
        _ => trimmed.to_string(),
    }
}

/// Scheme-aware name for logs
pub fn describe_chain(hops: &[HopUrl]) -> String {
    hops.iter()
        .map(|hop| match hop.scheme {
            ConnectionType::Telnet => format!("telnet:{}", hop.target()),
            ConnectionType::Ssh => format!("ssh:{}", hop.target()),
        })
        .collect::<Vec<_>>()
        .join(" -> ")
}
