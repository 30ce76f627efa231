//! Scripted fake router for driving sessions and handlers without a network
//!
//! A `FakeRouter` answers the login dialog, echoes commands and replies from
//! a script keyed by command prefix. Replies queued for one command are
//! consumed in order and the last one sticks, which is how install request
//! polling is simulated. Each channel tracks its own exec/admin/config mode,
//! and a router used as a jump host forwards an in-band `telnet`/`ssh` to the
//! router registered at that address.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use upgrade_manager::errors::DeviceError;
use upgrade_manager::transport::{Dialer, HopUrl, TerminalChannel};

use super::test_data::login;

const SYNTAX_ERROR: &str = "                ^\n% Invalid input detected at '^' marker.";

type RouterMap = Arc<Mutex<HashMap<String, Arc<FakeRouter>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Exec,
    Admin,
    Config,
}

enum Reply {
    Text(String),
    Silent,
    /// Output the router prints before the link goes down
    Drop(String),
}

pub struct FakeRouter {
    pub hostname: String,
    pub username: String,
    pub password: String,
    script: Mutex<HashMap<String, VecDeque<String>>>,
    silent: Mutex<HashSet<String>>,
    drops: Mutex<Vec<String>>,
    received: Mutex<Vec<String>>,
}

impl FakeRouter {
    pub fn new(hostname: &str) -> Arc<Self> {
        Self::with_login(hostname, login::USERNAME, login::PASSWORD)
    }

    pub fn with_login(hostname: &str, username: &str, password: &str) -> Arc<Self> {
        Arc::new(Self {
            hostname: hostname.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            script: Mutex::new(HashMap::new()),
            silent: Mutex::new(HashSet::new()),
            drops: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn prompt(&self) -> String {
        self.prompt_in(Mode::Exec)
    }

    pub fn prompt_in(&self, mode: Mode) -> String {
        match mode {
            Mode::Exec => format!("RP/0/RSP0/CPU0:{}#", self.hostname),
            Mode::Admin => format!("RP/0/RSP0/CPU0:{}(admin)#", self.hostname),
            Mode::Config => format!("RP/0/RSP0/CPU0:{}(config)#", self.hostname),
        }
    }

    /// Queues replies for every command starting with `command`
    pub fn reply(&self, command: &str, replies: &[&str]) -> &Self {
        let mut script = self.script.lock().unwrap();
        script
            .entry(command.to_string())
            .or_default()
            .extend(replies.iter().map(|r| r.to_string()));
        self
    }

    /// The router swallows `command` without echo or prompt
    pub fn hang_on(&self, command: &str) -> &Self {
        self.silent.lock().unwrap().insert(command.to_string());
        self
    }

    /// The next command starting with `command` gets its scripted output
    /// and then the connection drops, as a reloading router does
    pub fn drop_on(&self, command: &str) -> &Self {
        self.drops.lock().unwrap().push(command.to_string());
        self
    }

    /// Lines typed after login, in order, including blank resync lines
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_matching(&self, prefix: &str) -> Vec<String> {
        self.received()
            .into_iter()
            .filter(|line| line.starts_with(prefix))
            .collect()
    }

    fn scripted(&self, command: &str) -> String {
        let mut script = self.script.lock().unwrap();
        let key = script
            .keys()
            .filter(|key| command.starts_with(key.as_str()))
            .max_by_key(|key| key.len())
            .cloned();

        match key.and_then(|key| script.get_mut(&key)) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None if command == "terminal length 0" => String::new(),
            None => SYNTAX_ERROR.to_string(),
        }
    }

    fn respond(&self, command: &str, mode: &mut Mode) -> Reply {
        self.received.lock().unwrap().push(command.to_string());

        let next = match (*mode, command) {
            (Mode::Exec, "admin") => Some(Mode::Admin),
            (Mode::Exec, "configure") => Some(Mode::Config),
            (Mode::Admin, "exit") => Some(Mode::Exec),
            (Mode::Config, "end") | (Mode::Config, "abort") => Some(Mode::Exec),
            _ => None,
        };
        if let Some(next) = next {
            *mode = next;
        }

        if self.silent.lock().unwrap().contains(command) {
            return Reply::Silent;
        }
        if command.is_empty() {
            return Reply::Text(format!("\n{}", self.prompt_in(*mode)));
        }

        let body = if next.is_some() {
            String::new()
        } else {
            self.scripted(command)
        };

        let dropping = {
            let mut drops = self.drops.lock().unwrap();
            match drops.iter().position(|d| command.starts_with(d.as_str())) {
                Some(index) => {
                    drops.remove(index);
                    true
                }
                None => false,
            }
        };
        if dropping {
            return Reply::Drop(format!("{}\n{}\n", command, body));
        }
        Reply::Text(format!("{}\n{}\n{}", command, body, self.prompt_in(*mode)))
    }
}

enum Phase {
    Username,
    Password,
    Exec,
}

pub struct FakeChannel {
    router: Arc<FakeRouter>,
    routers: RouterMap,
    phase: Phase,
    mode: Mode,
    username_ok: bool,
    input: String,
    pending: String,
    /// Next hop reached with an in-band telnet/ssh from this router
    inner: Option<Box<FakeChannel>>,
    closing: bool,
    closed: bool,
}

/// Address typed in `telnet <host> [port]` or `ssh -l <user> [-p <port>] <host>`
fn in_band_target(line: &str) -> Option<String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.first().copied() {
        Some("telnet") => tokens.get(1).map(|t| t.to_string()),
        Some("ssh") => tokens.last().map(|t| t.to_string()),
        _ => None,
    }
}

impl FakeChannel {
    fn new(router: Arc<FakeRouter>, routers: RouterMap) -> Self {
        Self {
            router,
            routers,
            phase: Phase::Username,
            mode: Mode::Exec,
            username_ok: false,
            input: String::new(),
            pending: "\r\n\r\nUser Access Verification\r\n\r\nUsername: ".to_string(),
            inner: None,
            closing: false,
            closed: false,
        }
    }

    fn handle_line(&mut self, line: &str) {
        if let Some(inner) = self.inner.as_mut() {
            inner.handle_line(line);
            let forwarded = std::mem::take(&mut inner.pending);
            self.pending.push_str(&forwarded);
            if inner.closing {
                self.closing = true;
            }
            return;
        }

        match self.phase {
            Phase::Username => {
                self.pending.push_str(&format!("{}\nPassword: ", line));
                self.username_ok = line == self.router.username;
                self.phase = Phase::Password;
            }
            Phase::Password => {
                if self.username_ok && line == self.router.password {
                    self.pending
                        .push_str(&format!("\n\n{}", self.router.prompt_in(self.mode)));
                    self.phase = Phase::Exec;
                } else {
                    self.pending
                        .push_str("\n% Authentication failed\n\nUsername: ");
                    self.phase = Phase::Username;
                }
            }
            Phase::Exec => {
                if let Some(target) = in_band_target(line) {
                    self.router.received.lock().unwrap().push(line.to_string());
                    let next = self.routers.lock().unwrap().get(&target).cloned();
                    match next {
                        Some(next) => {
                            let mut inner = FakeChannel::new(next, self.routers.clone());
                            self.pending.push_str(&format!("{}\nTrying {}...\n", line, target));
                            self.pending.push_str(&std::mem::take(&mut inner.pending));
                            self.inner = Some(Box::new(inner));
                        }
                        None => self.pending.push_str(&format!(
                            "{}\n% Connection refused by remote host\n{}",
                            line,
                            self.router.prompt_in(self.mode)
                        )),
                    }
                    return;
                }
                match self.router.respond(line, &mut self.mode) {
                    Reply::Text(text) => self.pending.push_str(&text),
                    Reply::Silent => {}
                    Reply::Drop(text) => {
                        self.pending.push_str(&text);
                        self.closing = true;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl TerminalChannel for FakeChannel {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), DeviceError> {
        if self.closed || self.closing {
            return Err(DeviceError::Disconnected);
        }
        self.input.push_str(&String::from_utf8_lossy(data));
        while let Some(end) = self.input.find('\n') {
            let line: String = self.input.drain(..=end).collect();
            self.handle_line(line.trim_end_matches(['\r', '\n']));
        }
        Ok(())
    }

    async fn read_some(&mut self, buf: &mut Vec<u8>) -> Result<usize, DeviceError> {
        if self.closed {
            return Err(DeviceError::Disconnected);
        }
        if self.pending.is_empty() {
            if self.closing {
                self.closed = true;
                return Err(DeviceError::Disconnected);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            return Ok(0);
        }
        let data = std::mem::take(&mut self.pending);
        buf.extend_from_slice(data.as_bytes());
        Ok(data.len())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

/// Dials fake routers by address; unknown addresses are refused
#[derive(Default)]
pub struct FakeDialer {
    routers: RouterMap,
    dials: AtomicUsize,
}

impl FakeDialer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a router. It can be dialed directly or reached in-band
    /// from another router.
    pub fn add(&self, address: &str, router: Arc<FakeRouter>) {
        self.routers
            .lock()
            .unwrap()
            .insert(address.to_string(), router);
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for FakeDialer {
    async fn dial(
        &self,
        hop: &HopUrl,
        _timeout: Duration,
    ) -> Result<Box<dyn TerminalChannel>, DeviceError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let router = self.routers.lock().unwrap().get(&hop.host).cloned();
        match router {
            Some(router) => Ok(Box::new(FakeChannel::new(router, self.routers.clone()))),
            None => Err(DeviceError::ConnectFailed {
                target: hop.target(),
                reason: "Connection refused".to_string(),
            }),
        }
    }
}
