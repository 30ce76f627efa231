//! Minimal telnet client: raw TCP with option negotiation stripped out of the
//! data stream. Echo and suppress-go-ahead are accepted, everything else refused.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::channel::TerminalChannel;
use crate::errors::DeviceError;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const OPT_ECHO: u8 = 1;
const OPT_SGA: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IacState {
    Data,
    Iac,
    Negotiate(u8),
    Sub,
    SubIac,
}

/// Splits a telnet byte stream into payload and negotiation replies.
/// State survives across reads, so commands split over packets are handled.
#[derive(Debug)]
pub struct IacParser {
    state: IacState,
}

impl Default for IacParser {
    fn default() -> Self {
        Self {
            state: IacState::Data,
        }
    }
}

impl IacParser {
    pub fn feed(&mut self, input: &[u8], data: &mut Vec<u8>, replies: &mut Vec<u8>) {
        for &byte in input {
            self.state = match (self.state, byte) {
                (IacState::Data, IAC) => IacState::Iac,
                (IacState::Data, b) => {
                    data.push(b);
                    IacState::Data
                }
                (IacState::Iac, IAC) => {
                    data.push(IAC);
                    IacState::Data
                }
                (IacState::Iac, cmd @ (DO | DONT | WILL | WONT)) => IacState::Negotiate(cmd),
                (IacState::Iac, SB) => IacState::Sub,
                (IacState::Iac, _) => IacState::Data,
                (IacState::Negotiate(cmd), option) => {
                    match cmd {
                        DO => replies.extend_from_slice(&[IAC, WONT, option]),
                        WILL if option == OPT_ECHO || option == OPT_SGA => {
                            replies.extend_from_slice(&[IAC, DO, option])
                        }
                        WILL => replies.extend_from_slice(&[IAC, DONT, option]),
                        _ => {}
                    }
                    IacState::Data
                }
                (IacState::Sub, IAC) => IacState::SubIac,
                (IacState::Sub, _) => IacState::Sub,
                (IacState::SubIac, SE) => IacState::Data,
                (IacState::SubIac, _) => IacState::Sub,
            };
        }
    }
}

pub struct TelnetChannel {
    stream: TcpStream,
    parser: IacParser,
}

impl TelnetChannel {
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, DeviceError> {
        let target = format!("{}:{}", host, port);
        let stream = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(DeviceError::ConnectFailed {
                    target,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(DeviceError::ConnectFailed {
                    target,
                    reason: format!("no answer within {}s", timeout.as_secs()),
                })
            }
        };
        let _ = stream.set_nodelay(true);
        debug!("Telnet connection to {} established", target);
        Ok(Self {
            stream,
            parser: IacParser::default(),
        })
    }
}

#[async_trait]
impl TerminalChannel for TelnetChannel {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), DeviceError> {
        let mut escaped = Vec::with_capacity(data.len());
        for &b in data {
            if b == IAC {
                escaped.push(IAC);
            }
            escaped.push(b);
        }
        self.stream
            .write_all(&escaped)
            .await
            .map_err(|_| DeviceError::Disconnected)
    }

    async fn read_some(&mut self, buf: &mut Vec<u8>) -> Result<usize, DeviceError> {
        let mut raw = [0u8; 4096];
        let n = self
            .stream
            .read(&mut raw)
            .await
            .map_err(|_| DeviceError::Disconnected)?;
        if n == 0 {
            return Err(DeviceError::Disconnected);
        }

        let before = buf.len();
        let mut replies = Vec::new();
        self.parser.feed(&raw[..n], buf, &mut replies);
        if !replies.is_empty() {
            self.stream
                .write_all(&replies)
                .await
                .map_err(|_| DeviceError::Disconnected)?;
        }
        Ok(buf.len() - before)
    }

    async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_negotiation_and_answers_it() {
        let mut parser = IacParser::default();
        let mut data = Vec::new();
        let mut replies = Vec::new();

        let input = [
            IAC, WILL, OPT_ECHO, b'U', b's', IAC, DO, 24, b'e', b'r', IAC, IAC, b':',
        ];
        parser.feed(&input, &mut data, &mut replies);

        assert_eq!(data, vec![b'U', b's', b'e', b'r', IAC, b':']);
        assert_eq!(replies, vec![IAC, DO, OPT_ECHO, IAC, WONT, 24]);
    }

    #[test]
    fn command_split_across_reads() {
        let mut parser = IacParser::default();
        let mut data = Vec::new();
        let mut replies = Vec::new();

        parser.feed(&[b'a', IAC], &mut data, &mut replies);
        parser.feed(&[WILL], &mut data, &mut replies);
        parser.feed(&[42, b'b'], &mut data, &mut replies);
        parser.feed(&[IAC, SB, 24, 1, IAC, SE, b'c'], &mut data, &mut replies);

        assert_eq!(data, b"abc".to_vec());
        assert_eq!(replies, vec![IAC, DONT, 42]);
    }
}
