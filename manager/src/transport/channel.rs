//! Byte-stream seams of the transport: a channel to one endpoint and a dialer
//! that opens the first hop of a chain.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::ssh::SshChannel;
use super::telnet::TelnetChannel;
use super::url::HopUrl;
use crate::database::ConnectionType;
use crate::errors::DeviceError;

#[async_trait]
pub trait TerminalChannel: Send {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), DeviceError>;

    /// Appends whatever arrives next to `buf`. Returns `Disconnected` once the
    /// remote end has closed. Must be cancel safe, callers wrap it in a timeout.
    async fn read_some(&mut self, buf: &mut Vec<u8>) -> Result<usize, DeviceError>;

    async fn close(&mut self);
}

#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(
        &self,
        hop: &HopUrl,
        timeout: Duration,
    ) -> Result<Box<dyn TerminalChannel>, DeviceError>;
}

/// Dials real telnet and ssh endpoints
#[derive(Debug, Default, Clone)]
pub struct NetworkDialer;

#[async_trait]
impl Dialer for NetworkDialer {
    async fn dial(
        &self,
        hop: &HopUrl,
        timeout: Duration,
    ) -> Result<Box<dyn TerminalChannel>, DeviceError> {
        debug!("Dialing {}", hop.redacted());
        match hop.scheme {
            ConnectionType::Telnet => {
                let channel =
                    TelnetChannel::connect(&hop.host, hop.port_or_default(), timeout).await?;
                Ok(Box::new(channel))
            }
            ConnectionType::Ssh => {
                let channel = SshChannel::connect(
                    &hop.host,
                    hop.port_or_default(),
                    &hop.username,
                    hop.password.as_deref().unwrap_or_default(),
                    timeout,
                )
                .await?;
                Ok(Box::new(channel))
            }
        }
    }
}
