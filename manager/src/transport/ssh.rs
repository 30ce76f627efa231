//! SSH endpoint: password authentication and an interactive pty shell.

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::channel::TerminalChannel;
use crate::errors::DeviceError;

/// Routers are reached through lab and console networks without a known_hosts
/// file, so every host key is accepted.
struct AcceptingClient;

#[async_trait]
impl client::Handler for AcceptingClient {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct SshChannel {
    session: Handle<AcceptingClient>,
    channel: Channel<Msg>,
}

impl SshChannel {
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, DeviceError> {
        let target = format!("{}:{}", host, port);
        let connect_failed = |reason: String| DeviceError::ConnectFailed {
            target: target.clone(),
            reason,
        };

        let config = Arc::new(client::Config::default());
        let mut session = match tokio::time::timeout(
            timeout,
            client::connect(config, (host, port), AcceptingClient),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(connect_failed(e.to_string())),
            Err(_) => {
                return Err(connect_failed(format!(
                    "no answer within {}s",
                    timeout.as_secs()
                )))
            }
        };

        let authenticated = session
            .authenticate_password(username, password)
            .await
            .map_err(|e| connect_failed(e.to_string()))?;
        if !authenticated {
            return Err(DeviceError::AuthFailed { target });
        }

        let channel = session
            .channel_open_session()
            .await
            .map_err(|e| connect_failed(e.to_string()))?;
        channel
            .request_pty(false, "vt100", 200, 24, 0, 0, &[])
            .await
            .map_err(|e| connect_failed(e.to_string()))?;
        channel
            .request_shell(false)
            .await
            .map_err(|e| connect_failed(e.to_string()))?;

        debug!("SSH shell on {} opened", target);
        Ok(Self { session, channel })
    }
}

#[async_trait]
impl TerminalChannel for SshChannel {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), DeviceError> {
        self.channel
            .data(data)
            .await
            .map_err(|_| DeviceError::Disconnected)
    }

    async fn read_some(&mut self, buf: &mut Vec<u8>) -> Result<usize, DeviceError> {
        match self.channel.wait().await {
            Some(ChannelMsg::Data { data }) => {
                buf.extend_from_slice(&data);
                Ok(data.len())
            }
            Some(ChannelMsg::ExtendedData { data, .. }) => {
                buf.extend_from_slice(&data);
                Ok(data.len())
            }
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                Err(DeviceError::Disconnected)
            }
            Some(_) => Ok(0),
        }
    }

    async fn close(&mut self) {
        let _ = self.channel.eof().await;
        let _ = self
            .session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
    }
}
