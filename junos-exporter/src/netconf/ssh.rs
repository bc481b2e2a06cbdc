//! NETCONF over SSH using the `netconf` subsystem.

use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{
    Connector, Framer, NetconfError, Session, hello_message, rpc_error, rpc_message,
};
use crate::config::{Auth, TargetConfig};

/// SSH client handler. Host keys are not verified.
struct DeviceHandler;

impl client::Handler for DeviceHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Opens NETCONF sessions over SSH.
#[derive(Debug, Clone, Default)]
pub struct SshConnector;

impl SshConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, target: &TargetConfig) -> Result<Arc<dyn Session>, NetconfError> {
        let session = tokio::time::timeout(target.timeout, SshSession::open(target))
            .await
            .map_err(|_| NetconfError::Timeout(target.timeout))??;
        Ok(Arc::new(session))
    }
}

/// State of the single channel, guarded so RPC exchanges never interleave.
struct Exchange {
    handle: Handle<DeviceHandler>,
    channel: Channel<client::Msg>,
    framer: Framer,
    message_id: u64,
    closed: bool,
}

impl Exchange {
    async fn send(&mut self, message: &str) -> Result<(), NetconfError> {
        self.channel.data(message.as_bytes()).await?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<String, NetconfError> {
        loop {
            if let Some(message) = self.framer.next_message()? {
                return Ok(message);
            }
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => self.framer.push(&data),
                Some(ChannelMsg::Eof | ChannelMsg::Close) | None => {
                    self.closed = true;
                    return Err(NetconfError::Closed);
                }
                Some(_) => {}
            }
        }
    }
}

/// One authenticated NETCONF session.
pub struct SshSession {
    target: String,
    exchange: Mutex<Exchange>,
}

impl SshSession {
    async fn open(target: &TargetConfig) -> Result<Self, NetconfError> {
        let config = Arc::new(client::Config::default());
        let mut handle = client::connect(config, target.address.as_str(), DeviceHandler)
            .await
            .map_err(|e| NetconfError::Connect {
                target: target.target.clone(),
                reason: e.to_string(),
            })?;

        let authenticated = match &target.auth {
            Auth::Password(password) => handle
                .authenticate_password(target.username.as_str(), password.as_str())
                .await?
                .success(),
            Auth::Key(path) => {
                let key =
                    load_secret_key(path, None).map_err(|e| NetconfError::Key(e.to_string()))?;
                let hash = handle.best_supported_rsa_hash().await?.flatten();
                handle
                    .authenticate_publickey(
                        target.username.as_str(),
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash),
                    )
                    .await?
                    .success()
            }
        };
        if !authenticated {
            return Err(NetconfError::Auth(target.username.clone()));
        }

        let channel = handle.channel_open_session().await?;
        channel.request_subsystem(true, "netconf").await?;

        let mut exchange = Exchange {
            handle,
            channel,
            framer: Framer::new(),
            message_id: 0,
            closed: false,
        };
        exchange.send(&hello_message()).await?;
        let server_hello = exchange.read_message().await?;
        if !server_hello.contains("hello") {
            return Err(NetconfError::Framing(
                "expected <hello> from device".to_string(),
            ));
        }

        debug!(device = %target.target, "NETCONF session established");

        Ok(Self {
            target: target.target.clone(),
            exchange: Mutex::new(exchange),
        })
    }
}

#[async_trait]
impl Session for SshSession {
    async fn execute(&self, rpc: &str) -> Result<String, NetconfError> {
        let mut exchange = self.exchange.lock().await;
        if exchange.closed {
            return Err(NetconfError::Closed);
        }

        exchange.message_id += 1;
        let message = rpc_message(exchange.message_id, rpc);
        exchange.send(&message).await?;
        let reply = exchange.read_message().await?;

        if let Some(message) = rpc_error(&reply)? {
            return Err(NetconfError::Rpc(message));
        }
        Ok(reply)
    }

    async fn close(&self) {
        let mut exchange = self.exchange.lock().await;
        if exchange.closed {
            return;
        }
        exchange.closed = true;

        exchange.message_id += 1;
        let message = rpc_message(exchange.message_id, "<close-session/>");
        if let Err(e) = exchange.send(&message).await {
            debug!(device = %self.target, error = %e, "close-session not sent");
        }
        if let Err(e) = exchange.channel.eof().await {
            debug!(device = %self.target, error = %e, "channel eof failed");
        }
        if let Err(e) = exchange
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            warn!(device = %self.target, error = %e, "SSH disconnect failed");
        }
    }
}
