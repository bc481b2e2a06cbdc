//! NETCONF transport.
//!
//! Collectors talk to a device through the [`Session`] trait: one call per
//! RPC, returning the raw `<rpc-reply>` document. [`ssh::SshConnector`] is the
//! production implementation; [`replay::ReplayConnector`] serves canned replies.

pub mod replay;
pub mod ssh;

use std::sync::Arc;

use async_trait::async_trait;
use memchr::memmem;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use thiserror::Error;

use crate::config::TargetConfig;

pub use replay::{ReplayConnector, ReplaySession};
pub use ssh::SshConnector;

/// NETCONF 1.0 end-of-message marker.
pub const DELIMITER: &str = "]]>]]>";

/// Base namespace for `<rpc>` and `<hello>`.
pub const BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// Base capability advertised in the client hello.
pub const BASE_CAPABILITY: &str = "urn:ietf:params:netconf:base:1.0";

/// Transport errors.
#[derive(Debug, Error)]
pub enum NetconfError {
    #[error("could not connect to {target:?}: {reason}")]
    Connect { target: String, reason: String },

    #[error("authentication failed for user {0:?}")]
    Auth(String),

    #[error("could not load ssh key: {0}")]
    Key(String),

    #[error("ssh error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("session closed by device")]
    Closed,

    #[error("malformed reply: {0}")]
    Framing(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("no reply scripted for rpc {0:?}")]
    Unscripted(String),
}

/// An open NETCONF session to one device.
///
/// Implementations must accept concurrent `execute` calls; exchanges may be
/// serialized internally.
#[async_trait]
pub trait Session: Send + Sync {
    /// Execute one RPC (the method body, without the `<rpc>` envelope).
    async fn execute(&self, rpc: &str) -> Result<String, NetconfError>;

    /// Release the session. Errors are logged, not returned.
    async fn close(&self);
}

/// Opens sessions to targets.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &TargetConfig) -> Result<Arc<dyn Session>, NetconfError>;
}

/// Client `<hello>`, framed.
pub fn hello_message() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><hello xmlns="{BASE_NS}"><capabilities><capability>{BASE_CAPABILITY}</capability></capabilities></hello>{DELIMITER}"#
    )
}

/// Wrap an RPC method in its envelope, framed.
pub fn rpc_message(message_id: u64, method: &str) -> String {
    format!(r#"<rpc message-id="{message_id}" xmlns="{BASE_NS}">{method}</rpc>{DELIMITER}"#)
}

/// Reassembles `]]>]]>`-delimited messages from channel data.
///
/// Bytes already searched are never searched again, so a reply arriving in
/// many chunks is scanned once overall.
#[derive(Debug, Default)]
pub struct Framer {
    buffer: Vec<u8>,
    scanned: usize,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append data received from the channel.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes received but not yet returned as a message.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Remove and return the next complete message, if any.
    pub fn next_message(&mut self) -> Result<Option<String>, NetconfError> {
        let delimiter = DELIMITER.as_bytes();
        // a delimiter may straddle the previous scan boundary
        let from = self.scanned.saturating_sub(delimiter.len() - 1);

        let Some(offset) = memmem::find(&self.buffer[from..], delimiter) else {
            self.scanned = self.buffer.len();
            return Ok(None);
        };
        let end = from + offset;

        let message = std::str::from_utf8(&self.buffer[..end])
            .map(|m| m.trim().to_string())
            .map_err(|e| NetconfError::Framing(format!("reply is not valid UTF-8: {e}")));
        self.buffer.drain(..end + delimiter.len());
        self.scanned = 0;
        message.map(Some)
    }
}

/// Return the first `<rpc-error>` of severity `error` in a reply, if any.
///
/// Warnings are ignored. An error without a message is reported by its tag.
pub fn rpc_error(reply: &str) -> Result<Option<String>, NetconfError> {
    let mut reader = Reader::from_str(reply);
    reader.config_mut().trim_text(true);

    let mut in_error = false;
    let mut field: Option<Vec<u8>> = None;
    let mut severity = String::new();
    let mut message = String::new();
    let mut tag = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"rpc-error" {
                    in_error = true;
                    severity.clear();
                    message.clear();
                    tag.clear();
                } else if in_error {
                    field = Some(name);
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(name) = field.as_deref() {
                    let text = t
                        .unescape()
                        .map_err(|e| NetconfError::Framing(e.to_string()))?;
                    match name {
                        b"error-severity" => severity.push_str(text.trim()),
                        b"error-message" => message.push_str(text.trim()),
                        b"error-tag" => tag.push_str(text.trim()),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"rpc-error" {
                    in_error = false;
                    if severity.eq_ignore_ascii_case("error") {
                        let text = if message.is_empty() { &tag } else { &message };
                        return Ok(Some(text.clone()));
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(NetconfError::Framing(e.to_string())),
        }
    }
}
