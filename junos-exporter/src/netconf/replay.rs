//! Sessions that answer RPCs from canned replies.
//!
//! Used to exercise collectors and the scheduler against captured device
//! output without a device.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Connector, NetconfError, Session, rpc_error};
use crate::config::TargetConfig;

/// Session answering each RPC string with a fixed reply or failure.
#[derive(Debug, Default)]
pub struct ReplaySession {
    replies: HashMap<String, Result<String, String>>,
    calls: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl ReplaySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `rpc` with the `<rpc-reply>` document `xml`.
    pub fn reply(mut self, rpc: &str, xml: impl Into<String>) -> Self {
        self.replies.insert(rpc.trim().to_string(), Ok(xml.into()));
        self
    }

    /// Fail `rpc` with a transport-level error.
    pub fn fail(mut self, rpc: &str, message: impl Into<String>) -> Self {
        self.replies
            .insert(rpc.trim().to_string(), Err(message.into()));
        self
    }

    /// RPCs executed so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for ReplaySession {
    async fn execute(&self, rpc: &str) -> Result<String, NetconfError> {
        let rpc = rpc.trim();
        self.calls.lock().push(rpc.to_string());

        match self.replies.get(rpc) {
            Some(Ok(xml)) => match rpc_error(xml)? {
                Some(message) => Err(NetconfError::Rpc(message)),
                None => Ok(xml.clone()),
            },
            Some(Err(message)) => Err(NetconfError::Rpc(message.clone())),
            None => Err(NetconfError::Unscripted(rpc.to_string())),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector handing out one shared [`ReplaySession`], or refusing to connect.
#[derive(Debug, Default)]
pub struct ReplayConnector {
    session: Option<Arc<ReplaySession>>,
    connects: AtomicUsize,
}

impl ReplayConnector {
    pub fn new(session: Arc<ReplaySession>) -> Self {
        Self {
            session: Some(session),
            connects: AtomicUsize::new(0),
        }
    }

    /// Connector whose every connection attempt fails.
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// Number of connection attempts.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ReplayConnector {
    async fn connect(&self, target: &TargetConfig) -> Result<Arc<dyn Session>, NetconfError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.session {
            Some(session) => Ok(Arc::clone(session) as Arc<dyn Session>),
            None => Err(NetconfError::Connect {
                target: target.target.clone(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_session() {
        let session = ReplaySession::new()
            .reply("<get-fpc-information/>", "<rpc-reply><fpc-information/></rpc-reply>")
            .fail("<get-ospf-neighbor-information/>", "ospf not running");

        let reply = session.execute(" <get-fpc-information/>\n").await.unwrap();
        assert!(reply.contains("fpc-information"));

        let err = session
            .execute("<get-ospf-neighbor-information/>")
            .await
            .unwrap_err();
        assert!(matches!(err, NetconfError::Rpc(_)));

        let err = session.execute("<get-lldp/>").await.unwrap_err();
        assert!(matches!(err, NetconfError::Unscripted(_)));

        assert_eq!(session.calls().len(), 3);
        assert!(!session.is_closed());
        session.close().await;
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_replay_rpc_error_document() {
        let session = ReplaySession::new().reply(
            "<get-inactive-tunnels/>",
            "<rpc-reply><rpc-error><error-severity>error</error-severity><error-message>permission denied</error-message></rpc-error></rpc-reply>",
        );

        let err = session.execute("<get-inactive-tunnels/>").await.unwrap_err();
        assert_eq!(err.to_string(), "rpc error: permission denied");
    }

    #[tokio::test]
    async fn test_unreachable_connector() {
        let connector = ReplayConnector::unreachable();
        let target = TargetConfig::new("r1", &["fpc"]);

        assert!(connector.connect(&target).await.is_err());
        assert_eq!(connector.connects(), 1);
    }
}
