//! IPsec tunnel status.

use std::sync::Arc;

use async_trait::async_trait;
use junos_common::Desc;
use serde::Deserialize;

use super::{CollectError, Collector, ErrorTally, decode, execute};
use crate::config::TargetConfig;
use crate::mapper::Emitter;
use crate::netconf::Session;

pub const NAME: &str = "ipsec";

const INACTIVE_RPC: &str = "<get-inactive-tunnels/>";
const ACTIVE_RPC: &str = "<get-security-associations-information/>";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InactiveReply {
    #[serde(rename = "ipsec-unestablished-tunnel-information")]
    information: Associations,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ActiveReply {
    #[serde(rename = "ipsec-security-associations-information")]
    information: Associations,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Associations {
    #[serde(rename = "ipsec-security-associations-block")]
    blocks: Vec<Block>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Block {
    #[serde(rename = "ipsec-security-associations")]
    association: Association,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Association {
    sa_tunnel_index: String,
    sa_remote_gateway: String,
}

impl Association {
    fn labels(&self) -> [&str; 2] {
        [
            self.sa_remote_gateway.trim_matches('\n'),
            self.sa_tunnel_index.trim_matches('\n'),
        ]
    }
}

pub struct IpsecCollector {
    tunnel_status_up: Arc<Desc>,
    errors: ErrorTally,
}

impl IpsecCollector {
    pub fn new() -> Self {
        Self {
            tunnel_status_up: Desc::new(
                NAME,
                "tunnel_status_up",
                "Tunnel Status (1 UP, 0 DOWN)",
                &["saremotegateway", "satunnelindex"],
            ),
            errors: ErrorTally::new(),
        }
    }

    fn process(&self, associations: &Associations, up: bool, emitter: &mut Emitter) {
        for block in &associations.blocks {
            emitter.flag(&self.tunnel_status_up, up, &block.association.labels());
        }
    }
}

impl Default for IpsecCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for IpsecCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn collect(
        &self,
        session: &dyn Session,
        _target: &TargetConfig,
        emitter: &mut Emitter,
    ) -> Result<(), CollectError> {
        let inactive: InactiveReply = decode(&execute(session, INACTIVE_RPC).await?)?;
        self.process(&inactive.information, false, emitter);

        let active: ActiveReply = decode(&execute(session, ACTIVE_RPC).await?)?;
        self.process(&active.information, true, emitter);
        Ok(())
    }

    fn errors(&self) -> &ErrorTally {
        &self.errors
    }
}
