//! OSPF neighbor state.

use std::sync::Arc;

use async_trait::async_trait;
use junos_common::Desc;
use serde::Deserialize;

use super::{CollectError, Collector, ErrorTally, decode, execute};
use crate::config::TargetConfig;
use crate::mapper::Emitter;
use crate::netconf::Session;

pub const NAME: &str = "ospf";

const RPC: &str = "<get-ospf-neighbor-information/>";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Reply {
    #[serde(rename = "ospf-neighbor-information")]
    information: NeighborInformation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NeighborInformation {
    #[serde(rename = "ospf-neighbor")]
    neighbors: Vec<Neighbor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Neighbor {
    neighbor_address: String,
    interface_name: String,
    ospf_neighbor_state: String,
    neighbor_id: String,
}

pub struct OspfCollector {
    neighbor_status: Arc<Desc>,
    errors: ErrorTally,
}

impl OspfCollector {
    pub fn new() -> Self {
        Self {
            neighbor_status: Desc::new(
                NAME,
                "neighbor_status",
                "OSPF neighbor status (1 = Full, 0 = any other state).",
                &["neighbor_address", "neighbor_id", "local_interface"],
            ),
            errors: ErrorTally::new(),
        }
    }

    fn process(&self, reply: &Reply, emitter: &mut Emitter) {
        for neighbor in &reply.information.neighbors {
            emitter.state(
                &self.neighbor_status,
                &neighbor.ospf_neighbor_state,
                "Full",
                &[
                    neighbor.neighbor_address.trim(),
                    neighbor.neighbor_id.trim(),
                    neighbor.interface_name.trim(),
                ],
            );
        }
    }
}

impl Default for OspfCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for OspfCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn collect(
        &self,
        session: &dyn Session,
        _target: &TargetConfig,
        emitter: &mut Emitter,
    ) -> Result<(), CollectError> {
        let reply: Reply = decode(&execute(session, RPC).await?)?;
        self.process(&reply, emitter);
        Ok(())
    }

    fn errors(&self) -> &ErrorTally {
        &self.errors
    }
}
