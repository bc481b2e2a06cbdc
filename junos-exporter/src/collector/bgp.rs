//! BGP peers, routing instances and RIB totals.
//!
//! The collector issues the global summary, neighbor and instance RPCs, then
//! one summary RPC per routing instance that is not reserved by the system.
//! Peer metrics come from the neighbor reply; the peer's local interface is
//! looked up by its address with the `+port` suffix removed. RIB totals are
//! emitted once per routing instance even when several RIBs or replies lead
//! to the same instance.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use junos_common::{Desc, MetricKind};
use serde::Deserialize;
use tracing::debug;

use super::{CollectError, Collector, ErrorTally, FieldSet, Seconds, decode, execute};
use crate::config::TargetConfig;
use crate::mapper::{Emitter, description_keys};
use crate::netconf::Session;

pub const NAME: &str = "bgp";

const SUMMARY_RPC: &str = "<get-bgp-summary-information/>";
const NEIGHBOR_RPC: &str = "<get-bgp-neighbor-information/>";
const INSTANCE_RPC: &str = "<get-instance-information/>";

/// Routing instances matching any of these are never polled on their own.
const RESERVED_INSTANCES: [&str; 3] = ["__master", "__juniper", "mgmt_junos"];

const PEER_LABELS: [&str; 4] = ["peer", "interface", "peer_address_family", "routing_instance"];

fn summary_rpc(instance: &str) -> String {
    format!("<get-bgp-summary-information><instance>{instance}</instance></get-bgp-summary-information>")
}

fn is_reserved(instance: &str) -> bool {
    RESERVED_INSTANCES.iter().any(|r| instance.contains(r))
}

/// Peer address without the `+port` suffix.
fn strip_port(address: &str) -> &str {
    let address = address.trim();
    address.split_once('+').map_or(address, |(host, _)| host)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SummaryReply {
    #[serde(rename = "bgp-information")]
    information: Summary,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Summary {
    group_count: String,
    peer_count: String,
    down_peer_count: String,
    #[serde(rename = "bgp-rib")]
    ribs: Vec<Rib>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Rib {
    name: String,
    total_prefix_count: String,
    received_prefix_count: String,
    accepted_prefix_count: String,
    active_prefix_count: String,
    suppressed_prefix_count: String,
    history_prefix_count: String,
    damped_prefix_count: String,
    total_external_prefix_count: String,
    active_external_prefix_count: String,
    accepted_external_prefix_count: String,
    suppressed_external_prefix_count: String,
    total_internal_prefix_count: String,
    active_internal_prefix_count: String,
    accepted_internal_prefix_count: String,
    suppressed_internal_prefix_count: String,
    pending_prefix_count: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NeighborReply {
    #[serde(rename = "bgp-information")]
    information: Neighbors,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Neighbors {
    #[serde(rename = "bgp-peer")]
    peers: Vec<Peer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Peer {
    peer_address: String,
    bgp_peer_header: PeerHeader,
    local_interface_name: String,
    description: String,
    peer_state: String,
    input_messages: String,
    output_messages: String,
    route_queue_count: String,
    flap_count: String,
    elapsed_time: Seconds,
    #[serde(rename = "bgp-rib")]
    ribs: Vec<PeerRib>,
    peer_cfg_rti: String,
    nlri_type_peer: String,
}

impl Peer {
    /// Address from the peer itself, or from its header on newer releases.
    fn address(&self) -> &str {
        if self.peer_address.trim().is_empty() {
            strip_port(&self.bgp_peer_header.peer_address)
        } else {
            strip_port(&self.peer_address)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct PeerHeader {
    peer_address: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct PeerRib {
    active_prefix_count: String,
    received_prefix_count: String,
    accepted_prefix_count: String,
    suppressed_prefix_count: String,
    advertised_prefix_count: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstanceReply {
    #[serde(rename = "instance-information")]
    information: Instances,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Instances {
    #[serde(rename = "instance-core")]
    instances: Vec<Instance>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Instance {
    instance_name: String,
    #[serde(rename = "instance-rib")]
    ribs: Vec<InstanceRib>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct InstanceRib {
    irib_name: String,
}

impl InstanceReply {
    /// Distinct instance names in reply order.
    fn names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.information
            .instances
            .iter()
            .map(|i| i.instance_name.trim())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Map of RIB name to the instance owning it.
    fn rib_owners(&self) -> HashMap<&str, &str> {
        self.information
            .instances
            .iter()
            .flat_map(|i| {
                i.ribs
                    .iter()
                    .map(move |r| (r.irib_name.trim(), i.instance_name.trim()))
            })
            .collect()
    }
}

/// Everything one collection run fetched from the device.
struct Replies {
    summary: SummaryReply,
    neighbors: NeighborReply,
    instances: InstanceReply,
    per_instance: Vec<(String, SummaryReply)>,
}

pub struct BgpCollector {
    instance: FieldSet<Summary>,
    rib: FieldSet<Rib>,
    peer_up: Arc<Desc>,
    peer: FieldSet<Peer>,
    peer_rib: FieldSet<PeerRib>,
    peer_types_up: Arc<Desc>,
    errors: ErrorTally,
}

impl BgpCollector {
    #[rustfmt::skip]
    pub fn new() -> Self {
        let instance = &["routing_instance"];
        Self {
            instance: FieldSet::<Summary>::new(
                NAME,
                instance,
                &[
                    ("groups", "Number of Configured Groups.", MetricKind::Gauge, |s| s.group_count.as_str()),
                    ("peers", "Number of Configured Peers.", MetricKind::Gauge, |s| s.peer_count.as_str()),
                    ("down_peers", "Number of Peers that are Down.", MetricKind::Gauge, |s| s.down_peer_count.as_str()),
                ],
            ),
            rib: FieldSet::<Rib>::new(
                NAME,
                instance,
                &[
                    ("rib_total_prefixes", "Total Number of Prefixes in the RIB.", MetricKind::Gauge, |r| r.total_prefix_count.as_str()),
                    ("rib_received_prefixes", "Number of Received Prefixes in the RIB.", MetricKind::Gauge, |r| r.received_prefix_count.as_str()),
                    ("rib_accepted_prefixes", "Number of Accepted Prefixes in the RIB.", MetricKind::Gauge, |r| r.accepted_prefix_count.as_str()),
                    ("rib_active_prefixes", "Number of Active Prefixes in the RIB.", MetricKind::Gauge, |r| r.active_prefix_count.as_str()),
                    ("rib_suppressed_prefixes", "Number of Suppressed Prefixes in the RIB.", MetricKind::Gauge, |r| r.suppressed_prefix_count.as_str()),
                    ("rib_history_prefixes", "History Prefix Count in the RIB.", MetricKind::Gauge, |r| r.history_prefix_count.as_str()),
                    ("rib_damped_prefixes", "Number of Dampened Prefixes in the RIB.", MetricKind::Gauge, |r| r.damped_prefix_count.as_str()),
                    ("rib_total_external_prefixes", "Total Number of External Prefixes in the RIB.", MetricKind::Gauge, |r| r.total_external_prefix_count.as_str()),
                    ("rib_active_external_prefixes", "Number of Active External Prefixes in the RIB.", MetricKind::Gauge, |r| r.active_external_prefix_count.as_str()),
                    ("rib_accepted_external_prefixes", "Number of Accepted External Prefixes in the RIB.", MetricKind::Gauge, |r| r.accepted_external_prefix_count.as_str()),
                    ("rib_suppressed_external_prefixes", "Number of Suppressed External Prefixes in the RIB.", MetricKind::Gauge, |r| r.suppressed_external_prefix_count.as_str()),
                    ("rib_total_internal_prefixes", "Total Number of Internal Prefixes in the RIB.", MetricKind::Gauge, |r| r.total_internal_prefix_count.as_str()),
                    ("rib_active_internal_prefixes", "Number of Active Internal Prefixes in the RIB.", MetricKind::Gauge, |r| r.active_internal_prefix_count.as_str()),
                    ("rib_accepted_internal_prefixes", "Number of Accepted Internal Prefixes in the RIB.", MetricKind::Gauge, |r| r.accepted_internal_prefix_count.as_str()),
                    ("rib_suppressed_internal_prefixes", "Number of Suppressed Internal Prefixes in the RIB.", MetricKind::Gauge, |r| r.suppressed_internal_prefix_count.as_str()),
                    ("rib_pending_prefixes", "Number of Pending Prefixes in the RIB.", MetricKind::Gauge, |r| r.pending_prefix_count.as_str()),
                ],
            ),
            peer_up: Desc::new(
                NAME,
                "peer_up",
                "State of the Peer. (1 = Established, 0 = Down).",
                &PEER_LABELS,
            ),
            peer: FieldSet::<Peer>::new(
                NAME,
                &PEER_LABELS,
                &[
                    ("peer_input_messages", "Number of Input Messages for a Peer.", MetricKind::Counter, |p| p.input_messages.as_str()),
                    ("peer_output_messages", "Number of Output Messages for a Peer.", MetricKind::Counter, |p| p.output_messages.as_str()),
                    ("peer_route_queue", "Number of Route Queues for a Peer.", MetricKind::Gauge, |p| p.route_queue_count.as_str()),
                    ("peer_flaps", "Number of Time the Peer has Flapped.", MetricKind::Counter, |p| p.flap_count.as_str()),
                    ("peer_elapsed_time_seconds", "Length of Time the Peer has Been Up.", MetricKind::Gauge, |p| p.elapsed_time.seconds.as_str()),
                ],
            ),
            peer_rib: FieldSet::<PeerRib>::new(
                NAME,
                &PEER_LABELS,
                &[
                    ("peer_rib_active_prefixes", "Number of Active Prefixes for the Peer.", MetricKind::Gauge, |r| r.active_prefix_count.as_str()),
                    ("peer_rib_received_prefixes", "Number of Received Prefixes for the Peer.", MetricKind::Gauge, |r| r.received_prefix_count.as_str()),
                    ("peer_rib_accepted_prefixes", "Number of Accepted Prefixes for the Peer.", MetricKind::Gauge, |r| r.accepted_prefix_count.as_str()),
                    ("peer_rib_suppressed_prefixes", "Number of Suppressed Prefixes for the Peer.", MetricKind::Gauge, |r| r.suppressed_prefix_count.as_str()),
                    ("peer_rib_advertised_prefixes", "Number of Advertised Prefixes for the Peer.", MetricKind::Gauge, |r| r.advertised_prefix_count.as_str()),
                ],
            ),
            peer_types_up: Desc::new(
                NAME,
                "peer_types_up",
                "Total Number of Peer Types that are Up.",
                &["type"],
            ),
            errors: ErrorTally::new(),
        }
    }

    fn process(&self, replies: &Replies, type_keys: &[String], emitter: &mut Emitter) {
        let owners = replies.instances.rib_owners();
        let mut emitted: HashSet<&str> = HashSet::new();

        for (instance, reply) in &replies.per_instance {
            let summary = &reply.information;
            self.instance.emit(emitter, summary, &[instance.as_str()]);
            self.emit_ribs(summary, &owners, Some(instance.as_str()), &mut emitted, emitter);
        }
        // instances that were not polled on their own
        self.emit_ribs(&replies.summary.information, &owners, None, &mut emitted, emitter);

        self.process_peers(&replies.neighbors, type_keys, emitter);
    }

    /// Emit RIB totals for every RIB of `summary` owned by `only` (or by any
    /// instance), at most once per instance.
    fn emit_ribs<'a>(
        &self,
        summary: &Summary,
        owners: &HashMap<&str, &'a str>,
        only: Option<&str>,
        emitted: &mut HashSet<&'a str>,
        emitter: &mut Emitter,
    ) {
        for rib in &summary.ribs {
            let Some(&instance) = owners.get(rib.name.trim()) else {
                continue;
            };
            if only.is_some_and(|only| only != instance) {
                continue;
            }
            if emitted.insert(instance) {
                self.rib.emit(emitter, rib, &[instance]);
            }
        }
    }

    fn process_peers(&self, reply: &NeighborReply, type_keys: &[String], emitter: &mut Emitter) {
        let peers = &reply.information.peers;

        let interfaces: HashMap<&str, &str> = peers
            .iter()
            .map(|p| (p.address(), p.local_interface_name.trim()))
            .filter(|(address, _)| !address.is_empty())
            .collect();

        let mut types: BTreeMap<String, f64> = BTreeMap::new();

        for peer in peers {
            let address = peer.address();
            if address.is_empty() {
                debug!("skipping bgp peer without an address");
                continue;
            }
            let interface = interfaces.get(address).copied().unwrap_or_default();
            let labels = [
                address,
                interface,
                peer.nlri_type_peer.trim(),
                peer.peer_cfg_rti.trim(),
            ];

            let established = peer.peer_state.trim().eq_ignore_ascii_case("established");
            emitter.flag(&self.peer_up, established, &labels);
            self.peer.emit(emitter, peer, &labels);
            if let Some(rib) = peer.ribs.first() {
                self.peer_rib.emit(emitter, rib, &labels);
            }

            if type_keys.is_empty() {
                continue;
            }
            let description = description_keys(&peer.description);
            for key in type_keys {
                let Some(kind) = description.get(key).map(|t| t.trim()) else {
                    continue;
                };
                if kind.is_empty() {
                    continue;
                }
                let count = types.entry(kind.to_string()).or_insert(0.0);
                if established {
                    *count += 1.0;
                }
            }
        }

        for (kind, count) in &types {
            emitter.gauge_value(&self.peer_types_up, *count, &[kind.as_str()]);
        }
    }
}

impl Default for BgpCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for BgpCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn collect(
        &self,
        session: &dyn Session,
        target: &TargetConfig,
        emitter: &mut Emitter,
    ) -> Result<(), CollectError> {
        let summary = execute(session, SUMMARY_RPC).await?;
        let neighbors = execute(session, NEIGHBOR_RPC).await?;
        let instances: InstanceReply = decode(&execute(session, INSTANCE_RPC).await?)?;

        let mut per_instance = Vec::new();
        for name in instances.names() {
            if name.is_empty() || is_reserved(name) {
                continue;
            }
            let reply: SummaryReply = decode(&execute(session, &summary_rpc(name)).await?)?;
            per_instance.push((name.to_string(), reply));
        }

        let replies = Replies {
            summary: decode(&summary)?,
            neighbors: decode(&neighbors)?,
            instances,
            per_instance,
        };
        self.process(&replies, &target.bgp_peer_type_keys, emitter);
        Ok(())
    }

    fn errors(&self) -> &ErrorTally {
        &self.errors
    }
}
