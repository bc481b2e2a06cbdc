//! Physical and logical interface statistics.
//!
//! Physical interfaces carry the full extensive statistics set. Logical
//! interfaces report traffic from their LAG bundle view when the device fills
//! it in, otherwise from transit statistics, plus security flow counters.
//! Operators may embed a JSON object in interface descriptions; configured
//! keys from it become labels of `junos_interface_description` or metrics of
//! their own.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use junos_common::{Desc, MetricKind};
use serde::Deserialize;
use tracing::debug;

use super::{CollectError, Collector, ErrorTally, FieldSet, Flag, Seconds, decode, execute};
use crate::config::TargetConfig;
use crate::mapper::{Emitter, description_keys, sanitize_name};
use crate::netconf::Session;

pub const NAME: &str = "interface";

const RPC: &str = "<get-interface-information><extensive/></get-interface-information>";

const GBPS_BYTES: f64 = 125_000_000.0;
const MBPS_BYTES: f64 = 125_000.0;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Reply {
    #[serde(rename = "interface-information")]
    information: InterfaceInformation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InterfaceInformation {
    #[serde(rename = "physical-interface")]
    physical: Vec<Physical>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Physical {
    name: String,
    admin_status: String,
    oper_status: String,
    description: String,
    snmp_index: String,
    speed: String,
    interface_flapped: Seconds,
    traffic_statistics: Traffic,
    input_error_list: InputErrors,
    output_error_list: OutputErrors,
    #[serde(rename = "logical-interface")]
    logical: Vec<Logical>,
    stp_traffic_statistics: Stp,
    ethernet_pcs_statistics: Pcs,
    ethernet_mac_statistics: Mac,
    ethernet_filter_statistics: Filter,
    precl_statistics: Precl,
    ethernet_fec_statistics: Fec,
    macsec_statistics: Macsec,
    multilink_interface_errors: Multilink,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Traffic {
    input_bytes: String,
    output_bytes: String,
    input_packets: String,
    output_packets: String,
    input_bps: String,
    output_bps: String,
    input_pps: String,
    output_pps: String,
    ipv6_transit_statistics: Ipv6Traffic,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Ipv6Traffic {
    input_bytes: String,
    output_bytes: String,
    input_packets: String,
    output_packets: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct InputErrors {
    input_errors: String,
    input_drops: String,
    framing_errors: String,
    input_runts: String,
    input_giants: String,
    input_discards: String,
    input_resource_errors: String,
    input_l3_incompletes: String,
    input_l2_channel_errors: String,
    input_l2_mismatch_timeouts: String,
    input_fifo_errors: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct OutputErrors {
    carrier_transitions: String,
    output_errors: String,
    output_drops: String,
    mtu_errors: String,
    output_resource_errors: String,
    output_collisions: String,
    aged_packets: String,
    hs_link_crc_errors: String,
    output_fifo_errors: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Stp {
    stp_input_bytes_dropped: String,
    stp_output_bytes_dropped: String,
    stp_input_packets_dropped: String,
    stp_output_packets_dropped: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Pcs {
    bit_error_seconds: String,
    errored_blocks_seconds: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Mac {
    input_bytes: String,
    output_bytes: String,
    input_packets: String,
    output_packets: String,
    input_unicasts: String,
    output_unicasts: String,
    input_broadcasts: String,
    output_broadcasts: String,
    input_multicasts: String,
    output_multicasts: String,
    input_crc_errors: String,
    output_crc_errors: String,
    input_fifo_errors: String,
    output_fifo_errors: String,
    input_mac_control_frames: String,
    output_mac_control_frames: String,
    input_mac_pause_frames: String,
    output_mac_pause_frames: String,
    input_oversized_frames: String,
    input_jabber_frames: String,
    input_fragment_frames: String,
    input_vlan_tagged_frames: String,
    input_code_violations: String,
    input_total_errors: String,
    output_total_errors: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Filter {
    input_packets: String,
    input_reject_count: String,
    input_reject_destination_address_count: String,
    input_reject_source_address_count: String,
    output_packets: String,
    output_packet_pad_count: String,
    output_packet_error_count: String,
    cam_destination_filter_count: String,
    cam_source_filter_count: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Precl {
    precl_information: PreclInformation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PreclInformation {
    #[serde(rename = "precl-per-class-statistics")]
    classes: Vec<PreclClass>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct PreclClass {
    precl_traffic_class: String,
    precl_rx_packets: String,
    precl_tx_packets: String,
    precl_dropped_packets: String,
}

// FEC element names use underscores on the wire.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fec {
    fec_ccw_count: String,
    fec_nccw_count: String,
    fec_ccw_error_rate: String,
    fec_nccw_error_rate: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Macsec {
    macsec_tx_sc_protected: String,
    macsec_tx_sc_encrypted: String,
    macsec_tx_sc_protectedbytes: String,
    macsec_tx_sc_encryptedbytes: String,
    macsec_rx_sc_ok: String,
    macsec_rx_sc_validatedbytes: String,
    macsec_rx_sc_decryptedbytes: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Multilink {
    oversized_frames: String,
    input_error_frames: String,
    input_disabled_bundle: String,
    output_disabled_bundle: String,
    queuing_drops: String,
    packet_buffer_overflow: String,
    fragment_buffer_overflow: String,
    fragment_timeout: String,
    sequence_number_missing: String,
    out_of_order_sequence_number: String,
    out_of_range_sequence_number: String,
    data_memory_error: String,
    control_memory_error: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Logical {
    name: String,
    description: String,
    snmp_index: String,
    if_config_flags: ConfigFlags,
    transit_traffic_statistics: Traffic,
    lag_traffic_statistics: LagTraffic,
    security_input_flow_statistics: FlowInput,
    security_output_flow_statistics: FlowOutput,
    security_error_flow_statistics: FlowError,
}

impl Logical {
    /// LAG bundle statistics when populated, transit statistics otherwise.
    fn traffic(&self) -> &Traffic {
        let lag = &self.lag_traffic_statistics.lag_bundle;
        if lag.input_bps.trim().is_empty() {
            &self.transit_traffic_statistics
        } else {
            lag
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFlags {
    #[serde(rename = "iff-up")]
    up: Flag,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct LagTraffic {
    lag_bundle: Traffic,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct FlowInput {
    flow_input_self_packets: String,
    flow_input_icmp_packets: String,
    flow_input_vpn_packets: String,
    flow_input_multicast_packets: String,
    flow_input_policy_bytes: String,
    flow_input_connections: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct FlowOutput {
    flow_output_multicast_packets: String,
    flow_output_policy_bytes: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct FlowError {
    flow_error_address_spoofing: String,
    flow_error_authentication_failed: String,
    flow_error_incoming_nat: String,
    flow_error_invalid_zone: String,
    flow_error_multiple_auth: String,
    flow_error_multiple_incoming_nat: String,
    flow_error_no_gate_parent: String,
    flow_error_no_interest_self_packet: String,
    flow_error_no_minor_session: String,
    flow_error_no_more_session: String,
    flow_error_no_nat_gate: String,
    flow_error_no_route_present: String,
    flow_error_no_sa_for_spi: String,
    flow_error_no_tunnel: String,
    flow_error_no_session_gate: String,
    flow_error_null_zone: String,
    flow_error_policy_denied: String,
    flow_error_security_association_missing: String,
    flow_error_seq_outside_window: String,
    flow_error_syn_protection: String,
    flow_error_user_authentication: String,
}

/// Split a speed such as "10Gbps" or "100mbps" into its number and the
/// factor converting it to bytes per second. Other text ("Auto",
/// "Unlimited") has no speed.
fn speed(raw: &str) -> Option<(&str, f64)> {
    let raw = raw.trim();
    if let Some(n) = raw.strip_suffix("Gbps") {
        Some((n, GBPS_BYTES))
    } else {
        raw.strip_suffix("mbps").map(|n| (n, MBPS_BYTES))
    }
}

/// Traffic class names with repeats made unique: the first occurrence keeps
/// its name, the next become `<name>_1`, `<name>_2` and so on, skipping any
/// suffix already taken by another class.
fn unique_classes<'a>(classes: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut repeats: HashMap<&str, usize> = HashMap::new();
    classes
        .into_iter()
        .map(|class| {
            let mut name = class.to_string();
            while !used.insert(name.clone()) {
                let n = repeats.entry(class).or_insert(0);
                *n += 1;
                name = format!("{class}_{n}");
            }
            name
        })
        .collect()
}

/// Metrics derived from description keys configured for one target.
struct DescriptionMetrics {
    keys: Vec<String>,
    description: Option<Arc<Desc>>,
    metrics: Vec<(String, Arc<Desc>)>,
}

impl DescriptionMetrics {
    fn new(description_keys: &[String], metric_keys: &[String]) -> Self {
        // keys that sanitize to a name already in use are dropped, first one wins
        let mut labels = vec!["interface".to_string()];
        let mut keys = Vec::new();
        for key in description_keys {
            let label = sanitize_name(key);
            if labels.contains(&label) {
                debug!(key = %key, label = %label, "skipping description key with duplicate label name");
                continue;
            }
            labels.push(label);
            keys.push(key.clone());
        }
        let description = (!keys.is_empty()).then(|| {
            Desc::with_extra_labels(
                NAME,
                "description",
                "Interface description keys",
                &["interface"],
                &labels[1..],
            )
        });

        let mut metrics: Vec<(String, Arc<Desc>)> = Vec::new();
        for key in metric_keys {
            let desc = Desc::new(
                NAME,
                &sanitize_name(&key.to_lowercase()),
                "User-defined Metric from Description Key",
                &["interface"],
            );
            if metrics.iter().any(|(_, d)| d.name == desc.name) {
                debug!(key = %key, metric = %desc.name, "skipping description metric key with duplicate name");
                continue;
            }
            metrics.push((key.clone(), desc));
        }

        Self {
            keys,
            description,
            metrics,
        }
    }

    fn emit(&self, emitter: &mut Emitter, interface: &str, text: &str) {
        if self.description.is_none() && self.metrics.is_empty() {
            return;
        }
        let found = description_keys(text);

        if let Some(desc) = &self.description {
            let mut labels = Vec::with_capacity(self.keys.len() + 1);
            labels.push(interface.to_string());
            labels.extend(
                self.keys
                    .iter()
                    .map(|k| found.get(k).cloned().unwrap_or_default()),
            );
            emitter.counter_value(desc, 1.0, &labels);
        }

        for (key, desc) in &self.metrics {
            if let Some(value) = found.get(key) {
                emitter.counter(desc, value.trim(), &[interface]);
            }
        }
    }
}

pub struct InterfaceCollector {
    up: Arc<Desc>,
    speed: Arc<Desc>,
    traffic: FieldSet<Traffic>,
    physical: FieldSet<Physical>,
    precl: FieldSet<PreclClass>,
    logical: FieldSet<Logical>,
    errors: ErrorTally,
}

impl InterfaceCollector {
    #[rustfmt::skip]
    pub fn new() -> Self {
        let labels = &["interface"];
        Self {
            up: Desc::new(NAME, "up", "Whether the interface is up (1 = up, 0 = down).", labels),
            speed: Desc::new(NAME, "speed_bytes", "Speed of the Interface in Bytes per Second", labels),
            traffic: FieldSet::<Traffic>::new(
                NAME,
                labels,
                &[
                    ("input_bytes", "Input Bytes.", MetricKind::Counter, |t| t.input_bytes.as_str()),
                    ("output_bytes", "Output Bytes.", MetricKind::Counter, |t| t.output_bytes.as_str()),
                    ("input_packets", "Input Packets.", MetricKind::Counter, |t| t.input_packets.as_str()),
                    ("output_packets", "Output Packets.", MetricKind::Counter, |t| t.output_packets.as_str()),
                    ("input_bps", "Input BPS.", MetricKind::Gauge, |t| t.input_bps.as_str()),
                    ("output_bps", "Output BPS.", MetricKind::Gauge, |t| t.output_bps.as_str()),
                    ("input_pps", "Input PPS.", MetricKind::Gauge, |t| t.input_pps.as_str()),
                    ("output_pps", "Output PPS.", MetricKind::Gauge, |t| t.output_pps.as_str()),
                    ("ipv6_input_bytes", "Input IPv6 Bytes.", MetricKind::Counter, |t| t.ipv6_transit_statistics.input_bytes.as_str()),
                    ("ipv6_output_bytes", "Output IPv6 Bytes.", MetricKind::Counter, |t| t.ipv6_transit_statistics.output_bytes.as_str()),
                    ("ipv6_input_packets", "Input IPv6 Packets.", MetricKind::Counter, |t| t.ipv6_transit_statistics.input_packets.as_str()),
                    ("ipv6_output_packets", "Output IPv6 Packets.", MetricKind::Counter, |t| t.ipv6_transit_statistics.output_packets.as_str()),
                ],
            ),
            physical: FieldSet::<Physical>::new(
                NAME,
                labels,
                &[
                    ("interface_flapped_seconds", "How long since the last interface flap.", MetricKind::Counter, |p| p.interface_flapped.seconds.as_str()),
                    ("snmp_index", "SNMP Index for the interface", MetricKind::Gauge, |p| p.snmp_index.as_str()),
                    // input errors
                    ("input_errors", "Input Errors.", MetricKind::Counter, |p| p.input_error_list.input_errors.as_str()),
                    ("input_drops", "Input Drops.", MetricKind::Counter, |p| p.input_error_list.input_drops.as_str()),
                    ("framing_errors", "Framing Errors.", MetricKind::Counter, |p| p.input_error_list.framing_errors.as_str()),
                    ("input_runts", "Input Runts.", MetricKind::Counter, |p| p.input_error_list.input_runts.as_str()),
                    ("input_giants", "Input Giants.", MetricKind::Counter, |p| p.input_error_list.input_giants.as_str()),
                    ("input_discards", "Input Discards.", MetricKind::Counter, |p| p.input_error_list.input_discards.as_str()),
                    ("input_resource_errors", "Input Resource Errors.", MetricKind::Counter, |p| p.input_error_list.input_resource_errors.as_str()),
                    ("input_l3_incompletes", "Input L3 Incompletes.", MetricKind::Counter, |p| p.input_error_list.input_l3_incompletes.as_str()),
                    ("input_l2_channel_errors", "Input L2 Channel Errors.", MetricKind::Counter, |p| p.input_error_list.input_l2_channel_errors.as_str()),
                    ("input_l2_mismatch_timeouts", "Input L2 Mismatch Timeouts.", MetricKind::Counter, |p| p.input_error_list.input_l2_mismatch_timeouts.as_str()),
                    ("input_fifo_errors", "Input FIFO Errors.", MetricKind::Counter, |p| p.input_error_list.input_fifo_errors.as_str()),
                    // output errors
                    ("carrier_transitions", "Carrier transitions.", MetricKind::Counter, |p| p.output_error_list.carrier_transitions.as_str()),
                    ("output_errors", "Output Errors.", MetricKind::Counter, |p| p.output_error_list.output_errors.as_str()),
                    ("output_drops", "Output Drops.", MetricKind::Counter, |p| p.output_error_list.output_drops.as_str()),
                    ("mtu_errors", "MTU Errors.", MetricKind::Counter, |p| p.output_error_list.mtu_errors.as_str()),
                    ("output_resource_errors", "Output Resource Errors.", MetricKind::Counter, |p| p.output_error_list.output_resource_errors.as_str()),
                    ("output_collisions", "Output Collisions.", MetricKind::Counter, |p| p.output_error_list.output_collisions.as_str()),
                    ("aged_packets", "Aged Packets.", MetricKind::Counter, |p| p.output_error_list.aged_packets.as_str()),
                    ("hslink_crc_errors", "HS Link CRC Errors.", MetricKind::Counter, |p| p.output_error_list.hs_link_crc_errors.as_str()),
                    ("output_fifo_errors", "Output FIFO Errors.", MetricKind::Counter, |p| p.output_error_list.output_fifo_errors.as_str()),
                    // spanning tree
                    ("stp_input_bytes_dropped", "STP Input Bytes Dropped.", MetricKind::Counter, |p| p.stp_traffic_statistics.stp_input_bytes_dropped.as_str()),
                    ("stp_output_bytes_dropped", "STP Output Bytes Dropped.", MetricKind::Counter, |p| p.stp_traffic_statistics.stp_output_bytes_dropped.as_str()),
                    ("stp_input_packets_dropped", "STP Input Packets Dropped.", MetricKind::Counter, |p| p.stp_traffic_statistics.stp_input_packets_dropped.as_str()),
                    ("stp_output_packets_dropped", "STP Output Packets Dropped.", MetricKind::Counter, |p| p.stp_traffic_statistics.stp_output_packets_dropped.as_str()),
                    // PCS
                    ("pcs_bit_error_seconds", "The number of seconds during which at least one bit error rate (BER) occurred while the PCS receiver is operating in normal mode.", MetricKind::Counter, |p| p.ethernet_pcs_statistics.bit_error_seconds.as_str()),
                    ("pcs_errored_blocks_seconds", "The number of seconds when at least one errored block occurred while the PCS receiver is operating in normal mode.", MetricKind::Counter, |p| p.ethernet_pcs_statistics.errored_blocks_seconds.as_str()),
                    // MAC
                    ("mac_input_bytes", "MAC Input Bytes.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_bytes.as_str()),
                    ("mac_output_bytes", "MAC Output Bytes.", MetricKind::Counter, |p| p.ethernet_mac_statistics.output_bytes.as_str()),
                    ("mac_input_packets", "MAC Input Packets.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_packets.as_str()),
                    ("mac_output_packets", "MAC Output Packets.", MetricKind::Counter, |p| p.ethernet_mac_statistics.output_packets.as_str()),
                    ("mac_input_unicasts", "MAC Input Unicasts.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_unicasts.as_str()),
                    ("mac_output_unicasts", "MAC Output Unicasts.", MetricKind::Counter, |p| p.ethernet_mac_statistics.output_unicasts.as_str()),
                    ("mac_input_broadcasts", "MAC Input Broadcasts.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_broadcasts.as_str()),
                    ("mac_output_broadcasts", "MAC Output Broadcasts.", MetricKind::Counter, |p| p.ethernet_mac_statistics.output_broadcasts.as_str()),
                    ("mac_input_multicasts", "MAC Input Multicasts.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_multicasts.as_str()),
                    ("mac_output_multicasts", "MAC Output Multicasts.", MetricKind::Counter, |p| p.ethernet_mac_statistics.output_multicasts.as_str()),
                    ("mac_input_crc_errors", "MAC Input CRC Errors.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_crc_errors.as_str()),
                    ("mac_output_crc_errors", "MAC Output CRC Errors.", MetricKind::Counter, |p| p.ethernet_mac_statistics.output_crc_errors.as_str()),
                    ("mac_input_fifo_errors", "MAC Input FIFO Errors.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_fifo_errors.as_str()),
                    ("mac_output_fifo_errors", "MAC output FIFO Errors.", MetricKind::Counter, |p| p.ethernet_mac_statistics.output_fifo_errors.as_str()),
                    ("mac_input_control_frames", "MAC Input Control Frames.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_mac_control_frames.as_str()),
                    ("mac_output_control_frames", "MAC Output Control Frames.", MetricKind::Counter, |p| p.ethernet_mac_statistics.output_mac_control_frames.as_str()),
                    ("mac_input_pause_frames", "MAC Input Pause Frames.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_mac_pause_frames.as_str()),
                    ("mac_output_pause_frames", "MAC Output Pause Frames.", MetricKind::Counter, |p| p.ethernet_mac_statistics.output_mac_pause_frames.as_str()),
                    ("mac_input_oversized_frames", "MAC Input Oversized Frames.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_oversized_frames.as_str()),
                    ("mac_input_jabber_frames", "MAC Input Jabber Frames.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_jabber_frames.as_str()),
                    ("mac_input_fragment_frames", "MAC Input Fragment Frames.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_fragment_frames.as_str()),
                    ("mac_input_vlan_tagged_frames", "MAC Input VLAN Tagged Frames.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_vlan_tagged_frames.as_str()),
                    ("mac_input_code_violations", "MAC Input Code Violations.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_code_violations.as_str()),
                    ("mac_input_errors", "MAC Input Errors.", MetricKind::Counter, |p| p.ethernet_mac_statistics.input_total_errors.as_str()),
                    ("mac_output_errors", "MAC Output Errors.", MetricKind::Counter, |p| p.ethernet_mac_statistics.output_total_errors.as_str()),
                    // filters
                    ("filtered_input_packets", "Filtered Input Packets.", MetricKind::Counter, |p| p.ethernet_filter_statistics.input_packets.as_str()),
                    ("filtered_input_rejects", "Filtered Input Rejected.", MetricKind::Counter, |p| p.ethernet_filter_statistics.input_reject_count.as_str()),
                    ("filtered_input_destination_address_rejects", "Filtered Input Reject Destination Address.", MetricKind::Counter, |p| p.ethernet_filter_statistics.input_reject_destination_address_count.as_str()),
                    ("filtered_input_source_address_rejects", "Filtered Input Reject Source Address.", MetricKind::Counter, |p| p.ethernet_filter_statistics.input_reject_source_address_count.as_str()),
                    ("filtered_output_packets", "Filtered Output Packets.", MetricKind::Counter, |p| p.ethernet_filter_statistics.output_packets.as_str()),
                    ("filtered_output_packet_pads", "Filtered Output Packet Pad.", MetricKind::Counter, |p| p.ethernet_filter_statistics.output_packet_pad_count.as_str()),
                    ("filtered_output_packet_errors", "Filtered Output Packet Errors.", MetricKind::Counter, |p| p.ethernet_filter_statistics.output_packet_error_count.as_str()),
                    ("filtered_cam_destinations", "Filtered CAM Destination.", MetricKind::Counter, |p| p.ethernet_filter_statistics.cam_destination_filter_count.as_str()),
                    ("filtered_cam_sources", "Filtered CAM Source.", MetricKind::Counter, |p| p.ethernet_filter_statistics.cam_source_filter_count.as_str()),
                    // FEC
                    ("fec_ccw", "FEC CCW Count.", MetricKind::Counter, |p| p.ethernet_fec_statistics.fec_ccw_count.as_str()),
                    ("fec_nccw", "FEC NCCW Count.", MetricKind::Counter, |p| p.ethernet_fec_statistics.fec_nccw_count.as_str()),
                    ("fec_ccw_error_rate", "FEC CCW Error Rate.", MetricKind::Counter, |p| p.ethernet_fec_statistics.fec_ccw_error_rate.as_str()),
                    ("fec_nccw_error_rate", "FEC NCCW Error Rate.", MetricKind::Counter, |p| p.ethernet_fec_statistics.fec_nccw_error_rate.as_str()),
                    // MACsec
                    ("macsec_output_protected_packets", "Macsec Output Protected.", MetricKind::Counter, |p| p.macsec_statistics.macsec_tx_sc_protected.as_str()),
                    ("macsec_output_encrypted_packets", "Macsec Output Encrypted.", MetricKind::Counter, |p| p.macsec_statistics.macsec_tx_sc_encrypted.as_str()),
                    ("macsec_output_protected_bytes", "Macsec Output Protected Bytes.", MetricKind::Counter, |p| p.macsec_statistics.macsec_tx_sc_protectedbytes.as_str()),
                    ("macsec_output_encrypted_bytes", "Macsec Output Encrypted Bytes.", MetricKind::Counter, |p| p.macsec_statistics.macsec_tx_sc_encryptedbytes.as_str()),
                    ("macsec_input_accepted", "Macsec Input Accepted.", MetricKind::Counter, |p| p.macsec_statistics.macsec_rx_sc_ok.as_str()),
                    ("macsec_input_validated_bytes", "Macsec Input Validated Bytes.", MetricKind::Counter, |p| p.macsec_statistics.macsec_rx_sc_validatedbytes.as_str()),
                    ("macsec_input_decrypted_bytes", "Macsec Input Decrypted Bytes.", MetricKind::Counter, |p| p.macsec_statistics.macsec_rx_sc_decryptedbytes.as_str()),
                    // multilink
                    ("multilink_oversized_frames", "Multilink Oversized Frames.", MetricKind::Counter, |p| p.multilink_interface_errors.oversized_frames.as_str()),
                    ("multilink_input_error_frames", "Multilink Input Error.", MetricKind::Counter, |p| p.multilink_interface_errors.input_error_frames.as_str()),
                    ("multilink_input_disabled_bundle", "Multilink Input Disabled Bundle.", MetricKind::Counter, |p| p.multilink_interface_errors.input_disabled_bundle.as_str()),
                    ("multilink_output_disabled_bundle", "Multilink Output Disabled Bundle.", MetricKind::Counter, |p| p.multilink_interface_errors.output_disabled_bundle.as_str()),
                    ("multilink_queuing_drops", "Multilink Queuing Drops.", MetricKind::Counter, |p| p.multilink_interface_errors.queuing_drops.as_str()),
                    ("multilink_packet_buffer_overflows", "Multilink Packet Buffer Overflow.", MetricKind::Counter, |p| p.multilink_interface_errors.packet_buffer_overflow.as_str()),
                    ("multilink_fragment_buffer_overflows", "Multilink Fragment Buffer Overflow.", MetricKind::Counter, |p| p.multilink_interface_errors.fragment_buffer_overflow.as_str()),
                    ("multilink_fragment_timeouts", "Multilink Fragment Timeout.", MetricKind::Counter, |p| p.multilink_interface_errors.fragment_timeout.as_str()),
                    ("multilink_sequence_number_missing", "Multilink Sequence Number Missing.", MetricKind::Counter, |p| p.multilink_interface_errors.sequence_number_missing.as_str()),
                    ("multilink_out_of_order_sequence_number", "Multilink Out of Order Sequence Number.", MetricKind::Counter, |p| p.multilink_interface_errors.out_of_order_sequence_number.as_str()),
                    ("multilink_out_of_range_sequence_number", "Multilink Out of Range Sequence Number.", MetricKind::Counter, |p| p.multilink_interface_errors.out_of_range_sequence_number.as_str()),
                    ("multilink_data_memory_errors", "Multilink Data Memory Error.", MetricKind::Counter, |p| p.multilink_interface_errors.data_memory_error.as_str()),
                    ("multilink_control_memory_errors", "Multilink Control Memory Error.", MetricKind::Counter, |p| p.multilink_interface_errors.control_memory_error.as_str()),
                ],
            ),
            precl: FieldSet::<PreclClass>::new(
                NAME,
                &["interface", "class"],
                &[
                    ("precl_input_packets", "PRECL Input Packets.", MetricKind::Counter, |c| c.precl_rx_packets.as_str()),
                    ("precl_output_packets", "PRECL Output Packets.", MetricKind::Counter, |c| c.precl_tx_packets.as_str()),
                    ("precl_dropped_packets", "PRECL Dropped Packets.", MetricKind::Counter, |c| c.precl_dropped_packets.as_str()),
                ],
            ),
            logical: FieldSet::<Logical>::new(
                NAME,
                labels,
                &[
                    ("snmp_index", "SNMP Index for the interface", MetricKind::Gauge, |l| l.snmp_index.as_str()),
                    ("flow_error_address_spoofing", "Flow Error Address Spoofing.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_address_spoofing.as_str()),
                    ("flow_error_authentication_failed", "Flow Error Authentication Failed.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_authentication_failed.as_str()),
                    ("flow_error_incoming_nat", "Flow Error Incoming NAT.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_incoming_nat.as_str()),
                    ("flow_error_invalid_zone", "Flow Error Invalid Zone.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_invalid_zone.as_str()),
                    ("flow_error_multiple_auth", "Flow Error Multiple Auth.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_multiple_auth.as_str()),
                    ("flow_error_multiple_incoming_nat", "Flow Error Multiple Incoming NAT.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_multiple_incoming_nat.as_str()),
                    ("flow_error_no_gate_parent", "Flow Error No Gate Parent.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_no_gate_parent.as_str()),
                    ("flow_error_no_interest_self_packet", "Flow Error No Interest Self Packet.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_no_interest_self_packet.as_str()),
                    ("flow_error_no_minor_session", "Flow Error No Minor Session.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_no_minor_session.as_str()),
                    ("flow_error_no_more_session", "Flow Error No More Session.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_no_more_session.as_str()),
                    ("flow_error_no_nat_gate", "Flow Error No NAT Gate.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_no_nat_gate.as_str()),
                    ("flow_error_no_route_present", "Flow Error No Route Present.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_no_route_present.as_str()),
                    ("flow_error_no_sa_for_spi", "Flow Error No Security Association for SPI.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_no_sa_for_spi.as_str()),
                    ("flow_error_no_tunnel", "Flow Error No Tunnel.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_no_tunnel.as_str()),
                    ("flow_error_no_session_gate", "Flow Error No Session Gate.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_no_session_gate.as_str()),
                    ("flow_error_null_zone", "Flow Error Null Zone.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_null_zone.as_str()),
                    ("flow_error_policy_denied", "Flow Error Policy Denied.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_policy_denied.as_str()),
                    ("flow_error_sa_missing", "Flow Error Security Association Missing.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_security_association_missing.as_str()),
                    ("flow_error_seq_outside_window", "Flow Error Seq Outside Window.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_seq_outside_window.as_str()),
                    ("flow_error_syn_protection", "Flow Error Syn Protection.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_syn_protection.as_str()),
                    ("flow_error_user_auth", "Flow Error User Auth.", MetricKind::Counter, |l| l.security_error_flow_statistics.flow_error_user_authentication.as_str()),
                    ("flow_input_self_packets", "Flow Input Self Packets.", MetricKind::Counter, |l| l.security_input_flow_statistics.flow_input_self_packets.as_str()),
                    ("flow_input_icmp_packets", "Flow Input ICMP.", MetricKind::Counter, |l| l.security_input_flow_statistics.flow_input_icmp_packets.as_str()),
                    ("flow_input_vpn_packets", "Flow Input VPN Packets.", MetricKind::Counter, |l| l.security_input_flow_statistics.flow_input_vpn_packets.as_str()),
                    ("flow_input_multicast_packets", "Flow Input Multicast Packets.", MetricKind::Counter, |l| l.security_input_flow_statistics.flow_input_multicast_packets.as_str()),
                    ("flow_input_policy_bytes", "Flow Input Policy Bytes.", MetricKind::Counter, |l| l.security_input_flow_statistics.flow_input_policy_bytes.as_str()),
                    ("flow_input_connections", "Flow Input Connections.", MetricKind::Counter, |l| l.security_input_flow_statistics.flow_input_connections.as_str()),
                    ("flow_output_multicast_packets", "Flow Output Multicast Packets.", MetricKind::Counter, |l| l.security_output_flow_statistics.flow_output_multicast_packets.as_str()),
                    ("flow_output_policy_bytes", "Flow Output Policy Bytes.", MetricKind::Counter, |l| l.security_output_flow_statistics.flow_output_policy_bytes.as_str()),
                ],
            ),
            errors: ErrorTally::new(),
        }
    }

    fn process(&self, reply: &Reply, keys: &DescriptionMetrics, emitter: &mut Emitter) {
        for physical in &reply.information.physical {
            let name = physical.name.trim();
            let labels = [name];

            // admin-down interfaces report no up state
            if physical.admin_status.trim().eq_ignore_ascii_case("up") {
                emitter.state(&self.up, &physical.oper_status, "up", &labels);
            }
            if let Some((number, factor)) = speed(&physical.speed) {
                emitter.gauge_scaled(&self.speed, number, factor, &labels);
            }

            keys.emit(emitter, name, &physical.description);
            self.traffic.emit(emitter, &physical.traffic_statistics, &labels);
            self.physical.emit(emitter, physical, &labels);

            let precl = &physical.precl_statistics.precl_information.classes;
            let classes = unique_classes(precl.iter().map(|c| c.precl_traffic_class.trim()));
            for (stats, class) in precl.iter().zip(&classes) {
                self.precl.emit(emitter, stats, &[name, class.as_str()]);
            }

            for logical in &physical.logical {
                self.process_logical(logical, keys, emitter);
            }
        }
    }

    fn process_logical(&self, logical: &Logical, keys: &DescriptionMetrics, emitter: &mut Emitter) {
        let name = logical.name.trim();
        let labels = [name];

        emitter.flag(&self.up, logical.if_config_flags.up.is_some(), &labels);
        keys.emit(emitter, name, &logical.description);
        self.traffic.emit(emitter, logical.traffic(), &labels);
        self.logical.emit(emitter, logical, &labels);
    }
}

impl Default for InterfaceCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for InterfaceCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn collect(
        &self,
        session: &dyn Session,
        target: &TargetConfig,
        emitter: &mut Emitter,
    ) -> Result<(), CollectError> {
        let reply: Reply = decode(&execute(session, RPC).await?)?;
        let keys = DescriptionMetrics::new(
            &target.interface_description_keys,
            &target.interface_metric_keys,
        );
        self.process(&reply, &keys, emitter);
        Ok(())
    }

    fn errors(&self) -> &ErrorTally {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use junos_common::Sample;

    const REPLY: &str = r#"<rpc-reply xmlns:junos="http://xml.juniper.net/junos/21.4R3/junos">
    <interface-information xmlns="http://xml.juniper.net/junos/21.4R3/junos-interface" junos:style="extensive">
        <physical-interface>
            <name>xe-0/0/0</name>
            <admin-status junos:format="Enabled">up</admin-status>
            <oper-status>up</oper-status>
            <description>{"site": "par1", "cost": "10"}</description>
            <snmp-index>514</snmp-index>
            <speed>10Gbps</speed>
            <interface-flapped junos:seconds="86400">2024-01-01 00:00:00 UTC (1d 00:00 ago)</interface-flapped>
            <traffic-statistics junos:style="verbose">
                <input-bytes>1000</input-bytes>
                <output-bytes>2000</output-bytes>
                <input-packets>10</input-packets>
                <output-packets>20</output-packets>
                <ipv6-transit-statistics>
                    <input-bytes>300</input-bytes>
                    <output-bytes>400</output-bytes>
                    <input-packets>3</input-packets>
                    <output-packets>4</output-packets>
                </ipv6-transit-statistics>
                <input-bps>8000</input-bps>
                <output-bps>16000</output-bps>
                <input-pps>1</input-pps>
                <output-pps>2</output-pps>
            </traffic-statistics>
            <input-error-list>
                <input-errors>0</input-errors>
                <input-drops>5</input-drops>
            </input-error-list>
            <output-error-list>
                <carrier-transitions>3</carrier-transitions>
            </output-error-list>
            <ethernet-mac-statistics junos:style="verbose">
                <input-fragment-frames>2</input-fragment-frames>
            </ethernet-mac-statistics>
            <precl-statistics>
                <precl-information>
                    <precl-per-class-statistics>
                        <precl-traffic-class>best-effort</precl-traffic-class>
                        <precl-rx-packets>100</precl-rx-packets>
                    </precl-per-class-statistics>
                    <precl-per-class-statistics>
                        <precl-traffic-class>best-effort</precl-traffic-class>
                        <precl-rx-packets>200</precl-rx-packets>
                    </precl-per-class-statistics>
                </precl-information>
            </precl-statistics>
            <ethernet-fec-statistics>
                <fec_ccw_count>7</fec_ccw_count>
            </ethernet-fec-statistics>
            <macsec-statistics>
                <macsec-tx-sc-protectedbytes>64</macsec-tx-sc-protectedbytes>
            </macsec-statistics>
            <logical-interface>
                <name>xe-0/0/0.0</name>
                <description>{\"site\":\"par2\"}</description>
                <snmp-index>540</snmp-index>
                <if-config-flags>
                    <iff-up/>
                    <iff-snmp-traps/>
                </if-config-flags>
                <transit-traffic-statistics>
                    <input-bytes>11</input-bytes>
                    <input-bps>0</input-bps>
                </transit-traffic-statistics>
            </logical-interface>
            <logical-interface>
                <name>xe-0/0/0.32767</name>
                <if-config-flags>
                    <iff-snmp-traps/>
                </if-config-flags>
                <transit-traffic-statistics>
                    <input-bytes>12</input-bytes>
                </transit-traffic-statistics>
                <lag-traffic-statistics>
                    <lag-bundle>
                        <input-bytes>99</input-bytes>
                        <input-bps>800</input-bps>
                    </lag-bundle>
                </lag-traffic-statistics>
            </logical-interface>
        </physical-interface>
        <physical-interface>
            <name>xe-0/0/1</name>
            <admin-status>up</admin-status>
            <oper-status>down</oper-status>
            <speed>Auto</speed>
        </physical-interface>
        <physical-interface>
            <name>xe-0/0/2</name>
            <admin-status>down</admin-status>
            <oper-status>down</oper-status>
            <speed>1000mbps</speed>
        </physical-interface>
    </interface-information>
</rpc-reply>"#;

    fn run(description_keys: &[&str], metric_keys: &[&str]) -> Vec<Sample> {
        let to_owned = |keys: &[&str]| keys.iter().map(|k| k.to_string()).collect::<Vec<_>>();
        let keys = DescriptionMetrics::new(&to_owned(description_keys), &to_owned(metric_keys));
        let collector = InterfaceCollector::new();
        let reply: Reply = decode(REPLY).unwrap();
        let mut emitter = Emitter::new();
        collector.process(&reply, &keys, &mut emitter);
        emitter.into_samples()
    }

    fn value(samples: &[Sample], name: &str, interface: &str) -> Option<f64> {
        samples
            .iter()
            .find(|s| s.name() == name && s.label("interface") == Some(interface))
            .map(|s| s.value)
    }

    #[test]
    fn test_speed() {
        assert_eq!(speed("10Gbps"), Some(("10", GBPS_BYTES)));
        assert_eq!(speed(" 100mbps\n"), Some(("100", MBPS_BYTES)));
        assert_eq!(speed("Auto"), None);
        assert_eq!(speed("Unlimited"), None);
        assert_eq!(speed(""), None);
    }

    #[test]
    fn test_unique_classes() {
        let classes = unique_classes(["best-effort", "voice", "best-effort", "best-effort"]);
        assert_eq!(classes, vec!["best-effort", "voice", "best-effort_1", "best-effort_2"]);
    }

    #[test]
    fn test_unique_classes_skip_taken_suffix() {
        let classes = unique_classes(["voice", "voice_1", "voice", "voice"]);
        assert_eq!(classes, vec!["voice", "voice_1", "voice_2", "voice_3"]);

        let classes = unique_classes(["voice", "voice", "voice_1"]);
        assert_eq!(classes, vec!["voice", "voice_1", "voice_1_1"]);
    }

    #[test]
    fn test_up_state() {
        let samples = run(&[], &[]);

        assert_eq!(value(&samples, "junos_interface_up", "xe-0/0/0"), Some(1.0));
        // admin up, oper down
        assert_eq!(value(&samples, "junos_interface_up", "xe-0/0/1"), Some(0.0));
        // admin down reports nothing
        assert_eq!(value(&samples, "junos_interface_up", "xe-0/0/2"), None);

        assert_eq!(value(&samples, "junos_interface_up", "xe-0/0/0.0"), Some(1.0));
        assert_eq!(value(&samples, "junos_interface_up", "xe-0/0/0.32767"), Some(0.0));
    }

    #[test]
    fn test_physical_statistics() {
        let samples = run(&[], &[]);

        assert_eq!(value(&samples, "junos_interface_speed_bytes", "xe-0/0/0"), Some(1_250_000_000.0));
        assert_eq!(value(&samples, "junos_interface_speed_bytes", "xe-0/0/1"), None);
        assert_eq!(value(&samples, "junos_interface_speed_bytes", "xe-0/0/2"), Some(125_000_000.0));
        assert_eq!(value(&samples, "junos_interface_input_bytes", "xe-0/0/0"), Some(1000.0));
        assert_eq!(value(&samples, "junos_interface_ipv6_output_packets", "xe-0/0/0"), Some(4.0));
        assert_eq!(value(&samples, "junos_interface_input_bps", "xe-0/0/0"), Some(8000.0));
        assert_eq!(value(&samples, "junos_interface_interface_flapped_seconds", "xe-0/0/0"), Some(86400.0));
        assert_eq!(value(&samples, "junos_interface_input_drops", "xe-0/0/0"), Some(5.0));
        assert_eq!(value(&samples, "junos_interface_carrier_transitions", "xe-0/0/0"), Some(3.0));
        assert_eq!(value(&samples, "junos_interface_mac_input_fragment_frames", "xe-0/0/0"), Some(2.0));
        assert_eq!(value(&samples, "junos_interface_fec_ccw", "xe-0/0/0"), Some(7.0));
        assert_eq!(value(&samples, "junos_interface_macsec_output_protected_bytes", "xe-0/0/0"), Some(64.0));
        assert_eq!(value(&samples, "junos_interface_snmp_index", "xe-0/0/0"), Some(514.0));

        let counter = samples
            .iter()
            .find(|s| s.name() == "junos_interface_input_bytes")
            .unwrap();
        assert_eq!(counter.kind, MetricKind::Counter);
    }

    #[test]
    fn test_precl_duplicate_classes() {
        let samples = run(&[], &[]);
        let classes: Vec<(&str, f64)> = samples
            .iter()
            .filter(|s| s.name() == "junos_interface_precl_input_packets")
            .map(|s| (s.label("class").unwrap(), s.value))
            .collect();

        assert_eq!(classes, vec![("best-effort", 100.0), ("best-effort_1", 200.0)]);
    }

    #[test]
    fn test_logical_traffic_source() {
        let samples = run(&[], &[]);

        // transit statistics when the LAG view is empty
        assert_eq!(value(&samples, "junos_interface_input_bytes", "xe-0/0/0.0"), Some(11.0));
        // LAG bundle wins when it reports a rate
        assert_eq!(value(&samples, "junos_interface_input_bytes", "xe-0/0/0.32767"), Some(99.0));
        assert_eq!(value(&samples, "junos_interface_input_bps", "xe-0/0/0.32767"), Some(800.0));
        assert_eq!(value(&samples, "junos_interface_snmp_index", "xe-0/0/0.0"), Some(540.0));
    }

    #[test]
    fn test_description_keys() {
        let samples = run(&["site", "role"], &["Cost"]);

        let descriptions: Vec<&Sample> = samples
            .iter()
            .filter(|s| s.name() == "junos_interface_description")
            .collect();
        // every interface gets one, missing keys become empty labels
        assert_eq!(descriptions.len(), 5);
        assert_eq!(descriptions[0].desc.label_names, vec!["interface", "site", "role"]);
        assert_eq!(descriptions[0].label_values, vec!["xe-0/0/0", "par1", ""]);
        assert_eq!(descriptions[1].label_values, vec!["xe-0/0/0.0", "par2", ""]);
        assert!(descriptions.iter().all(|s| s.value == 1.0));

        // "Cost" is not a key of the description, "cost" is
        assert!(samples.iter().all(|s| s.name() != "junos_interface_cost"));
    }

    #[test]
    fn test_metric_keys() {
        let samples = run(&[], &["cost"]);

        let cost: Vec<&Sample> = samples
            .iter()
            .filter(|s| s.name() == "junos_interface_cost")
            .collect();
        assert_eq!(cost.len(), 1);
        assert_eq!(cost[0].label("interface"), Some("xe-0/0/0"));
        assert_eq!(cost[0].value, 10.0);
        assert!(samples.iter().all(|s| s.name() != "junos_interface_description"));
    }

    #[test]
    fn test_description_keys_with_colliding_names() {
        // "far-end" and "far_end" both become far_end; "interface" is taken
        let samples = run(&["site", "far-end", "far_end", "interface"], &["cost", "Cost"]);

        let description = samples
            .iter()
            .find(|s| s.name() == "junos_interface_description")
            .unwrap();
        assert_eq!(description.desc.label_names, vec!["interface", "site", "far_end"]);
        assert_eq!(description.label_values, vec!["xe-0/0/0", "par1", ""]);

        let cost: Vec<&Sample> = samples
            .iter()
            .filter(|s| s.name() == "junos_interface_cost")
            .collect();
        assert_eq!(cost.len(), 1);
        assert_eq!(cost[0].value, 10.0);
    }
}
