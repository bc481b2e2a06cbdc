//! End-to-end scrapes against captured device replies.
//!
//! Every collector runs against one replayed session, the same way a scrape
//! of a real device would.

use std::sync::Arc;

use junos_common::{MetricKind, Sample};
use junos_exporter::collector::NAMES;
use junos_exporter::exposition;
use junos_exporter::netconf::{ReplayConnector, ReplaySession};
use junos_exporter::{Scheduler, TargetConfig};

const CUSTOMER_A_SUMMARY_RPC: &str =
    "<get-bgp-summary-information><instance>CUSTOMER-A</instance></get-bgp-summary-information>";

/// A device answering every RPC the collectors issue.
fn device() -> ReplaySession {
    ReplaySession::new()
        .reply(
            "<get-interface-information><extensive/></get-interface-information>",
            include_str!("fixtures/interface.xml"),
        )
        .reply("<get-bgp-summary-information/>", include_str!("fixtures/bgp_summary.xml"))
        .reply("<get-bgp-neighbor-information/>", include_str!("fixtures/bgp_neighbor.xml"))
        .reply("<get-instance-information/>", include_str!("fixtures/bgp_instance.xml"))
        .reply(CUSTOMER_A_SUMMARY_RPC, include_str!("fixtures/bgp_summary_customer_a.xml"))
        .reply("<get-environment-information/>", include_str!("fixtures/environment.xml"))
        .reply(
            "<get-temperature-threshold-information/>",
            include_str!("fixtures/temperature_threshold.xml"),
        )
        .reply(
            "<get-power-usage-information-detail></get-power-usage-information-detail>",
            include_str!("fixtures/power.xml"),
        )
        .reply("<get-route-engine-information/>", include_str!("fixtures/route_engine.xml"))
        .reply("<get-inactive-tunnels/>", include_str!("fixtures/ipsec_inactive.xml"))
        .reply(
            "<get-security-associations-information/>",
            include_str!("fixtures/ipsec_active.xml"),
        )
        .reply(
            "<get-interface-optics-diagnostics-information></get-interface-optics-diagnostics-information>",
            include_str!("fixtures/optics.xml"),
        )
        .reply("<get-ospf-neighbor-information/>", include_str!("fixtures/ospf.xml"))
        .reply("<get-fpc-information/>", include_str!("fixtures/fpc.xml"))
}

fn target(collectors: &[&str]) -> TargetConfig {
    let mut target = TargetConfig::new("router1.example.net", collectors);
    target.interface_description_keys = vec!["site".to_string()];
    target.interface_metric_keys = vec!["cost".to_string()];
    target.bgp_peer_type_keys = vec!["type".to_string()];
    target
}

fn find<'a>(samples: &'a [Sample], name: &str, labels: &[(&str, &str)]) -> Option<&'a Sample> {
    samples.iter().find(|s| {
        s.name() == name && labels.iter().all(|(k, v)| s.label(k) == Some(*v))
    })
}

fn value(samples: &[Sample], name: &str, labels: &[(&str, &str)]) -> f64 {
    find(samples, name, labels)
        .unwrap_or_else(|| panic!("no sample {name} {labels:?}"))
        .value
}

/// Samples that do not depend on timing or on how many scrapes ran before.
fn stable(samples: &[Sample]) -> Vec<(String, MetricKind, f64, Vec<String>)> {
    samples
        .iter()
        .filter(|s| s.name() != "junos_scrapes_total" && s.name() != "junos_scrape_duration_seconds")
        .map(|s| (s.name().to_string(), s.kind, s.value, s.label_values.clone()))
        .collect()
}

#[tokio::test]
async fn test_full_scrape_every_collector_up() {
    let session = Arc::new(device());
    let connector = ReplayConnector::new(Arc::clone(&session));
    let scheduler = Scheduler::new();

    let scrape = scheduler.scrape(&target(&NAMES), &connector).await;
    assert!(scrape.is_up());

    for name in NAMES {
        assert_eq!(
            value(&scrape.samples, "junos_collector_up", &[("collector", name)]),
            1.0,
            "collector {name} failed"
        );
        assert_eq!(
            value(&scrape.samples, "junos_scrape_errors_total", &[("collector", name)]),
            0.0
        );
    }

    assert!(session.is_closed());
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn test_bgp_peer_port_stripped_and_interface_attached() {
    let connector = ReplayConnector::new(Arc::new(device()));
    let scrape = Scheduler::new().scrape(&target(&["bgp"]), &connector).await;
    let samples = &scrape.samples;

    let up = find(samples, "junos_bgp_peer_up", &[("peer", "10.0.0.1")]).unwrap();
    assert_eq!(up.value, 1.0);
    assert_eq!(up.label("interface"), Some("ge-0/0/0.0"));
    assert_eq!(up.label("peer_address_family"), Some("inet-unicast"));
    assert_eq!(up.label("routing_instance"), Some("master"));

    // address only present in the peer header
    let down = find(samples, "junos_bgp_peer_up", &[("peer", "192.0.2.9")]).unwrap();
    assert_eq!(down.value, 0.0);
    assert_eq!(down.label("interface"), Some(""));

    assert_eq!(value(samples, "junos_bgp_peer_flaps", &[("peer", "10.0.0.1")]), 1.0);
    assert_eq!(
        value(samples, "junos_bgp_peer_elapsed_time_seconds", &[("peer", "10.0.0.1")]),
        1_209_600.0
    );
    assert_eq!(
        value(samples, "junos_bgp_peer_rib_advertised_prefixes", &[("peer", "10.0.0.1")]),
        12.0
    );
    assert!(find(samples, "junos_bgp_peer_rib_advertised_prefixes", &[("peer", "192.0.2.9")]).is_none());

    assert_eq!(value(samples, "junos_bgp_peer_types_up", &[("type", "transit")]), 1.0);
    assert_eq!(value(samples, "junos_bgp_peer_types_up", &[("type", "customer")]), 0.0);
}

#[tokio::test]
async fn test_bgp_polls_only_non_reserved_instances() {
    let session = Arc::new(device());
    let connector = ReplayConnector::new(Arc::clone(&session));
    let scrape = Scheduler::new().scrape(&target(&["bgp"]), &connector).await;

    let per_instance: Vec<String> = session
        .calls()
        .into_iter()
        .filter(|rpc| rpc.contains("<instance>"))
        .collect();
    assert_eq!(per_instance, vec![CUSTOMER_A_SUMMARY_RPC.to_string()]);

    let samples = &scrape.samples;
    assert_eq!(value(samples, "junos_bgp_peers", &[("routing_instance", "CUSTOMER-A")]), 1.0);
    assert_eq!(
        value(samples, "junos_bgp_rib_total_prefixes", &[("routing_instance", "CUSTOMER-A")]),
        42.0
    );
    assert_eq!(
        value(samples, "junos_bgp_rib_total_prefixes", &[("routing_instance", "__master.anon__")]),
        812_345.0
    );

    // one RIB total per instance
    let totals = samples
        .iter()
        .filter(|s| s.name() == "junos_bgp_rib_total_prefixes")
        .count();
    assert_eq!(totals, 2);
}

#[tokio::test]
async fn test_interface_up_follows_admin_status() {
    let connector = ReplayConnector::new(Arc::new(device()));
    let scrape = Scheduler::new().scrape(&target(&["interface"]), &connector).await;
    let samples = &scrape.samples;

    assert_eq!(value(samples, "junos_interface_up", &[("interface", "ge-0/0/0")]), 1.0);
    assert_eq!(value(samples, "junos_interface_up", &[("interface", "ge-0/0/1")]), 0.0);
    assert!(find(samples, "junos_interface_up", &[("interface", "ge-0/0/2")]).is_none());
    assert_eq!(value(samples, "junos_interface_up", &[("interface", "ge-0/0/0.0")]), 1.0);

    assert_eq!(
        value(samples, "junos_interface_speed_bytes", &[("interface", "ge-0/0/0")]),
        125_000_000.0
    );
    assert!(find(samples, "junos_interface_speed_bytes", &[("interface", "ge-0/0/1")]).is_none());

    assert_eq!(
        value(samples, "junos_interface_input_bytes", &[("interface", "ge-0/0/0.0")]),
        5000.0
    );
    assert_eq!(
        value(samples, "junos_interface_interface_flapped_seconds", &[("interface", "ge-0/0/0")]),
        1_209_600.0
    );
}

#[tokio::test]
async fn test_interface_description_keys() {
    let connector = ReplayConnector::new(Arc::new(device()));
    let scrape = Scheduler::new().scrape(&target(&["interface"]), &connector).await;
    let samples = &scrape.samples;

    let description = find(samples, "junos_interface_description", &[("interface", "ge-0/0/0")]).unwrap();
    assert_eq!(description.label("site"), Some("par1"));
    assert_eq!(description.value, 1.0);

    let logical = find(samples, "junos_interface_description", &[("interface", "ge-0/0/0.0")]).unwrap();
    assert_eq!(logical.label("site"), Some("par1-core"));

    // no description at all still yields an empty key
    let bare = find(samples, "junos_interface_description", &[("interface", "ge-0/0/1")]).unwrap();
    assert_eq!(bare.label("site"), Some(""));

    assert_eq!(value(samples, "junos_interface_cost", &[("interface", "ge-0/0/0")]), 20.0);
    assert!(find(samples, "junos_interface_cost", &[("interface", "ge-0/0/0.0")]).is_none());
}

#[tokio::test]
async fn test_failing_collector_is_isolated() {
    let session = Arc::new(
        ReplaySession::new()
            .reply("<get-ospf-neighbor-information/>", include_str!("fixtures/ospf.xml"))
            .fail("<get-fpc-information/>", "device busy"),
    );
    let connector = ReplayConnector::new(session);
    let scrape = Scheduler::new().scrape(&target(&["fpc", "ospf"]), &connector).await;
    let samples = &scrape.samples;

    assert!(scrape.is_up());
    assert_eq!(value(samples, "junos_collector_up", &[("collector", "fpc")]), 0.0);
    assert_eq!(value(samples, "junos_collector_up", &[("collector", "ospf")]), 1.0);
    assert!(find(samples, "junos_scrape_duration_seconds", &[("collector", "fpc")]).is_some());
    assert_eq!(value(samples, "junos_scrape_errors_total", &[("collector", "fpc")]), 1.0);
    assert!(samples.iter().all(|s| !s.name().starts_with("junos_fpc_")));

    assert_eq!(
        value(samples, "junos_ospf_neighbor_status", &[("neighbor_address", "10.1.0.1")]),
        1.0
    );
    assert_eq!(
        value(samples, "junos_ospf_neighbor_status", &[("neighbor_address", "10.1.0.5")]),
        0.0
    );
}

#[tokio::test]
async fn test_rpc_error_reply_fails_collector() {
    let reply = r#"<rpc-reply>
    <rpc-error>
        <error-type>protocol</error-type>
        <error-tag>operation-failed</error-tag>
        <error-severity>error</error-severity>
        <error-message>syntax error, expecting &lt;command&gt;</error-message>
    </rpc-error>
</rpc-reply>"#;
    let session = Arc::new(ReplaySession::new().reply("<get-ospf-neighbor-information/>", reply));
    let connector = ReplayConnector::new(session);
    let scrape = Scheduler::new().scrape(&target(&["ospf"]), &connector).await;

    assert!(scrape.is_up());
    assert_eq!(value(&scrape.samples, "junos_collector_up", &[("collector", "ospf")]), 0.0);
    assert!(find(&scrape.samples, "junos_ospf_neighbor_status", &[]).is_none());
}

#[tokio::test]
async fn test_same_replies_same_samples() {
    let connector = ReplayConnector::new(Arc::new(device()));
    let scheduler = Scheduler::new();
    let target = target(&NAMES);

    let first = scheduler.scrape(&target, &connector).await;
    let second = scheduler.scrape(&target, &connector).await;

    assert_eq!(stable(&first.samples), stable(&second.samples));
    assert_eq!(
        exposition::render(&first.samples[1..first.samples.len() - NAMES.len() * 3]),
        exposition::render(&second.samples[1..second.samples.len() - NAMES.len() * 3])
    );
}

#[tokio::test]
async fn test_label_arity_matches_descriptors() {
    let connector = ReplayConnector::new(Arc::new(device()));
    let scrape = Scheduler::new().scrape(&target(&NAMES), &connector).await;

    assert!(scrape.samples.len() > 50);
    for sample in &scrape.samples {
        assert_eq!(
            sample.label_values.len(),
            sample.desc.label_names.len(),
            "label arity of {}",
            sample.name()
        );
        assert!(sample.name().starts_with("junos_"));
    }
}

#[tokio::test]
async fn test_collector_order_follows_configuration() {
    let connector = ReplayConnector::new(Arc::new(device()));
    let scrape = Scheduler::new().scrape(&target(&["ospf", "fpc"]), &connector).await;

    let names: Vec<&str> = scrape.samples.iter().map(|s| s.name()).collect();
    let ospf = names.iter().position(|n| n.starts_with("junos_ospf_")).unwrap();
    let fpc = names.iter().position(|n| n.starts_with("junos_fpc_")).unwrap();
    assert_eq!(names[0], "junos_scrapes_total");
    assert!(ospf < fpc);
}
