//! Feature collectors.
//!
//! Each collector issues the RPCs for one device feature on the shared
//! session, decodes the replies and maps fields to samples. A failing RPC or
//! an undecodable reply ends that collector's run; samples emitted before the
//! failure are kept.

pub mod bgp;
pub mod environment;
pub mod fpc;
pub mod interface;
pub mod ipsec;
pub mod optics;
pub mod ospf;
pub mod power;
pub mod route_engine;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use junos_common::{Desc, MetricKind};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::TargetConfig;
use crate::mapper::Emitter;
use crate::netconf::{NetconfError, Session};

pub use bgp::BgpCollector;
pub use environment::EnvironmentCollector;
pub use fpc::FpcCollector;
pub use interface::InterfaceCollector;
pub use ipsec::IpsecCollector;
pub use optics::OpticsCollector;
pub use ospf::OspfCollector;
pub use power::PowerCollector;
pub use route_engine::RouteEngineCollector;

/// Names of every registered collector, in registration order.
pub const NAMES: [&str; 9] = [
    interface::NAME,
    bgp::NAME,
    environment::NAME,
    power::NAME,
    route_engine::NAME,
    ipsec::NAME,
    optics::NAME,
    ospf::NAME,
    fpc::NAME,
];

/// Whether `name` is a registered collector.
pub fn is_known(name: &str) -> bool {
    NAMES.contains(&name)
}

/// One instance of every collector.
pub fn all() -> Vec<Arc<dyn Collector>> {
    vec![
        Arc::new(InterfaceCollector::new()),
        Arc::new(BgpCollector::new()),
        Arc::new(EnvironmentCollector::new()),
        Arc::new(PowerCollector::new()),
        Arc::new(RouteEngineCollector::new()),
        Arc::new(IpsecCollector::new()),
        Arc::new(OpticsCollector::new()),
        Arc::new(OspfCollector::new()),
        Arc::new(FpcCollector::new()),
    ]
}

/// Failure that ends one collector's run.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("could not execute netconf RPC call {rpc}: {source}")]
    Rpc {
        rpc: String,
        #[source]
        source: NetconfError,
    },

    #[error("could not unmarshal netconf reply xml: {0}")]
    Decode(#[from] quick_xml::DeError),
}

/// Result of one `get` call.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Errors from this run only.
    pub errors: Vec<CollectError>,
    /// Errors over the life of the process.
    pub total_errors: u64,
}

/// Lifetime error count of one collector. Never reset.
#[derive(Debug, Default)]
pub struct ErrorTally(AtomicU64);

impl ErrorTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn total(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A device-feature collector.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Stable name used in configuration and in the `collector` label.
    fn name(&self) -> &'static str;

    /// Run the feature's RPCs and emit its samples.
    async fn collect(
        &self,
        session: &dyn Session,
        target: &TargetConfig,
        emitter: &mut Emitter,
    ) -> Result<(), CollectError>;

    /// Lifetime error counter.
    fn errors(&self) -> &ErrorTally;

    /// Run [`collect`](Self::collect) and account for its failure.
    async fn get(
        &self,
        session: &dyn Session,
        target: &TargetConfig,
        emitter: &mut Emitter,
    ) -> Outcome {
        let errors = match self.collect(session, target, emitter).await {
            Ok(()) => Vec::new(),
            Err(e) => {
                self.errors().record();
                vec![e]
            }
        };

        Outcome {
            errors,
            total_errors: self.errors().total(),
        }
    }
}

/// Execute one RPC, tagging a failure with the RPC text.
pub async fn execute(session: &dyn Session, rpc: &str) -> Result<String, CollectError> {
    session
        .execute(rpc)
        .await
        .map_err(|source| CollectError::Rpc {
            rpc: rpc.to_string(),
            source,
        })
}

/// Decode a full `<rpc-reply>` document.
pub fn decode<T: DeserializeOwned>(xml: &str) -> Result<T, CollectError> {
    Ok(quick_xml::de::from_str(xml)?)
}

/// Text value of an element that also carries a Junos `seconds` attribute.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Seconds {
    #[serde(rename = "@seconds")]
    pub seconds: String,
}

/// Element carrying a Junos `celsius` attribute.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Celsius {
    #[serde(rename = "@celsius")]
    pub celsius: String,
}

/// Presence-only element such as `<iff-up/>`.
pub type Flag = Option<serde::de::IgnoredAny>;

/// Table entry mapping one text field of `T` to a metric.
pub type Field<T> = (&'static str, &'static str, MetricKind, fn(&T) -> &str);

/// Metrics read off one decoded structure with a shared label schema.
pub struct FieldSet<T> {
    fields: Vec<(Arc<Desc>, MetricKind, fn(&T) -> &str)>,
}

impl<T> FieldSet<T> {
    pub fn new(subsystem: &str, labels: &[&str], table: &[Field<T>]) -> Self {
        let fields = table
            .iter()
            .map(|(name, help, kind, get)| (Desc::new(subsystem, name, help, labels), *kind, *get))
            .collect();
        Self { fields }
    }

    /// Emit every field of `value` that has content.
    pub fn emit<L: AsRef<str>>(&self, emitter: &mut Emitter, value: &T, labels: &[L]) {
        for (desc, kind, get) in &self.fields {
            match kind {
                MetricKind::Counter => emitter.counter(desc, get(value), labels),
                MetricKind::Gauge => emitter.gauge(desc, get(value), labels),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Stats {
        rx: String,
        temp: String,
    }

    #[test]
    fn test_registry() {
        let collectors = all();
        let names: Vec<&str> = collectors.iter().map(|c| c.name()).collect();
        assert_eq!(names, NAMES);

        assert!(is_known("bgp"));
        assert!(is_known("route_engine"));
        assert!(!is_known("isis"));
        assert!(!is_known("BGP"));
    }

    #[test]
    fn test_error_tally() {
        let tally = ErrorTally::new();
        assert_eq!(tally.total(), 0);
        assert_eq!(tally.record(), 1);
        assert_eq!(tally.record(), 2);
        assert_eq!(tally.total(), 2);
    }

    #[test]
    fn test_field_set() {
        let set = FieldSet::<Stats>::new(
            "test",
            &["port"],
            &[
                ("rx_packets", "Received.", MetricKind::Counter, |s| s.rx.as_str()),
                ("temp", "Temperature.", MetricKind::Gauge, |s| s.temp.as_str()),
            ],
        );

        let mut emitter = Emitter::new();
        let stats = Stats {
            rx: "12".to_string(),
            temp: String::new(),
        };
        set.emit(&mut emitter, &stats, &["p1"]);

        assert_eq!(emitter.len(), 1);
        let sample = &emitter.samples()[0];
        assert_eq!(sample.name(), "junos_test_rx_packets");
        assert_eq!(sample.kind, MetricKind::Counter);
        assert_eq!(sample.value, 12.0);
    }

    #[test]
    fn test_decode_attributes_and_flags() {
        #[derive(Debug, Default, Deserialize)]
        #[serde(default)]
        struct Item {
            name: String,
            #[serde(rename = "interface-flapped")]
            flapped: Seconds,
            temperature: Celsius,
            #[serde(rename = "iff-up")]
            up: Flag,
            #[serde(rename = "iff-down")]
            down: Flag,
        }

        #[derive(Debug, Default, Deserialize)]
        #[serde(default)]
        struct Reply {
            item: Vec<Item>,
        }

        let xml = r#"<rpc-reply xmlns:junos="http://xml.juniper.net/junos/18.1R1/junos">
            <item>
                <name>ge-0/0/0</name>
                <interface-flapped junos:seconds="3600">2024-01-01 00:00:00 UTC (01:00:00 ago)</interface-flapped>
                <temperature junos:celsius="41">41 degrees C / 105 degrees F</temperature>
                <iff-up/>
            </item>
            <other>ignored</other>
            <item><name>ge-0/0/1</name></item>
        </rpc-reply>"#;

        let reply: Reply = decode(xml).unwrap();
        assert_eq!(reply.item.len(), 2);
        assert_eq!(reply.item[0].name.trim(), "ge-0/0/0");
        assert_eq!(reply.item[0].flapped.seconds, "3600");
        assert_eq!(reply.item[0].temperature.celsius, "41");
        assert!(reply.item[0].up.is_some());
        assert!(reply.item[0].down.is_none());
        assert!(reply.item[1].up.is_none());
        assert_eq!(reply.item[1].flapped.seconds, "");
    }

    #[test]
    fn test_decode_failure() {
        #[derive(Debug, Default, Deserialize)]
        struct Reply {
            #[allow(dead_code)]
            item: String,
        }

        let err = decode::<Reply>("<rpc-reply><item>").unwrap_err();
        assert!(matches!(err, CollectError::Decode(_)));
    }
}
