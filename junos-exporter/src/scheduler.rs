//! Scrape orchestration.
//!
//! One scrape opens one NETCONF session to the target and runs every enabled
//! collector on it concurrently, each in its own task. The scrape completes
//! when all collectors have finished; a failing collector only affects its
//! own samples and its `collector_up` value.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use junos_common::{Desc, Sample};
use tracing::{debug, error, warn};

use crate::collector::{self, Collector};
use crate::config::TargetConfig;
use crate::mapper::Emitter;
use crate::netconf::{Connector, NetconfError};

/// Result of one scrape.
#[derive(Debug)]
pub struct Scrape {
    /// Samples in emission order, starting with the scrape counter.
    pub samples: Vec<Sample>,
    /// Set when the session could not be opened. No collector ran.
    pub error: Option<NetconfError>,
}

impl Scrape {
    /// Whether the device session was established.
    pub fn is_up(&self) -> bool {
        self.error.is_none()
    }
}

/// Bookkeeping descriptors shared by every scrape.
struct Bookkeeping {
    scrapes_total: Arc<Desc>,
    errors_total: Arc<Desc>,
    duration: Arc<Desc>,
    up: Arc<Desc>,
}

impl Bookkeeping {
    fn new() -> Self {
        let collector = &["collector"];
        Self {
            scrapes_total: Desc::bare("scrapes_total", "Total number of times Junos was scraped for metrics.", &[]),
            errors_total: Desc::bare(
                "scrape_errors_total",
                "Total number of scrape errors by collector.",
                collector,
            ),
            duration: Desc::bare(
                "scrape_duration_seconds",
                "Duration of a collector scrape.",
                collector,
            ),
            up: Desc::bare(
                "collector_up",
                "Whether the collector succeeded (1 = success, 0 = failure).",
                collector,
            ),
        }
    }
}

/// What one collector task hands back to the scrape.
struct Finished {
    samples: Vec<Sample>,
    errors: Vec<String>,
    total_errors: u64,
    elapsed: Duration,
}

/// Runs scrapes against a fixed set of collectors.
pub struct Scheduler {
    collectors: Vec<Arc<dyn Collector>>,
    scrapes: AtomicU64,
    bookkeeping: Bookkeeping,
}

impl Scheduler {
    /// Scheduler over every registered collector.
    pub fn new() -> Self {
        Self::with_collectors(collector::all())
    }

    pub fn with_collectors(collectors: Vec<Arc<dyn Collector>>) -> Self {
        Self {
            collectors,
            scrapes: AtomicU64::new(0),
            bookkeeping: Bookkeeping::new(),
        }
    }

    /// Number of scrapes started over the life of the scheduler.
    pub fn scrapes(&self) -> u64 {
        self.scrapes.load(Ordering::Relaxed)
    }

    /// Collectors enabled for `target`, in the target's configured order.
    /// Unknown and repeated names are skipped.
    pub fn enabled(&self, target: &TargetConfig) -> Vec<Arc<dyn Collector>> {
        let mut enabled: Vec<Arc<dyn Collector>> = Vec::new();
        for name in &target.collectors {
            if enabled.iter().any(|c| c.name() == name) {
                continue;
            }
            match self.collectors.iter().find(|c| c.name() == name) {
                Some(collector) => enabled.push(Arc::clone(collector)),
                None => warn!(collector = %name, "ignoring unknown collector"),
            }
        }
        enabled
    }

    /// Scrape one target.
    pub async fn scrape(&self, target: &TargetConfig, connector: &dyn Connector) -> Scrape {
        let count = self.scrapes.fetch_add(1, Ordering::Relaxed) + 1;

        let mut emitter = Emitter::new();
        emitter.counter_value(&self.bookkeeping.scrapes_total, count as f64, &[] as &[&str]);

        let session = match connector.connect(target).await {
            Ok(session) => session,
            Err(e) => {
                error!(device = %target.target, error = %e, "could not open session");
                return Scrape {
                    samples: emitter.into_samples(),
                    error: Some(e),
                };
            }
        };

        let target = Arc::new(target.clone());
        let started = Instant::now();

        let handles: Vec<_> = self
            .enabled(&target)
            .into_iter()
            .map(|collector| {
                let owner = Arc::clone(&collector);
                let session = Arc::clone(&session);
                let target = Arc::clone(&target);
                let name = collector.name();
                let handle = tokio::spawn(async move {
                    let start = Instant::now();
                    let mut emitter = Emitter::new();
                    let outcome = collector.get(session.as_ref(), &target, &mut emitter).await;
                    if emitter.conversion_failures() > 0 {
                        debug!(
                            collector = name,
                            failures = emitter.conversion_failures(),
                            "skipped fields that were not numeric"
                        );
                    }
                    Finished {
                        samples: emitter.into_samples(),
                        errors: outcome.errors.iter().map(|e| e.to_string()).collect(),
                        total_errors: outcome.total_errors,
                        elapsed: start.elapsed(),
                    }
                });
                (owner, name, handle)
            })
            .collect();

        let mut samples = emitter.into_samples();
        let mut bookkeeping = Emitter::new();

        for (collector, name, handle) in handles {
            let finished = match handle.await {
                Ok(finished) => finished,
                Err(e) => {
                    // the task panicked; report it like any other failure
                    collector.errors().record();
                    Finished {
                        samples: Vec::new(),
                        errors: vec![format!("collector task failed: {e}")],
                        total_errors: collector.errors().total(),
                        elapsed: started.elapsed(),
                    }
                }
            };

            for e in &finished.errors {
                error!(collector = name, device = %target.target, error = %e, "collector failed");
            }

            let labels = [name];
            bookkeeping.gauge_value(&self.bookkeeping.duration, finished.elapsed.as_secs_f64(), &labels);
            bookkeeping.flag(&self.bookkeeping.up, finished.errors.is_empty(), &labels);
            bookkeeping.gauge_value(&self.bookkeeping.errors_total, finished.total_errors as f64, &labels);
            samples.extend(finished.samples);
        }

        session.close().await;
        debug!(
            device = %target.target,
            elapsed_ms = started.elapsed().as_millis() as u64,
            samples = samples.len(),
            "scrape finished"
        );

        samples.extend(bookkeeping.into_samples());
        Scrape {
            samples,
            error: None,
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use junos_common::MetricKind;
    use crate::netconf::{ReplayConnector, ReplaySession};

    const OSPF_RPC: &str = "<get-ospf-neighbor-information/>";
    const FPC_RPC: &str = "<get-fpc-information/>";

    const OSPF_REPLY: &str = r#"<rpc-reply>
    <ospf-neighbor-information>
        <ospf-neighbor>
            <neighbor-address>10.1.0.2</neighbor-address>
            <interface-name>ae0.0</interface-name>
            <ospf-neighbor-state>Full</ospf-neighbor-state>
            <neighbor-id>10.255.0.2</neighbor-id>
        </ospf-neighbor>
    </ospf-neighbor-information>
</rpc-reply>"#;

    fn value<'a>(samples: &'a [Sample], name: &str, collector: &str) -> Option<&'a Sample> {
        samples
            .iter()
            .find(|s| s.name() == name && s.label("collector") == Some(collector))
    }

    #[test]
    fn test_enabled_order_and_filtering() {
        let scheduler = Scheduler::new();
        let target = TargetConfig::new("router1", &["ospf", "isis", "interface", "ospf"]);

        let names: Vec<&str> = scheduler.enabled(&target).iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["ospf", "interface"]);
    }

    #[tokio::test]
    async fn test_scrape_counts_and_bookkeeping() {
        let session = Arc::new(
            ReplaySession::new()
                .reply(OSPF_RPC, OSPF_REPLY)
                .fail(FPC_RPC, "syntax error"),
        );
        let connector = ReplayConnector::new(Arc::clone(&session));
        let scheduler = Scheduler::new();
        let target = TargetConfig::new("router1", &["ospf", "fpc"]);

        let scrape = scheduler.scrape(&target, &connector).await;
        assert!(scrape.is_up());

        let samples = &scrape.samples;
        assert_eq!(samples[0].name(), "junos_scrapes_total");
        assert_eq!(samples[0].kind, MetricKind::Counter);
        assert_eq!(samples[0].value, 1.0);

        let neighbor = samples
            .iter()
            .find(|s| s.name() == "junos_ospf_neighbor_status")
            .unwrap();
        assert_eq!(neighbor.value, 1.0);

        assert_eq!(value(samples, "junos_collector_up", "ospf").unwrap().value, 1.0);
        assert_eq!(value(samples, "junos_collector_up", "fpc").unwrap().value, 0.0);
        assert_eq!(value(samples, "junos_scrape_errors_total", "ospf").unwrap().value, 0.0);
        assert_eq!(value(samples, "junos_scrape_errors_total", "fpc").unwrap().value, 1.0);
        assert!(value(samples, "junos_scrape_duration_seconds", "fpc").is_some());
        assert!(value(samples, "junos_scrape_duration_seconds", "ospf").is_some());

        assert!(session.is_closed());
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn test_error_totals_accumulate() {
        let session = Arc::new(ReplaySession::new().fail(FPC_RPC, "syntax error"));
        let connector = ReplayConnector::new(session);
        let scheduler = Scheduler::new();
        let target = TargetConfig::new("router1", &["fpc"]);

        scheduler.scrape(&target, &connector).await;
        let scrape = scheduler.scrape(&target, &connector).await;

        assert_eq!(scrape.samples[0].value, 2.0);
        assert_eq!(value(&scrape.samples, "junos_scrape_errors_total", "fpc").unwrap().value, 2.0);
        assert_eq!(scheduler.scrapes(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_target() {
        let connector = ReplayConnector::unreachable();
        let scheduler = Scheduler::new();
        let target = TargetConfig::new("router1", &["ospf"]);

        let scrape = scheduler.scrape(&target, &connector).await;

        assert!(!scrape.is_up());
        assert!(matches!(scrape.error, Some(NetconfError::Connect { .. })));
        assert_eq!(scrape.samples.len(), 1);
        assert_eq!(scrape.samples[0].name(), "junos_scrapes_total");
    }
}
