//! Line card (FPC) state, temperature, CPU and memory.

use std::sync::Arc;

use async_trait::async_trait;
use junos_common::{Desc, MetricKind};
use serde::Deserialize;

use super::{CollectError, Collector, ErrorTally, FieldSet, decode, execute};
use crate::config::TargetConfig;
use crate::mapper::Emitter;
use crate::netconf::Session;

pub const NAME: &str = "fpc";

const RPC: &str = "<get-fpc-information/>";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Reply {
    #[serde(rename = "fpc-information")]
    information: FpcInformation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FpcInformation {
    fpc: Vec<Fpc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Fpc {
    slot: String,
    state: String,
    temperature: String,
    cpu_total: String,
    cpu_interrupt: String,
    #[serde(rename = "cpu-1min-avg")]
    cpu_1min_avg: String,
    #[serde(rename = "cpu-5min-avg")]
    cpu_5min_avg: String,
    #[serde(rename = "cpu-15min-avg")]
    cpu_15min_avg: String,
    memory_dram_size: String,
    memory_heap_utilization: String,
    memory_buffer_utilization: String,
}

/// Numeric encoding of an FPC state string.
fn state_value(state: &str) -> f64 {
    match state.trim().to_ascii_lowercase().as_str() {
        "offline" => 0.0,
        "online" => 1.0,
        "empty" => 2.0,
        _ => 3.0,
    }
}

pub struct FpcCollector {
    state: Arc<Desc>,
    cpu_avg: Arc<Desc>,
    online: FieldSet<Fpc>,
    errors: ErrorTally,
}

impl FpcCollector {
    #[rustfmt::skip]
    pub fn new() -> Self {
        Self {
            state: Desc::new(
                NAME,
                "state",
                "State (0 = Offline, 1 = Online, 2 = Empty, 3 = Other).",
                &["slot"],
            ),
            cpu_avg: Desc::new(
                NAME,
                "cpu_avg",
                "Average CPU utilization across timespan.",
                &["slot", "timespan"],
            ),
            online: FieldSet::<Fpc>::new(
                NAME,
                &["slot"],
                &[
                    ("temperature_celsius", "Temperature in Celsius.", MetricKind::Gauge, |f| f.temperature.as_str()),
                    ("cpu_total", "Total CPU utilization.", MetricKind::Gauge, |f| f.cpu_total.as_str()),
                    ("cpu_interrupt", "CPU interrupt utilization.", MetricKind::Gauge, |f| f.cpu_interrupt.as_str()),
                    ("memory_dram_size", "Memory DRAM size.", MetricKind::Gauge, |f| f.memory_dram_size.as_str()),
                    ("memory_heap_utilization", "Memory heap utilization.", MetricKind::Gauge, |f| f.memory_heap_utilization.as_str()),
                    ("memory_buffer_utilization", "Memory buffer utilization.", MetricKind::Gauge, |f| f.memory_buffer_utilization.as_str()),
                ],
            ),
            errors: ErrorTally::new(),
        }
    }

    fn process(&self, reply: &Reply, emitter: &mut Emitter) {
        for fpc in &reply.information.fpc {
            let slot = fpc.slot.trim();
            let state = state_value(&fpc.state);

            // detail is only meaningful for cards that are running
            if state == 1.0 {
                self.online.emit(emitter, fpc, &[slot]);
                for (raw, span) in [
                    (&fpc.cpu_1min_avg, "1m"),
                    (&fpc.cpu_5min_avg, "5m"),
                    (&fpc.cpu_15min_avg, "15m"),
                ] {
                    emitter.gauge(&self.cpu_avg, raw, &[slot, span]);
                }
            }

            emitter.gauge_value(&self.state, state, &[slot]);
        }
    }
}

impl Default for FpcCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for FpcCollector {
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
