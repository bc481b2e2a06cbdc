//! Routing engine health, memory, CPU and mastership.

use std::sync::Arc;

use async_trait::async_trait;
use junos_common::{Desc, MetricKind};
use serde::Deserialize;

use super::{Celsius, CollectError, Collector, ErrorTally, FieldSet, Seconds, decode, execute};
use crate::config::TargetConfig;
use crate::mapper::Emitter;
use crate::netconf::Session;

pub const NAME: &str = "route_engine";

const RPC: &str = "<get-route-engine-information/>";

/// Slot label used when the device reports a single unnumbered engine.
const SINGLE_RE: &str = "singleRE";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Reply {
    #[serde(rename = "route-engine-information")]
    information: RouteEngineInformation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RouteEngineInformation {
    #[serde(rename = "route-engine")]
    engines: Vec<RouteEngine>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct RouteEngine {
    slot: String,
    mastership_state: String,
    status: String,
    temperature: Celsius,
    cpu_temperature: Celsius,
    up_time: Seconds,
    memory_dram_size: String,
    memory_installed_size: String,
    memory_buffer_utilization: String,
    memory_system_total: String,
    memory_system_total_used: String,
    cpu_user: String,
    cpu_background: String,
    cpu_system: String,
    cpu_interrupt: String,
    cpu_idle: String,
    cpu_user1: String,
    cpu_background1: String,
    cpu_system1: String,
    cpu_interrupt1: String,
    cpu_idle1: String,
    cpu_user2: String,
    cpu_background2: String,
    cpu_system2: String,
    cpu_interrupt2: String,
    cpu_idle2: String,
    cpu_user3: String,
    cpu_background3: String,
    cpu_system3: String,
    cpu_interrupt3: String,
    cpu_idle3: String,
    load_average_one: String,
    load_average_five: String,
    load_average_fifteen: String,
}

/// CPU figures for one averaging window: user, background, system, interrupt, idle.
struct Window<'a> {
    span: &'static str,
    cpu: [&'a str; 5],
    load: Option<&'a str>,
}

impl RouteEngine {
    fn slot(&self) -> &str {
        match self.slot.trim() {
            "" => SINGLE_RE,
            slot => slot,
        }
    }

    fn windows(&self) -> [Window<'_>; 4] {
        [
            Window {
                span: "5s",
                cpu: [&self.cpu_user, &self.cpu_background, &self.cpu_system, &self.cpu_interrupt, &self.cpu_idle],
                load: None,
            },
            Window {
                span: "1m",
                cpu: [&self.cpu_user1, &self.cpu_background1, &self.cpu_system1, &self.cpu_interrupt1, &self.cpu_idle1],
                load: Some(&self.load_average_one),
            },
            Window {
                span: "5m",
                cpu: [&self.cpu_user2, &self.cpu_background2, &self.cpu_system2, &self.cpu_interrupt2, &self.cpu_idle2],
                load: Some(&self.load_average_five),
            },
            Window {
                span: "15m",
                cpu: [&self.cpu_user3, &self.cpu_background3, &self.cpu_system3, &self.cpu_interrupt3, &self.cpu_idle3],
                load: Some(&self.load_average_fifteen),
            },
        ]
    }
}

pub struct RouteEngineCollector {
    state: Arc<Desc>,
    mastership_state: Arc<Desc>,
    mastership_priority: Arc<Desc>,
    memory_mb: [Arc<Desc>; 4],
    cpu: [Arc<Desc>; 5],
    load_average: Arc<Desc>,
    health: FieldSet<RouteEngine>,
    errors: ErrorTally,
}

impl RouteEngineCollector {
    #[rustfmt::skip]
    pub fn new() -> Self {
        let slot = &["slot"];
        let window = &["slot", "timespan"];
        Self {
            state: Desc::new(NAME, "state", "RE state (1 = OK, 0 = Not OK).", slot),
            mastership_state: Desc::new(
                NAME,
                "mastership_state",
                "Mastership state (1 = Master, 0 = Backup).",
                slot,
            ),
            mastership_priority: Desc::new(
                NAME,
                "mastership_priority",
                "Mastership priority (1 = Master, 0 = Backup).",
                slot,
            ),
            memory_mb: [
                Desc::new(NAME, "memory_total_bytes", "Total route engine memory in bytes.", slot),
                Desc::new(NAME, "memory_used_bytes", "Used route engine memory in bytes.", slot),
                Desc::new(NAME, "memory_dram_size_bytes", "Memory DRAM size in bytes.", slot),
                Desc::new(NAME, "memory_installed_size_bytes", "Memory installed size in bytes.", slot),
            ],
            cpu: [
                Desc::new(NAME, "cpu_user_percent", "User CPU utilization as a percent.", window),
                Desc::new(NAME, "cpu_background_percent", "Background CPU utilization as a percent.", window),
                Desc::new(NAME, "cpu_system_percent", "System CPU utilization as a percent.", window),
                Desc::new(NAME, "cpu_interrupt_percent", "Interrupt CPU utilization as a percent.", window),
                Desc::new(NAME, "cpu_idle_percent", "Idle CPU utilization as a percent.", window),
            ],
            load_average: Desc::new(NAME, "load_average", "LoadAverage.", window),
            health: FieldSet::<RouteEngine>::new(
                NAME,
                slot,
                &[
                    ("temperature_celsius", "Route engine temperature in degrees celsius.", MetricKind::Gauge, |r| r.temperature.celsius.as_str()),
                    ("cpu_temperature_celsius", "Route engine CPU temperature in degrees celsius.", MetricKind::Gauge, |r| r.cpu_temperature.celsius.as_str()),
                    ("uptime_seconds", "Uptime in seconds.", MetricKind::Gauge, |r| r.up_time.seconds.as_str()),
                    ("memory_buffer_utilization_percent", "Memory buffer utilization as a percent.", MetricKind::Gauge, |r| r.memory_buffer_utilization.as_str()),
                ],
            ),
            errors: ErrorTally::new(),
        }
    }

    fn process(&self, reply: &Reply, emitter: &mut Emitter) {
        for engine in &reply.information.engines {
            let slot = engine.slot();

            emitter.state(&self.state, &engine.status, "ok", &[slot]);
            self.health.emit(emitter, engine, &[slot]);

            let memory = [
                &engine.memory_system_total,
                &engine.memory_system_total_used,
                &engine.memory_dram_size,
                &engine.memory_installed_size,
            ];
            for (desc, raw) in self.memory_mb.iter().zip(memory) {
                emitter.gauge_mb(desc, raw, &[slot]);
            }

            for window in engine.windows() {
                let labels = [slot, window.span];
                for (desc, raw) in self.cpu.iter().zip(window.cpu) {
                    emitter.gauge(desc, raw, &labels);
                }
                if let Some(load) = window.load {
                    emitter.gauge(&self.load_average, load, &labels);
                }
            }

            let mastership = engine.mastership_state.trim().to_ascii_lowercase();
            emitter.flag(&self.mastership_state, mastership == "master", &[slot]);
            emitter.flag(&self.mastership_priority, mastership.contains("master"), &[slot]);
        }
    }
}

impl Default for RouteEngineCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for RouteEngineCollector {
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

#[cfg(test)]
mod tests {
    use super::*;
    use junos_common::Sample;

    const REPLY: &str = r#"<rpc-reply xmlns:junos="http://xml.juniper.net/junos/20.2R3/junos">
    <route-engine-information xmlns="http://xml.juniper.net/junos/20.2R3/junos-chassis">
        <route-engine>
            <slot>0</slot>
            <mastership-state>master</mastership-state>
            <mastership-priority>master (default)</mastership-priority>
            <status>OK</status>
            <temperature junos:celsius="41">41 degrees C / 105 degrees F</temperature>
            <cpu-temperature junos:celsius="46">46 degrees C / 114 degrees F</cpu-temperature>
            <memory-dram-size>16384 MB</memory-dram-size>
            <memory-installed-size>(16384 MB installed)</memory-installed-size>
            <memory-buffer-utilization>17</memory-buffer-utilization>
            <cpu-user>3</cpu-user>
            <cpu-background>0</cpu-background>
            <cpu-system>2</cpu-system>
            <cpu-interrupt>0</cpu-interrupt>
            <cpu-idle>95</cpu-idle>
            <cpu-user1>4</cpu-user1>
            <cpu-background1>0</cpu-background1>
            <cpu-system1>2</cpu-system1>
            <cpu-interrupt1>0</cpu-interrupt1>
            <cpu-idle1>94</cpu-idle1>
            <cpu-user2>4</cpu-user2>
            <cpu-background2>0</cpu-background2>
            <cpu-system2>2</cpu-system2>
            <cpu-interrupt2>0</cpu-interrupt2>
            <cpu-idle2>94</cpu-idle2>
            <cpu-user3>4</cpu-user3>
            <cpu-background3>0</cpu-background3>
            <cpu-system3>2</cpu-system3>
            <cpu-interrupt3>0</cpu-interrupt3>
            <cpu-idle3>94</cpu-idle3>
            <up-time junos:seconds="8640000">100 days</up-time>
            <load-average-one>0.31</load-average-one>
            <load-average-five>0.28</load-average-five>
            <load-average-fifteen>0.25</load-average-fifteen>
        </route-engine>
        <route-engine>
            <mastership-state>backup</mastership-state>
            <status>Testing</status>
        </route-engine>
    </route-engine-information>
</rpc-reply>"#;

    fn run() -> Vec<Sample> {
        let collector = RouteEngineCollector::new();
        let reply: Reply = decode(REPLY).unwrap();
        let mut emitter = Emitter::new();
        collector.process(&reply, &mut emitter);
        emitter.into_samples()
    }

    fn value(samples: &[Sample], name: &str, slot: &str) -> Option<f64> {
        samples
            .iter()
            .find(|s| s.name() == name && s.label("slot") == Some(slot))
            .map(|s| s.value)
    }

    #[test]
    fn test_master_engine() {
        let samples = run();

        assert_eq!(value(&samples, "junos_route_engine_state", "0"), Some(1.0));
        assert_eq!(value(&samples, "junos_route_engine_temperature_celsius", "0"), Some(41.0));
        assert_eq!(value(&samples, "junos_route_engine_uptime_seconds", "0"), Some(8_640_000.0));
        assert_eq!(
            value(&samples, "junos_route_engine_memory_dram_size_bytes", "0"),
            Some(16_384_000_000.0)
        );
        assert_eq!(
            value(&samples, "junos_route_engine_memory_installed_size_bytes", "0"),
            Some(16_384_000_000.0)
        );
        assert_eq!(value(&samples, "junos_route_engine_mastership_state", "0"), Some(1.0));
        assert_eq!(value(&samples, "junos_route_engine_mastership_priority", "0"), Some(1.0));
    }

    #[test]
    fn test_cpu_windows() {
        let samples = run();

        let idle: Vec<(&str, f64)> = samples
            .iter()
            .filter(|s| s.name() == "junos_route_engine_cpu_idle_percent")
            .map(|s| (s.label("timespan").unwrap(), s.value))
            .collect();
        assert_eq!(idle, vec![("5s", 95.0), ("1m", 94.0), ("5m", 94.0), ("15m", 94.0)]);

        let load: Vec<&str> = samples
            .iter()
            .filter(|s| s.name() == "junos_route_engine_load_average")
            .map(|s| s.label("timespan").unwrap())
            .collect();
        assert_eq!(load, vec!["1m", "5m", "15m"]);
    }

    #[test]
    fn test_single_engine_slot() {
        let samples = run();

        assert_eq!(value(&samples, "junos_route_engine_state", SINGLE_RE), Some(0.0));
        assert_eq!(value(&samples, "junos_route_engine_mastership_state", SINGLE_RE), Some(0.0));
        assert_eq!(value(&samples, "junos_route_engine_mastership_priority", SINGLE_RE), Some(0.0));
        assert_eq!(value(&samples, "junos_route_engine_temperature_celsius", SINGLE_RE), None);
    }
}
