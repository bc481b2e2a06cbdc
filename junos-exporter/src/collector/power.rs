//! Power supply modules and zone budgets.

use std::sync::Arc;

use async_trait::async_trait;
use junos_common::{Desc, MetricKind};
use serde::Deserialize;

use super::{CollectError, Collector, ErrorTally, FieldSet, decode, execute};
use crate::config::TargetConfig;
use crate::mapper::Emitter;
use crate::netconf::Session;

pub const NAME: &str = "power";

const RPC: &str = "<get-power-usage-information-detail></get-power-usage-information-detail>";

const NO_LABELS: [&str; 0] = [];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Reply {
    #[serde(rename = "power-usage-information")]
    information: PowerInformation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PowerInformation {
    #[serde(rename = "power-usage-item")]
    items: Vec<PowerItem>,
    #[serde(rename = "power-usage-system")]
    systems: Vec<PowerSystem>,
    #[serde(rename = "power-usage-fru-item")]
    fru_items: Vec<FruItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct PowerItem {
    name: String,
    state: String,
    pem_capacity_detail: PemCapacity,
    ac_input_detail: AcInput,
    dc_output_detail: DcOutput,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct PemCapacity {
    capacity_actual: String,
    capacity_max: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct AcInput {
    ac_input: String,
    ac_expect_feed: String,
    ac_actual_feed: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct DcOutput {
    dc_power: String,
    zone: String,
    dc_current: String,
    dc_voltage: String,
    dc_load: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct PowerSystem {
    #[serde(rename = "power-usage-zone-information")]
    zones: Vec<Zone>,
    capacity_sys_actual: String,
    capacity_sys_max: String,
    capacity_sys_remaining: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Zone {
    zone: String,
    capacity_actual: String,
    capacity_max: String,
    capacity_allocated: String,
    capacity_remaining: String,
    capacity_actual_usage: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct FruItem {
    name: String,
    dc_power: String,
}

pub struct PowerCollector {
    state: Arc<Desc>,
    ac_input_state: Arc<Desc>,
    dc_usage: Arc<Desc>,
    module: FieldSet<PowerItem>,
    dc_output: FieldSet<DcOutput>,
    zone: FieldSet<Zone>,
    system: FieldSet<PowerSystem>,
    errors: ErrorTally,
}

impl PowerCollector {
    #[rustfmt::skip]
    pub fn new() -> Self {
        let module = &["module"];
        Self {
            state: Desc::new(
                NAME,
                "module_state",
                "Module Power State (1 = Online, 0 = Offline).",
                module,
            ),
            ac_input_state: Desc::new(
                NAME,
                "module_ac_input_state",
                "Module AC Input State (1 = OK, 0 = Not OK).",
                module,
            ),
            dc_usage: Desc::new(NAME, "module_dc_usage_watts", "Module DC Usage in Watts.", module),
            module: FieldSet::<PowerItem>::new(
                NAME,
                module,
                &[
                    ("module_capacity_actual_watts", "Module Actual Capacity in Watts", MetricKind::Gauge, |p| p.pem_capacity_detail.capacity_actual.as_str()),
                    ("module_capacity_maximum_watts", "Module Maximum Capacity in Watts", MetricKind::Gauge, |p| p.pem_capacity_detail.capacity_max.as_str()),
                    ("module_ac_input_expected_feeds", "Module AC Input Expected Feeds.", MetricKind::Gauge, |p| p.ac_input_detail.ac_expect_feed.as_str()),
                    ("module_ac_input_connected_feeds", "Module AC Input Connected Feeds.", MetricKind::Gauge, |p| p.ac_input_detail.ac_actual_feed.as_str()),
                ],
            ),
            dc_output: FieldSet::<DcOutput>::new(
                NAME,
                &["module", "zone"],
                &[
                    ("module_dc_output_watts", "Module DC Output Watts (Power).", MetricKind::Gauge, |d| d.dc_power.as_str()),
                    ("module_dc_output_amperes", "Module DC Output Amps (Current).", MetricKind::Gauge, |d| d.dc_current.as_str()),
                    ("module_dc_output_volts", "Module DC Output Volts (Voltage).", MetricKind::Gauge, |d| d.dc_voltage.as_str()),
                    ("module_dc_output_load_ratio", "Module DC Output Load as a Percent.", MetricKind::Gauge, |d| d.dc_load.as_str()),
                ],
            ),
            zone: FieldSet::<Zone>::new(
                NAME,
                &["zone"],
                &[
                    ("system_zone_capacity_actual_watts", "System Zone Actual Capacity in Watts", MetricKind::Gauge, |z| z.capacity_actual.as_str()),
                    ("system_zone_capacity_maximum_watts", "System Zone Maximum Capacity in Watts", MetricKind::Gauge, |z| z.capacity_max.as_str()),
                    ("system_zone_allocated_watts", "System Zone Allocated Capacity in Watts", MetricKind::Gauge, |z| z.capacity_allocated.as_str()),
                    ("system_zone_remaining_watts", "System Zone Remaining Capacity in Watts", MetricKind::Gauge, |z| z.capacity_remaining.as_str()),
                    ("system_zone_usage_watts", "System Zone Usage in Watts", MetricKind::Gauge, |z| z.capacity_actual_usage.as_str()),
                ],
            ),
            system: FieldSet::<PowerSystem>::new(
                NAME,
                &NO_LABELS,
                &[
                    ("system_capacity_actual_watts", "System Actual Capacity in Watts", MetricKind::Gauge, |s| s.capacity_sys_actual.as_str()),
                    ("system_capacity_maximum_watts", "System Maximum Capacity in Watts", MetricKind::Gauge, |s| s.capacity_sys_max.as_str()),
                    ("system_remaining_watts", "System Remaining Capacity in Watts", MetricKind::Gauge, |s| s.capacity_sys_remaining.as_str()),
                ],
            ),
            errors: ErrorTally::new(),
        }
    }

    fn process(&self, reply: &Reply, emitter: &mut Emitter) {
        let information = &reply.information;

        for item in &information.items {
            let name = item.name.trim();
            emitter.state(&self.state, &item.state, "Online", &[name]);
            self.module.emit(emitter, item, &[name]);
            emitter.state(&self.ac_input_state, &item.ac_input_detail.ac_input, "OK", &[name]);

            let dc = &item.dc_output_detail;
            self.dc_output.emit(emitter, dc, &[name, dc.zone.trim()]);
        }

        for system in &information.systems {
            for zone in &system.zones {
                self.zone.emit(emitter, zone, &[zone.zone.trim()]);
            }
            self.system.emit(emitter, system, &NO_LABELS);
        }

        for fru in &information.fru_items {
            emitter.gauge(&self.dc_usage, &fru.dc_power, &[fru.name.trim()]);
        }
    }
}

impl Default for PowerCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for PowerCollector {
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
