//! Optical transceiver diagnostics.

use std::sync::Arc;

use async_trait::async_trait;
use junos_common::{Desc, MetricKind};
use serde::Deserialize;

use super::{Celsius, CollectError, Collector, ErrorTally, FieldSet, decode, execute};
use crate::config::TargetConfig;
use crate::mapper::Emitter;
use crate::netconf::Session;

pub const NAME: &str = "optics";

const RPC: &str =
    "<get-interface-optics-diagnostics-information></get-interface-optics-diagnostics-information>";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Reply {
    #[serde(rename = "interface-information")]
    information: OpticsInformation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OpticsInformation {
    #[serde(rename = "physical-interface")]
    interfaces: Vec<PhysicalInterface>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct PhysicalInterface {
    name: String,
    optics_diagnostics: Diagnostics,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Diagnostics {
    module_temperature: Celsius,
    module_voltage: String,
    module_temperature_high_alarm: String,
    module_temperature_low_alarm: String,
    module_temperature_high_warn: String,
    module_temperature_low_warn: String,
    module_voltage_high_alarm: String,
    module_voltage_low_alarm: String,
    module_voltage_high_warn: String,
    module_voltage_low_warn: String,
    module_temperature_high_alarm_threshold: Celsius,
    module_temperature_low_alarm_threshold: Celsius,
    module_temperature_high_warn_threshold: Celsius,
    module_temperature_low_warn_threshold: Celsius,
    module_voltage_high_alarm_threshold: String,
    module_voltage_low_alarm_threshold: String,
    module_voltage_high_warn_threshold: String,
    module_voltage_low_warn_threshold: String,
    laser_bias_current_high_alarm_threshold: String,
    laser_bias_current_low_alarm_threshold: String,
    laser_bias_current_high_warn_threshold: String,
    laser_bias_current_low_warn_threshold: String,
    laser_tx_power_high_alarm_threshold: String,
    laser_tx_power_high_alarm_threshold_dbm: String,
    laser_tx_power_low_alarm_threshold: String,
    laser_tx_power_low_alarm_threshold_dbm: String,
    laser_tx_power_high_warn_threshold: String,
    laser_tx_power_high_warn_threshold_dbm: String,
    laser_tx_power_low_warn_threshold: String,
    laser_tx_power_low_warn_threshold_dbm: String,
    laser_rx_power_high_alarm_threshold: String,
    laser_rx_power_high_alarm_threshold_dbm: String,
    laser_rx_power_low_alarm_threshold: String,
    laser_rx_power_low_alarm_threshold_dbm: String,
    laser_rx_power_high_warn_threshold: String,
    laser_rx_power_high_warn_threshold_dbm: String,
    laser_rx_power_low_warn_threshold: String,
    laser_rx_power_low_warn_threshold_dbm: String,
    #[serde(rename = "optics-diagnostics-lane-values")]
    lanes: Vec<Lane>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Lane {
    lane_index: String,
    laser_bias_current: String,
    laser_output_power: String,
    laser_output_power_dbm: String,
    laser_rx_optical_power: String,
    laser_rx_optical_power_dbm: String,
    laser_bias_current_high_alarm: String,
    laser_bias_current_low_alarm: String,
    laser_bias_current_high_warn: String,
    laser_bias_current_low_warn: String,
    laser_rx_power_high_alarm: String,
    laser_rx_power_low_alarm: String,
    laser_rx_power_high_warn: String,
    laser_rx_power_low_warn: String,
    tx_loss_of_signal_functionality_alarm: String,
    rx_loss_of_signal_alarm: String,
    tx_laser_disabled_alarm: String,
}

/// Alarm or warning indicators, reported by the device as `on` or `off`.
/// A clear indicator (`off`) is exported as 1.
struct Flags<T> {
    fields: Vec<(Arc<Desc>, fn(&T) -> &str)>,
}

impl<T> Flags<T> {
    fn new(labels: &[&str], table: &[(&'static str, &'static str, fn(&T) -> &str)]) -> Self {
        let fields = table
            .iter()
            .map(|(name, help, get)| (Desc::new(NAME, name, help, labels), *get))
            .collect();
        Self { fields }
    }

    fn emit(&self, emitter: &mut Emitter, value: &T, labels: &[&str]) {
        for (desc, get) in &self.fields {
            emitter.state(desc, get(value), CLEAR, labels);
        }
    }
}

const CLEAR: &str = "off";

pub struct OpticsCollector {
    module: FieldSet<Diagnostics>,
    module_flags: Flags<Diagnostics>,
    lane: FieldSet<Lane>,
    lane_flags: Flags<Lane>,
    errors: ErrorTally,
}

impl OpticsCollector {
    #[rustfmt::skip]
    pub fn new() -> Self {
        let interface = &["interface"];
        let lane = &["interface", "lane"];
        Self {
            module: FieldSet::<Diagnostics>::new(
                NAME,
                interface,
                &[
                    ("module_temperature", "Module Temperature", MetricKind::Gauge, |d| d.module_temperature.celsius.as_str()),
                    ("module_voltage", "Module Voltage", MetricKind::Gauge, |d| d.module_voltage.as_str()),
                    ("module_temperature_high_alarm_threshold", "Module Temperature High Alarm Threshold", MetricKind::Gauge, |d| d.module_temperature_high_alarm_threshold.celsius.as_str()),
                    ("module_temperature_low_alarm_threshold", "Module Temperature Low Alarm Threshold", MetricKind::Gauge, |d| d.module_temperature_low_alarm_threshold.celsius.as_str()),
                    ("module_temperature_high_warn_threshold", "Module Temperature High Warn Threshold", MetricKind::Gauge, |d| d.module_temperature_high_warn_threshold.celsius.as_str()),
                    ("module_temperature_low_warn_threshold", "Module Temperature Low Warn Threshold", MetricKind::Gauge, |d| d.module_temperature_low_warn_threshold.celsius.as_str()),
                    ("module_voltage_high_alarm_threshold", "Module Voltage High Alarm Threshold", MetricKind::Gauge, |d| d.module_voltage_high_alarm_threshold.as_str()),
                    ("module_voltage_low_alarm_threshold", "Module Voltage Low Alarm Threshold", MetricKind::Gauge, |d| d.module_voltage_low_alarm_threshold.as_str()),
                    ("module_voltage_high_warn_threshold", "Module Voltage High Warn Threshold", MetricKind::Gauge, |d| d.module_voltage_high_warn_threshold.as_str()),
                    ("module_voltage_low_warn_threshold", "Module Voltage Low Warn Threshold", MetricKind::Gauge, |d| d.module_voltage_low_warn_threshold.as_str()),
                    ("laser_bias_current_high_alarm_threshold", "Laser Bias Current High Alarm Threshold", MetricKind::Gauge, |d| d.laser_bias_current_high_alarm_threshold.as_str()),
                    ("laser_bias_current_low_alarm_threshold", "Laser Bias Current Low Alarm Threshold", MetricKind::Gauge, |d| d.laser_bias_current_low_alarm_threshold.as_str()),
                    ("laser_bias_current_high_warn_threshold", "Laser Bias Current High Warn Threshold", MetricKind::Gauge, |d| d.laser_bias_current_high_warn_threshold.as_str()),
                    ("laser_bias_current_low_warn_threshold", "Laser Bias Current Low Warn Threshold", MetricKind::Gauge, |d| d.laser_bias_current_low_warn_threshold.as_str()),
                    ("laser_tx_power_high_alarm_threshold", "Laser Tx Power High Alarm Threshold", MetricKind::Gauge, |d| d.laser_tx_power_high_alarm_threshold.as_str()),
                    ("laser_tx_power_high_alarm_threshold_dbm", "Laser Tx Power High Alarm Threshold Dbm", MetricKind::Gauge, |d| d.laser_tx_power_high_alarm_threshold_dbm.as_str()),
                    ("laser_tx_power_low_alarm_threshold", "Laser Tx Power Low Alarm Threshold", MetricKind::Gauge, |d| d.laser_tx_power_low_alarm_threshold.as_str()),
                    ("laser_tx_power_low_alarm_threshold_dbm", "Laser Tx Power Low Alarm Threshold Dbm", MetricKind::Gauge, |d| d.laser_tx_power_low_alarm_threshold_dbm.as_str()),
                    ("laser_tx_power_high_warn_threshold", "Laser Tx Power High Warn Threshold", MetricKind::Gauge, |d| d.laser_tx_power_high_warn_threshold.as_str()),
                    ("laser_tx_power_high_warn_threshold_dbm", "Laser Tx Power High Warn Threshold Dbm", MetricKind::Gauge, |d| d.laser_tx_power_high_warn_threshold_dbm.as_str()),
                    ("laser_tx_power_low_warn_threshold", "Laser Tx Power Low Warn Threshold", MetricKind::Gauge, |d| d.laser_tx_power_low_warn_threshold.as_str()),
                    ("laser_tx_power_low_warn_threshold_dbm", "Laser Tx Power Low Warn Threshold Dbm", MetricKind::Gauge, |d| d.laser_tx_power_low_warn_threshold_dbm.as_str()),
                    ("laser_rx_power_high_alarm_threshold", "Laser Rx Power High Alarm Threshold", MetricKind::Gauge, |d| d.laser_rx_power_high_alarm_threshold.as_str()),
                    ("laser_rx_power_high_alarm_threshold_dbm", "Laser Rx Power High Alarm Threshold Dbm", MetricKind::Gauge, |d| d.laser_rx_power_high_alarm_threshold_dbm.as_str()),
                    ("laser_rx_power_low_alarm_threshold", "Laser Rx Power Low Alarm Threshold", MetricKind::Gauge, |d| d.laser_rx_power_low_alarm_threshold.as_str()),
                    ("laser_rx_power_low_alarm_threshold_dbm", "Laser Rx Power Low Alarm Threshold Dbm", MetricKind::Gauge, |d| d.laser_rx_power_low_alarm_threshold_dbm.as_str()),
                    ("laser_rx_power_high_warn_threshold", "Laser Rx Power High Warn Threshold", MetricKind::Gauge, |d| d.laser_rx_power_high_warn_threshold.as_str()),
                    ("laser_rx_power_high_warn_threshold_dbm", "Laser Rx Power High Warn Threshold Dbm", MetricKind::Gauge, |d| d.laser_rx_power_high_warn_threshold_dbm.as_str()),
                    ("laser_rx_power_low_warn_threshold", "Laser Rx Power Low Warn Threshold", MetricKind::Gauge, |d| d.laser_rx_power_low_warn_threshold.as_str()),
                    ("laser_rx_power_low_warn_threshold_dbm", "Laser Rx Power Low Warn Threshold Dbm", MetricKind::Gauge, |d| d.laser_rx_power_low_warn_threshold_dbm.as_str()),
                ],
            ),
            module_flags: Flags::<Diagnostics>::new(
                interface,
                &[
                    ("module_temperature_high_alarm", "Module Temperature High Alarm", |d| d.module_temperature_high_alarm.as_str()),
                    ("module_temperature_low_alarm", "Module Temperature Low Alarm", |d| d.module_temperature_low_alarm.as_str()),
                    ("module_temperature_high_warn", "Module Temperature High Warn", |d| d.module_temperature_high_warn.as_str()),
                    ("module_temperature_low_warn", "Module Temperature Low Warn", |d| d.module_temperature_low_warn.as_str()),
                    ("module_voltage_high_alarm", "Module Voltage High Alarm", |d| d.module_voltage_high_alarm.as_str()),
                    ("module_voltage_low_alarm", "Module Voltage Low Alarm", |d| d.module_voltage_low_alarm.as_str()),
                    ("module_voltage_high_warn", "Module Voltage High Warn", |d| d.module_voltage_high_warn.as_str()),
                    ("module_voltage_low_warn", "Module Voltage Low Warn", |d| d.module_voltage_low_warn.as_str()),
                ],
            ),
            lane: FieldSet::<Lane>::new(
                NAME,
                lane,
                &[
                    ("lane_index", "Lane Index", MetricKind::Gauge, |l| l.lane_index.as_str()),
                    ("laser_bias_current", "Laser Bias Current", MetricKind::Gauge, |l| l.laser_bias_current.as_str()),
                    ("laser_output_power", "Laser Output Power", MetricKind::Gauge, |l| l.laser_output_power.as_str()),
                    ("laser_output_power_dbm", "Laser Output Power Dbm", MetricKind::Gauge, |l| l.laser_output_power_dbm.as_str()),
                    ("laser_rx_optical_power", "Laser Rx Optical Power", MetricKind::Gauge, |l| l.laser_rx_optical_power.as_str()),
                    ("laser_rx_optical_power_dbm", "Laser Rx Optical Power Dbm", MetricKind::Gauge, |l| l.laser_rx_optical_power_dbm.as_str()),
                ],
            ),
            lane_flags: Flags::<Lane>::new(
                lane,
                &[
                    ("laser_bias_current_high_alarm", "Laser Bias Current High Alarm", |l| l.laser_bias_current_high_alarm.as_str()),
                    ("laser_bias_current_low_alarm", "Laser Bias Current Low Alarm", |l| l.laser_bias_current_low_alarm.as_str()),
                    ("laser_bias_current_high_warn", "Laser Bias Current High Warn", |l| l.laser_bias_current_high_warn.as_str()),
                    ("laser_bias_current_low_warn", "Laser Bias Current Low Warn", |l| l.laser_bias_current_low_warn.as_str()),
                    ("laser_rx_power_high_alarm", "Laser Rx Power High Alarm", |l| l.laser_rx_power_high_alarm.as_str()),
                    ("laser_rx_power_low_alarm", "Laser Rx Power Low Alarm", |l| l.laser_rx_power_low_alarm.as_str()),
                    ("laser_rx_power_high_warn", "Laser Rx Power High Warn", |l| l.laser_rx_power_high_warn.as_str()),
                    ("laser_rx_power_low_warn", "Laser Rx Power Low Warn", |l| l.laser_rx_power_low_warn.as_str()),
                    ("tx_loss_of_signal_functionality_alarm", "Tx Loss Of Signal Functionality Alarm", |l| l.tx_loss_of_signal_functionality_alarm.as_str()),
                    ("rx_loss_of_signal_alarm", "Rx Loss Of Signal Alarm", |l| l.rx_loss_of_signal_alarm.as_str()),
                    ("tx_laser_disabled_alarm", "Tx Laser Disabled Alarm", |l| l.tx_laser_disabled_alarm.as_str()),
                ],
            ),
            errors: ErrorTally::new(),
        }
    }

    fn process(&self, reply: &Reply, emitter: &mut Emitter) {
        for interface in &reply.information.interfaces {
            let name = interface.name.trim();
            let diagnostics = &interface.optics_diagnostics;

            self.module.emit(emitter, diagnostics, &[name]);
            self.module_flags.emit(emitter, diagnostics, &[name]);

            for lane in &diagnostics.lanes {
                let labels = [name, lane.lane_index.trim()];
                self.lane.emit(emitter, lane, &labels);
                self.lane_flags.emit(emitter, lane, &labels);
            }
        }
    }
}

impl Default for OpticsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for OpticsCollector {
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
