//! Chassis environment: module status, temperatures and thresholds.

use std::sync::Arc;

use async_trait::async_trait;
use junos_common::{Desc, MetricKind};
use serde::Deserialize;

use super::{Celsius, CollectError, Collector, ErrorTally, FieldSet, decode, execute};
use crate::config::TargetConfig;
use crate::mapper::Emitter;
use crate::netconf::Session;

pub const NAME: &str = "environment";

const ENVIRONMENT_RPC: &str = "<get-environment-information/>";
const THRESHOLD_RPC: &str = "<get-temperature-threshold-information/>";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnvironmentReply {
    #[serde(rename = "environment-information")]
    information: EnvironmentInformation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnvironmentInformation {
    #[serde(rename = "environment-item")]
    items: Vec<EnvironmentItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnvironmentItem {
    name: String,
    status: String,
    temperature: Celsius,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThresholdReply {
    #[serde(rename = "temperature-threshold-information")]
    information: ThresholdInformation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThresholdInformation {
    #[serde(rename = "temperature-threshold")]
    thresholds: Vec<Threshold>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Threshold {
    name: String,
    fan_normal_speed: String,
    fan_high_speed: String,
    bad_fan_yellow_alarm: String,
    bad_fan_red_alarm: String,
    yellow_alarm: String,
    red_alarm: String,
    fire_shutdown: String,
}

pub struct EnvironmentCollector {
    state: Arc<Desc>,
    temperature: Arc<Desc>,
    thresholds: FieldSet<Threshold>,
    errors: ErrorTally,
}

impl EnvironmentCollector {
    #[rustfmt::skip]
    pub fn new() -> Self {
        let labels = &["module"];
        Self {
            state: Desc::new(
                NAME,
                "module_state",
                "Module Environmental State (1 = OK, 0 = Not OK).",
                labels,
            ),
            temperature: Desc::new(
                NAME,
                "module_temperature_celsius",
                "Module Temperature in Celsius",
                labels,
            ),
            thresholds: FieldSet::<Threshold>::new(
                NAME,
                labels,
                &[
                    ("module_fan_normal_speed_temperature_celsius", "Fan Normal Speed Temperature Threshold", MetricKind::Gauge, |t| t.fan_normal_speed.as_str()),
                    ("module_fan_high_speed_temperature_celsius", "Fan High Speed Temperature Threshold", MetricKind::Gauge, |t| t.fan_high_speed.as_str()),
                    ("module_bad_fan_yellow_alarm_temperature_celsius", "Bad Fan Yellow Alarm Temperature Threshold", MetricKind::Gauge, |t| t.bad_fan_yellow_alarm.as_str()),
                    ("module_bad_fan_red_alarm_temperature_celsius", "Bad Fan Red Alarm Temperature Threshold", MetricKind::Gauge, |t| t.bad_fan_red_alarm.as_str()),
                    ("module_yellow_alarm_temperature_celsius", "Yellow Alarm Temperature Threshold", MetricKind::Gauge, |t| t.yellow_alarm.as_str()),
                    ("module_red_alarm_temperature_celsius", "Red Alarm Temperature Threshold", MetricKind::Gauge, |t| t.red_alarm.as_str()),
                    ("module_fire_shutdown_temperature_celsius", "Fire Shutdown Temperature Threshold", MetricKind::Gauge, |t| t.fire_shutdown.as_str()),
                ],
            ),
            errors: ErrorTally::new(),
        }
    }

    fn process_environment(&self, reply: &EnvironmentReply, emitter: &mut Emitter) {
        for item in &reply.information.items {
            let labels = [item.name.trim()];
            emitter.state(&self.state, &item.status, "OK", &labels);
            emitter.gauge(&self.temperature, &item.temperature.celsius, &labels);
        }
    }

    fn process_thresholds(&self, reply: &ThresholdReply, emitter: &mut Emitter) {
        for threshold in &reply.information.thresholds {
            self.thresholds
                .emit(emitter, threshold, &[threshold.name.trim()]);
        }
    }
}

impl Default for EnvironmentCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for EnvironmentCollector {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn collect(
        &self,
        session: &dyn Session,
        _target: &TargetConfig,
        emitter: &mut Emitter,
    ) -> Result<(), CollectError> {
        let environment = execute(session, ENVIRONMENT_RPC).await?;
        let thresholds = execute(session, THRESHOLD_RPC).await?;

        let environment: EnvironmentReply = decode(&environment)?;
        self.process_environment(&environment, emitter);

        let thresholds: ThresholdReply = decode(&thresholds)?;
        self.process_thresholds(&thresholds, emitter);
        Ok(())
    }

    fn errors(&self) -> &ErrorTally {
        &self.errors
    }
}
