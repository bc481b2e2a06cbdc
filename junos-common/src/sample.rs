use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Namespace prepended to every exported metric name.
pub const NAMESPACE: &str = "junos";

/// Kind of a metric sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonically increasing device counter.
    Counter,
    /// Point-in-time value.
    Gauge,
}

impl MetricKind {
    /// Prometheus type keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric descriptor: fully-qualified name, help text and fixed label schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Desc {
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
}

impl Desc {
    /// Descriptor named `junos_<subsystem>_<name>`.
    pub fn new(subsystem: &str, name: &str, help: &str, labels: &[&str]) -> Arc<Self> {
        Self::with_name(format!("{NAMESPACE}_{subsystem}_{name}"), help, labels)
    }

    /// Descriptor named `junos_<name>`, used for exporter bookkeeping.
    pub fn bare(name: &str, help: &str, labels: &[&str]) -> Arc<Self> {
        Self::with_name(format!("{NAMESPACE}_{name}"), help, labels)
    }

    fn with_name(name: String, help: &str, labels: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name,
            help: help.to_string(),
            label_names: labels.iter().map(|l| l.to_string()).collect(),
        })
    }

    /// Descriptor with extra label names appended to a fixed prefix.
    pub fn with_extra_labels(
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
        extra: &[String],
    ) -> Arc<Self> {
        let mut label_names: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        label_names.extend(extra.iter().cloned());
        Arc::new(Self {
            name: format!("{NAMESPACE}_{subsystem}_{name}"),
            help: help.to_string(),
            label_names,
        })
    }

    /// Number of label values every sample of this metric carries.
    pub fn arity(&self) -> usize {
        self.label_names.len()
    }
}

/// One emitted time-series value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub desc: Arc<Desc>,
    pub kind: MetricKind,
    pub value: f64,
    pub label_values: Vec<String>,
}

impl Sample {
    /// Create a sample, rejecting label values that do not match the descriptor's schema.
    pub fn new(
        desc: &Arc<Desc>,
        kind: MetricKind,
        value: f64,
        label_values: Vec<String>,
    ) -> Result<Self> {
        if label_values.len() != desc.arity() {
            return Err(Error::LabelArity {
                name: desc.name.clone(),
                expected: desc.arity(),
                actual: label_values.len(),
            });
        }

        Ok(Self {
            desc: Arc::clone(desc),
            kind,
            value,
            label_values,
        })
    }

    /// Fully-qualified metric name.
    pub fn name(&self) -> &str {
        &self.desc.name
    }

    /// Value of the named label, if the schema has it.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .label_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.label_values[i].as_str())
    }

    /// Label name/value pairs in schema order.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.desc
            .label_names
            .iter()
            .map(String::as_str)
            .zip(self.label_values.iter().map(String::as_str))
    }
}
