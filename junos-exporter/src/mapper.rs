//! Conversion from decoded reply fields to metric samples.
//!
//! Device replies carry every value as text. The [`Emitter`] turns that text
//! into samples: empty text yields no sample, text that fails to parse is
//! logged and skipped, and the rest of the reply keeps being processed.

use std::collections::HashMap;
use std::sync::Arc;

use junos_common::{Desc, MetricKind, Sample};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static LEADING_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

/// Scale applied to MB-suffixed size fields.
pub const MB: f64 = 1_000_000.0;

/// Outcome of converting one text field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parsed {
    /// Field was empty; nothing to emit.
    Empty,
    Value(f64),
    /// Field had text that is not a number.
    Invalid,
}

/// Parse a numeric text field, trimming surrounding whitespace.
pub fn parse_value(raw: &str) -> Parsed {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Parsed::Empty;
    }
    match trimmed.parse::<f64>() {
        Ok(v) => Parsed::Value(v),
        Err(_) => Parsed::Invalid,
    }
}

/// Collects the samples produced by one collector run.
#[derive(Debug, Default)]
pub struct Emitter {
    samples: Vec<Sample>,
    conversion_failures: usize,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a counter from a numeric text field.
    pub fn counter<L: AsRef<str>>(&mut self, desc: &Arc<Desc>, raw: &str, labels: &[L]) {
        self.parsed(desc, MetricKind::Counter, raw, 1.0, labels);
    }

    /// Emit a gauge from a numeric text field.
    pub fn gauge<L: AsRef<str>>(&mut self, desc: &Arc<Desc>, raw: &str, labels: &[L]) {
        self.parsed(desc, MetricKind::Gauge, raw, 1.0, labels);
    }

    /// Emit a gauge from a size field such as "2048 MB": the leading digit run
    /// is taken and scaled by [`MB`].
    pub fn gauge_mb<L: AsRef<str>>(&mut self, desc: &Arc<Desc>, raw: &str, labels: &[L]) {
        if raw.trim().is_empty() {
            return;
        }
        match LEADING_DIGITS.find(raw) {
            Some(m) => self.parsed(desc, MetricKind::Gauge, m.as_str(), MB, labels),
            None => self.conversion_failed(desc, raw),
        }
    }

    /// Emit a gauge from a numeric text field multiplied by `scale`.
    pub fn gauge_scaled<L: AsRef<str>>(&mut self, desc: &Arc<Desc>, raw: &str, scale: f64, labels: &[L]) {
        self.parsed(desc, MetricKind::Gauge, raw, scale, labels);
    }

    /// Emit a gauge of 1 when `raw` equals `healthy` ignoring case, else 0.
    pub fn state<L: AsRef<str>>(&mut self, desc: &Arc<Desc>, raw: &str, healthy: &str, labels: &[L]) {
        let up = raw.trim().eq_ignore_ascii_case(healthy);
        self.gauge_value(desc, if up { 1.0 } else { 0.0 }, labels);
    }

    /// Emit a gauge of 1 or 0.
    pub fn flag<L: AsRef<str>>(&mut self, desc: &Arc<Desc>, set: bool, labels: &[L]) {
        self.gauge_value(desc, if set { 1.0 } else { 0.0 }, labels);
    }

    /// Emit an already-computed gauge value.
    pub fn gauge_value<L: AsRef<str>>(&mut self, desc: &Arc<Desc>, value: f64, labels: &[L]) {
        self.push(desc, MetricKind::Gauge, value, labels);
    }

    /// Emit an already-computed counter value.
    pub fn counter_value<L: AsRef<str>>(&mut self, desc: &Arc<Desc>, value: f64, labels: &[L]) {
        self.push(desc, MetricKind::Counter, value, labels);
    }

    fn parsed<L: AsRef<str>>(
        &mut self,
        desc: &Arc<Desc>,
        kind: MetricKind,
        raw: &str,
        scale: f64,
        labels: &[L],
    ) {
        match parse_value(raw) {
            Parsed::Empty => {}
            Parsed::Value(v) => self.push(desc, kind, v * scale, labels),
            Parsed::Invalid => self.conversion_failed(desc, raw),
        }
    }

    fn conversion_failed(&mut self, desc: &Desc, raw: &str) {
        self.conversion_failures += 1;
        warn!(metric = %desc.name, value = %raw.trim(), "could not convert metric to float64");
    }

    fn push<L: AsRef<str>>(&mut self, desc: &Arc<Desc>, kind: MetricKind, value: f64, labels: &[L]) {
        // fresh label vector per sample
        let values = labels.iter().map(|l| l.as_ref().to_string()).collect();
        match Sample::new(desc, kind, value, values) {
            Ok(sample) => self.samples.push(sample),
            Err(e) => warn!(error = %e, "dropping sample"),
        }
    }

    /// Samples emitted so far.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of fields skipped because their text was not numeric.
    pub fn conversion_failures(&self) -> usize {
        self.conversion_failures
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}

/// Parse the JSON object some operators embed in interface and peer descriptions.
///
/// Junos OS Evolved escapes the quotes a second time, so `\"` is folded back
/// to `"` before parsing. Anything that is not a JSON object yields an empty map.
pub fn description_keys(description: &str) -> HashMap<String, String> {
    let text = description.trim().replace("\\\"", "\"");
    match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&text) {
        Ok(map) => map
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect(),
        Err(_) => HashMap::new(),
    }
}

/// Sanitize a user-supplied name to be usable as a metric or label name.
///
/// Prometheus names must match `[a-zA-Z_][a-zA-Z0-9_]*`. Invalid characters
/// become underscores, consecutive underscores collapse, and a leading digit
/// gets an underscore prefix.
pub fn sanitize_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 1);
    let mut last_was_underscore = false;

    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        result.push('_');
        last_was_underscore = true;
    }

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c);
            last_was_underscore = false;
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    while result.ends_with('_') && result.len() > 1 {
        result.pop();
    }

    if result.is_empty() || result == "_" {
        return "unnamed".to_string();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(labels: &[&str]) -> Arc<Desc> {
        Desc::new("test", "value", "Test value.", labels)
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value(""), Parsed::Empty);
        assert_eq!(parse_value("   \n"), Parsed::Empty);
        assert_eq!(parse_value(" 42 \n"), Parsed::Value(42.0));
        assert_eq!(parse_value("-3.5"), Parsed::Value(-3.5));
        assert_eq!(parse_value("n/a"), Parsed::Invalid);
    }

    #[test]
    fn test_empty_field_emits_nothing() {
        let mut emitter = Emitter::new();
        emitter.counter(&desc(&["a"]), "", &["x"]);
        emitter.gauge(&desc(&["a"]), "  ", &["x"]);
        emitter.gauge_mb(&desc(&["a"]), "", &["x"]);

        assert!(emitter.is_empty());
        assert_eq!(emitter.conversion_failures(), 0);
    }

    #[test]
    fn test_invalid_field_is_skipped_and_processing_continues() {
        let d = desc(&["a"]);
        let mut emitter = Emitter::new();
        emitter.gauge(&d, "Absent", &["x"]);
        emitter.gauge(&d, "7", &["y"]);

        assert_eq!(emitter.len(), 1);
        assert_eq!(emitter.conversion_failures(), 1);
        assert_eq!(emitter.samples()[0].value, 7.0);
        assert_eq!(emitter.samples()[0].label("a"), Some("y"));
    }

    #[test]
    fn test_counter_and_gauge_kinds() {
        let d = desc(&[]);
        let mut emitter = Emitter::new();
        emitter.counter(&d, "10", &[] as &[&str]);
        emitter.gauge(&d, "11", &[] as &[&str]);

        assert_eq!(emitter.samples()[0].kind, MetricKind::Counter);
        assert_eq!(emitter.samples()[1].kind, MetricKind::Gauge);
    }

    #[test]
    fn test_gauge_mb() {
        let d = desc(&[]);
        let mut emitter = Emitter::new();
        emitter.gauge_mb(&d, "2048 MB", &[] as &[&str]);
        emitter.gauge_mb(&d, "4 K", &[] as &[&str]);
        emitter.gauge_mb(&d, "none", &[] as &[&str]);

        assert_eq!(emitter.len(), 2);
        assert_eq!(emitter.samples()[0].value, 2_048_000_000.0);
        assert_eq!(emitter.samples()[1].value, 4_000_000.0);
        assert_eq!(emitter.conversion_failures(), 1);
    }

    #[test]
    fn test_state_boundary() {
        let d = desc(&[]);
        let mut emitter = Emitter::new();
        for raw in ["Online", "online", " ONLINE\n", "Online ", "Onlin", "Offline", ""] {
            emitter.state(&d, raw, "Online", &[] as &[&str]);
        }

        let values: Vec<f64> = emitter.samples().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_label_arity_mismatch_is_dropped() {
        let d = desc(&["a", "b"]);
        let mut emitter = Emitter::new();
        emitter.gauge(&d, "1", &["only-one"]);
        emitter.gauge(&d, "1", &["one", "two"]);

        assert_eq!(emitter.len(), 1);
        assert!(emitter.samples().iter().all(|s| s.label_values.len() == 2));
    }

    #[test]
    fn test_labels_are_not_shared() {
        let d = desc(&["iface", "class"]);
        let base = vec!["ge-0/0/0".to_string()];
        let mut emitter = Emitter::new();

        for class in ["best-effort", "voice"] {
            let mut labels = base.clone();
            labels.push(class.to_string());
            emitter.counter(&d, "1", &labels);
        }

        assert_eq!(emitter.samples()[0].label("class"), Some("best-effort"));
        assert_eq!(emitter.samples()[1].label("class"), Some("voice"));
    }

    #[test]
    fn test_description_keys() {
        let keys = description_keys(r#"{"site": "par1", "cost": 10}"#);
        assert_eq!(keys.get("site").map(String::as_str), Some("par1"));
        assert_eq!(keys.get("cost").map(String::as_str), Some("10"));

        // Junos OS Evolved escaping
        let keys = description_keys(r#"{\"r_name\":\"far-end\"}"#);
        assert_eq!(keys.get("r_name").map(String::as_str), Some("far-end"));

        assert!(description_keys("uplink to core").is_empty());
        assert!(description_keys("").is_empty());
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Cost"), "Cost");
        assert_eq!(sanitize_name("far-end"), "far_end");
        assert_eq!(sanitize_name("a..b"), "a_b");
        assert_eq!(sanitize_name("9lives"), "_9lives");
        assert_eq!(sanitize_name("--"), "unnamed");
    }
}
