//! Prometheus text exposition of scrape samples.

use std::collections::HashMap;
use std::fmt::{self, Write};

use junos_common::Sample;

/// Content type of [`render`] output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples in Prometheus text format 0.0.4.
///
/// Samples sharing a metric name are grouped under one `# HELP` and
/// `# TYPE` header, groups appearing in the order their first sample was
/// emitted. Kind and help are taken from the first sample of each group.
pub fn render(samples: &[Sample]) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut by_name: HashMap<&str, Vec<&Sample>> = HashMap::new();
    for sample in samples {
        let name = sample.name();
        by_name
            .entry(name)
            .or_insert_with(|| {
                order.push(name);
                Vec::new()
            })
            .push(sample);
    }

    let mut output = String::with_capacity(samples.len() * 80);
    for name in order {
        let series = &by_name[name];
        let first = series[0];

        writeln!(output, "# HELP {} {}", name, Escaped::help(&first.desc.help)).ok();
        writeln!(output, "# TYPE {} {}", name, first.kind.as_str()).ok();
        for sample in series {
            write_series(&mut output, sample).ok();
        }
    }
    output
}

/// Write one `name{label="value",...} value` line.
fn write_series(out: &mut String, sample: &Sample) -> fmt::Result {
    out.push_str(sample.name());

    let mut separator = '{';
    for (name, value) in sample.labels() {
        write!(out, "{separator}{name}=\"{}\"", Escaped::label(value))?;
        separator = ',';
    }
    if separator == ',' {
        out.push('}');
    }

    writeln!(out, " {}", Value(sample.value))
}

/// Text escaped for the exposition format, written without an intermediate copy.
///
/// Label values escape `\`, `"` and newlines; help text leaves quotes alone.
struct Escaped<'a> {
    text: &'a str,
    quote: bool,
}

impl<'a> Escaped<'a> {
    fn label(text: &'a str) -> Self {
        Self { text, quote: true }
    }

    fn help(text: &'a str) -> Self {
        Self { text, quote: false }
    }
}

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.text;
        while let Some(at) = rest.find(|c: char| c == '\\' || c == '\n' || (self.quote && c == '"')) {
            f.write_str(&rest[..at])?;
            f.write_str(match rest.as_bytes()[at] {
                b'\\' => "\\\\",
                b'\n' => "\\n",
                _ => "\\\"",
            })?;
            rest = &rest[at + 1..];
        }
        f.write_str(rest)
    }
}

/// A sample value: integral values without a fraction, special values spelled the Prometheus way.
struct Value(f64);

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            v if v.is_nan() => f.write_str("NaN"),
            v if v.is_infinite() => f.write_str(if v > 0.0 { "+Inf" } else { "-Inf" }),
            v if v.fract() == 0.0 => write!(f, "{v:.0}"),
            v => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use junos_common::{Desc, MetricKind};

    fn sample(desc: &std::sync::Arc<Desc>, kind: MetricKind, value: f64, labels: &[&str]) -> Sample {
        let labels = labels.iter().map(|l| l.to_string()).collect();
        Sample::new(desc, kind, value, labels).unwrap()
    }

    #[test]
    fn test_escaped_label() {
        assert_eq!(Escaped::label("simple").to_string(), "simple");
        assert_eq!(Escaped::label("with\"quote").to_string(), "with\\\"quote");
        assert_eq!(Escaped::label("with\\backslash").to_string(), "with\\\\backslash");
        assert_eq!(Escaped::label("with\nnewline").to_string(), "with\\nnewline");
        assert_eq!(Escaped::label("\"ü\"\n").to_string(), "\\\"ü\\\"\\n");
    }

    #[test]
    fn test_escaped_help_keeps_quotes() {
        assert_eq!(Escaped::help("a \"b\"\\c\nd").to_string(), "a \"b\"\\\\c\\nd");
    }

    #[test]
    fn test_value() {
        assert_eq!(Value(42.0).to_string(), "42");
        assert_eq!(Value(0.25).to_string(), "0.25");
        assert_eq!(Value(-3.0).to_string(), "-3");
        assert_eq!(Value(1_250_000_000.0).to_string(), "1250000000");
        assert_eq!(Value(f64::NAN).to_string(), "NaN");
        assert_eq!(Value(f64::INFINITY).to_string(), "+Inf");
        assert_eq!(Value(f64::NEG_INFINITY).to_string(), "-Inf");
    }

    #[test]
    fn test_render_groups_in_first_seen_order() {
        let up = Desc::new("interface", "up", "Whether the interface is up.", &["interface"]);
        let bytes = Desc::new("interface", "input_bytes", "Input Bytes.", &["interface"]);

        let samples = vec![
            sample(&up, MetricKind::Gauge, 1.0, &["ge-0/0/0"]),
            sample(&bytes, MetricKind::Counter, 1000.0, &["ge-0/0/0"]),
            sample(&up, MetricKind::Gauge, 0.0, &["ge-0/0/1"]),
        ];

        let output = render(&samples);
        let expected = "\
# HELP junos_interface_up Whether the interface is up.
# TYPE junos_interface_up gauge
junos_interface_up{interface=\"ge-0/0/0\"} 1
junos_interface_up{interface=\"ge-0/0/1\"} 0
# HELP junos_interface_input_bytes Input Bytes.
# TYPE junos_interface_input_bytes counter
junos_interface_input_bytes{interface=\"ge-0/0/0\"} 1000
";
        assert_eq!(output, expected);
    }

    #[test]
    fn test_render_without_labels() {
        let scrapes = Desc::bare("scrapes_total", "Number of scrapes.", &[]);
        let output = render(&[sample(&scrapes, MetricKind::Counter, 3.0, &[])]);

        assert!(output.contains("# TYPE junos_scrapes_total counter\n"));
        assert!(output.contains("\njunos_scrapes_total 3\n"));
    }

    #[test]
    fn test_render_escapes_labels() {
        let desc = Desc::new("interface", "description", "Interface description keys", &["interface", "site"]);
        let output = render(&[sample(&desc, MetricKind::Counter, 1.0, &["ge-0/0/0", "a \"b\"\nc"])]);

        assert!(output.contains(r#"junos_interface_description{interface="ge-0/0/0",site="a \"b\"\nc"} 1"#));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&[]), "");
    }
}
