//! Prometheus text exposition format.
//!
//! Serializes a registry snapshot into the classic text format, one metric
//! family per block. Rendering follows the reference client conventions:
//! Counter samples get a `_total` suffix, Info renders as a synthetic
//! `_info` gauge with the key/value pairs label-encoded, Enum renders one
//! line per declared state with the metric name as the state label key and
//! value 1 for the active state.

use std::fmt::Write;

use super::{FamilySnapshot, MetricKind, Registry, SnapshotValue};

/// Content type identifying the text format version, returned with every
/// scrape response.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Encodes the registry's current snapshot.
pub fn encode(registry: &Registry) -> String {
    let mut out = String::new();
    for family in registry.snapshot() {
        encode_family(&mut out, &family);
    }
    out
}

fn encode_family(out: &mut String, family: &FamilySnapshot) {
    let exposed_name = match family.kind {
        MetricKind::Counter => format!("{}_total", family.name),
        MetricKind::Info => format!("{}_info", family.name),
        MetricKind::Gauge | MetricKind::Enum => family.name.clone(),
    };
    let type_name = match family.kind {
        MetricKind::Counter => "counter",
        // Info and Enum have no dedicated type in the classic format.
        MetricKind::Gauge | MetricKind::Info | MetricKind::Enum => "gauge",
    };
    let _ = writeln!(out, "# HELP {} {}", exposed_name, escape_help(&family.help));
    let _ = writeln!(out, "# TYPE {} {}", exposed_name, type_name);

    for sample in &family.samples {
        let base: Vec<(&str, &str)> = family
            .label_names
            .iter()
            .map(String::as_str)
            .zip(sample.label_values.iter().map(String::as_str))
            .collect();
        match &sample.value {
            SnapshotValue::Number(value) => {
                write_sample(out, &exposed_name, &base, &[], *value);
            }
            SnapshotValue::Pairs(pairs) => {
                let extra: Vec<(&str, &str)> = pairs
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                write_sample(out, &exposed_name, &base, &extra, 1.0);
            }
            SnapshotValue::StateIndex(active) => {
                for (index, state) in family.states.iter().enumerate() {
                    let extra = [(family.name.as_str(), state.as_str())];
                    let value = if index == *active { 1.0 } else { 0.0 };
                    write_sample(out, &exposed_name, &base, &extra, value);
                }
            }
        }
    }
}

fn write_sample(
    out: &mut String,
    name: &str,
    labels: &[(&str, &str)],
    extra: &[(&str, &str)],
    value: f64,
) {
    out.push_str(name);
    if !labels.is_empty() || !extra.is_empty() {
        out.push('{');
        for (i, (key, val)) in labels.iter().chain(extra.iter()).enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{}=\"{}\"", key, escape_label_value(val));
        }
        out.push('}');
    }
    let _ = writeln!(out, " {}", format_value(value));
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{}", value)
    }
}

fn escape_help(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
