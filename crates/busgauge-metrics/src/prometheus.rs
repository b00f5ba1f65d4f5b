//! Prometheus text exposition format.
//!
//! Renders evaluated gauges for scraping by a Prometheus server or
//! compatible agent.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::sink::GaugeSample;

/// Render samples into Prometheus text format.
///
/// Samples sharing a name are grouped under one HELP/TYPE header; the first
/// description seen for a name wins. Names appear in first-seen order.
pub fn render_prometheus(samples: &[GaugeSample]) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: BTreeMap<&str, Vec<&GaugeSample>> = BTreeMap::new();
    for s in samples {
        let group = groups.entry(s.name.as_str()).or_default();
        if group.is_empty() {
            order.push(s.name.as_str());
        }
        group.push(s);
    }

    let mut out = String::new();
    for name in order {
        let group = &groups[name];
        let _ = writeln!(out, "# HELP {name} {}", escape_help(&group[0].description));
        let _ = writeln!(out, "# TYPE {name} gauge");
        for s in group {
            let _ = writeln!(out, "{name}{} {}", render_labels(&s.labels), format_value(s.value));
        }
    }
    out
}

fn render_labels(labels: &BTreeMap<String, String>) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let body = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{body}}}")
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, labels: &[(&str, &str)], value: f64) -> GaugeSample {
        GaugeSample {
            name: name.to_string(),
            description: format!("{name} help"),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value,
        }
    }

    #[test]
    fn render_empty() {
        assert_eq!(render_prometheus(&[]), "");
    }

    #[test]
    fn groups_samples_under_one_header() {
        let output = render_prometheus(&[
            sample("sb_active_messages", &[("entity_name", "q1")], 10.0),
            sample("sb_size_bytes", &[("entity_name", "q1")], 2048.0),
            sample("sb_active_messages", &[("entity_name", "q2")], 3.0),
        ]);

        assert_eq!(output.matches("# TYPE sb_active_messages gauge").count(), 1);
        assert_eq!(
            output,
            "# HELP sb_active_messages sb_active_messages help\n\
             # TYPE sb_active_messages gauge\n\
             sb_active_messages{entity_name=\"q1\"} 10\n\
             sb_active_messages{entity_name=\"q2\"} 3\n\
             # HELP sb_size_bytes sb_size_bytes help\n\
             # TYPE sb_size_bytes gauge\n\
             sb_size_bytes{entity_name=\"q1\"} 2048\n"
        );
    }

    #[test]
    fn labels_are_sorted_and_escaped() {
        let output = render_prometheus(&[sample(
            "sb_active_messages",
            &[("namespace", "ns"), ("entity_name", "a\"b\\c\nd")],
            1.5,
        )]);
        assert!(output.contains(
            "sb_active_messages{entity_name=\"a\\\"b\\\\c\\nd\",namespace=\"ns\"} 1.5"
        ));
    }

    #[test]
    fn unlabelled_and_special_values() {
        let output = render_prometheus(&[
            sample("sb_up", &[], 1.0),
            sample("sb_ratio", &[], f64::NAN),
            sample("sb_limit", &[], f64::INFINITY),
        ]);
        assert!(output.contains("sb_up 1\n"));
        assert!(output.contains("sb_ratio NaN\n"));
        assert!(output.contains("sb_limit +Inf\n"));
    }
}
