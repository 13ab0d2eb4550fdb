//! C2 — Enrichment: sort, format times, build display lines.
//!
//! A pure function of its input packet plus the wall clock already captured
//! in `received_at_ms`; no I/O, no shared state. §4.2.

use chrono::{Local, LocalResult, TimeZone};
use std::cmp::Ordering;
use telemetry_protocol::{EnrichedPacket, Metric, MetricPayload, Packet};

/// Run all three enrichment stages over a decoded packet.
pub fn enrich(packet: &Packet) -> EnrichedPacket {
    let mut metrics = packet.metrics.clone();
    sort_metrics(&mut metrics);

    let wall_time_str = format_wall_time(packet.received_at_ms);
    for metric in &mut metrics {
        metric.device_time_str = metric.device_time_us.map(format_device_time);
    }

    let display_lines = metrics
        .iter()
        .map(|m| display_line(&wall_time_str, m))
        .collect();

    EnrichedPacket {
        sender: packet.sender.clone(),
        received_at: packet.received_at_ms,
        prelude: packet.prelude.clone(),
        wall_time_str,
        metrics,
        display_lines,
    }
}

/// Stage 1: stable sort by `device_time_us`, absent times sorted last.
///
/// Shared with the wire-out ordering rule in §6, which states the identical
/// requirement for the JSON metrics array.
pub fn sort_metrics(metrics: &mut [Metric]) {
    metrics.sort_by(|a, b| compare_device_time(a.device_time_us, b.device_time_us));
}

pub fn compare_device_time(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn format_wall_time(received_at_ms: i64) -> String {
    let secs = received_at_ms.div_euclid(1000);
    let nanos = (received_at_ms.rem_euclid(1000) * 1_000_000) as u32;
    match Local.timestamp_opt(secs, nanos) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
            dt.format("%H:%M:%S%.3f").to_string()
        }
        LocalResult::None => "00:00:00.000".to_owned(),
    }
}

fn format_device_time(device_time_us: i64) -> String {
    let sign = if device_time_us < 0 { "-" } else { "" };
    let total_ms = device_time_us.unsigned_abs() / 1000;
    let millis = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let mins = total_secs / 60;
    format!("{sign}{mins:02}:{secs:02}.{millis:03}")
}

fn display_line(wall_time_str: &str, metric: &Metric) -> String {
    let dev = metric.device_time_str.as_deref().unwrap_or("--:--.---");
    let value = render_value(&metric.payload);
    format!("[{wall_time_str} | {dev}] {:<20} = {value}", metric.name)
}

fn render_value(payload: &MetricPayload) -> String {
    match payload {
        MetricPayload::Numeric { value } => value.to_string(),
        MetricPayload::Error { error } => format!("ERROR: {error}"),
        MetricPayload::Structured { fields } => fields
            .iter()
            .map(|(k, v)| format!("{k}={}", render_json_value(v)))
            .collect::<Vec<_>>()
            .join(", "),
        MetricPayload::Unknown { raw } => raw.clone(),
    }
}

fn render_json_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_protocol::{Prelude, Scalar};

    fn numeric(name: &str, device_time_us: Option<i64>) -> Metric {
        Metric {
            name: name.to_owned(),
            payload: MetricPayload::Numeric {
                value: Scalar::Int(1),
            },
            offset_ms: Some(0),
            device_time_us,
            device_time_str: None,
        }
    }

    #[test]
    fn sort_is_stable_and_puts_absent_times_last() {
        let mut metrics = vec![
            numeric("c", None),
            numeric("a", Some(300)),
            numeric("b", Some(100)),
            numeric("d", None),
        ];
        sort_metrics(&mut metrics);
        let names: Vec<_> = metrics.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn device_time_str_matches_scenario_one() {
        assert_eq!(format_device_time(10_000), "00:00.010");
        assert_eq!(format_device_time(1_003_000), "01:03.000");
    }

    #[test]
    fn enrich_fills_in_device_time_str_and_display_lines() {
        let packet = Packet {
            sender: "10.0.0.1:5000".to_owned(),
            received_at_ms: 0,
            prelude: Prelude {
                msg: Some(7),
                tm: Some(9000),
                v: Some(2),
            },
            metrics: vec![numeric("temp", Some(10_000))],
            raw: None,
            error: None,
        };
        let enriched = enrich(&packet);
        assert_eq!(enriched.metrics[0].device_time_str.as_deref(), Some("00:00.010"));
        assert_eq!(enriched.display_lines.len(), 1);
        assert!(enriched.display_lines[0].contains("temp"));
        assert!(enriched.display_lines[0].contains('1'));
    }

    #[test]
    fn enrichment_is_a_pure_function() {
        let packet = Packet {
            sender: "s".to_owned(),
            received_at_ms: 1_700_000_000_123,
            prelude: Prelude::default(),
            metrics: vec![numeric("a", Some(5)), numeric("b", None)],
            raw: None,
            error: None,
        };
        assert_eq!(enrich(&packet), enrich(&packet));
    }

    #[test]
    fn error_and_structured_render_distinctly() {
        let error_metric = Metric {
            name: "heater".to_owned(),
            payload: MetricPayload::Error {
                error: "thermal runaway".to_owned(),
            },
            offset_ms: Some(3),
            device_time_us: Some(1_003_000),
            device_time_str: None,
        };
        let mut fields = serde_json::Map::new();
        fields.insert("ip".to_owned(), serde_json::Value::from("192.168.0.1"));
        let structured_metric = Metric {
            name: "net".to_owned(),
            payload: MetricPayload::Structured { fields },
            offset_ms: Some(5),
            device_time_us: Some(5000),
            device_time_str: None,
        };
        let packet = Packet {
            sender: "s".to_owned(),
            received_at_ms: 0,
            prelude: Prelude::default(),
            metrics: vec![error_metric, structured_metric],
            raw: None,
            error: None,
        };
        let enriched = enrich(&packet);
        let rendered: Vec<_> = enriched.display_lines.iter().collect();
        assert!(rendered.iter().any(|l| l.contains("ERROR: thermal runaway")));
        assert!(rendered.iter().any(|l| l.contains("ip=192.168.0.1")));
    }
}
