//! Per-print archival: the C5 "active print" state machine, filename
//! sanitization, and the C6 read side. §4.5, §4.6.

pub mod reader;
pub mod writer;

use std::path::{Path, PathBuf};
use telemetry_protocol::{Metric, MetricPayload};

pub use reader::ArchiveReader;
pub use writer::ArchiveWriter;

/// Default idle timeout after which a sender's sticky filename expires.
/// Configurable per instance; see §3.
pub const PRINT_END_TIMEOUT_MS: i64 = 10 * 60 * 1000;

/// Errors crossing the filesystem/encoding boundary for the writer and
/// reader sides of the archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("invalid path component: {0:?}")]
    InvalidPathComponent(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode archive record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A `date` or `filename` path segment is safe to join onto `root` only if
/// it has no path separators and no `..` component. Both `date` and
/// `filename` arrive here straight from HTTP path segments, so this must be
/// checked before they ever reach a filesystem join.
pub fn is_safe_path_component(component: &str) -> bool {
    !component.is_empty()
        && component != "."
        && component != ".."
        && !component.contains('/')
        && !component.contains('\\')
}

/// Per-sender state tracked by the archive writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePrint {
    pub filename: String,
    pub last_seen_ms: i64,
}

/// Result of applying one packet to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next_state: Option<ActivePrint>,
    pub persist_as: Option<String>,
}

/// Pure state-machine transition for one sender, given the filename (if
/// any) observed on the incoming packet. Kept separate from any I/O so the
/// sticky/timeout rules in §4.5 are testable without a filesystem.
pub fn decide(
    state: Option<ActivePrint>,
    observed_filename: Option<&str>,
    now_ms: i64,
    timeout_ms: i64,
) -> Transition {
    match (state, observed_filename) {
        (None, Some(filename)) => {
            let active = ActivePrint {
                filename: filename.to_owned(),
                last_seen_ms: now_ms,
            };
            Transition {
                persist_as: Some(active.filename.clone()),
                next_state: Some(active),
            }
        }
        (None, None) => Transition {
            next_state: None,
            persist_as: None,
        },
        (Some(active), Some(filename)) if filename != active.filename => {
            let active = ActivePrint {
                filename: filename.to_owned(),
                last_seen_ms: now_ms,
            };
            Transition {
                persist_as: Some(active.filename.clone()),
                next_state: Some(active),
            }
        }
        (Some(active), Some(_)) => {
            let persist_as = active.filename.clone();
            Transition {
                next_state: Some(ActivePrint {
                    filename: active.filename,
                    last_seen_ms: now_ms,
                }),
                persist_as: Some(persist_as),
            }
        }
        (Some(active), None) => {
            if now_ms - active.last_seen_ms <= timeout_ms {
                let persist_as = active.filename.clone();
                Transition {
                    next_state: Some(ActivePrint {
                        filename: active.filename,
                        last_seen_ms: now_ms,
                    }),
                    persist_as: Some(persist_as),
                }
            } else {
                Transition {
                    next_state: None,
                    persist_as: None,
                }
            }
        }
    }
}

/// Scan a packet's metrics for a `print_filename`, returning a cleaned,
/// non-empty value if one was found.
///
/// The spec allows "the value of any recognizable field" for a Structured
/// payload; we look for a `filename` or `print_filename` key first and fall
/// back to the first field present, since the source does not name a
/// canonical key for this case.
pub fn extract_filename(metrics: &[Metric]) -> Option<String> {
    for metric in metrics {
        if metric.name != "print_filename" {
            continue;
        }
        let raw = match &metric.payload {
            MetricPayload::Numeric { value } => value.to_string(),
            MetricPayload::Structured { fields } => fields
                .get("filename")
                .or_else(|| fields.get("print_filename"))
                .or_else(|| fields.values().next())
                .map(json_value_as_string)
                .unwrap_or_default(),
            MetricPayload::Error { .. } | MetricPayload::Unknown { .. } => continue,
        };
        let cleaned = clean_filename_value(&raw);
        if !cleaned.is_empty() {
            return Some(cleaned);
        }
    }
    None
}

fn json_value_as_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn clean_filename_value(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_owned()
}

/// Replace any character outside `[A-Za-z0-9 _.-]` with `_`, collapse
/// whitespace runs to a single `_`, and trim. §4.5.
pub fn sanitize_filename(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || " _.-".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut out = String::with_capacity(replaced.len());
    let mut in_ws_run = false;
    for c in replaced.chars() {
        if c.is_whitespace() {
            if !in_ws_run {
                out.push('_');
                in_ws_run = true;
            }
        } else {
            in_ws_run = false;
            out.push(c);
        }
    }
    out.trim_matches(|c: char| c == '_' || c.is_whitespace())
        .to_owned()
}

/// `<root>/<YYYY-MM-DD>` for the local date of `received_at_ms`.
pub fn archive_dir(root: &Path, received_at_ms: i64) -> PathBuf {
    root.join(local_date(received_at_ms))
}

/// `<root>/<YYYY-MM-DD>/<sanitized_filename>.records`.
pub fn archive_path(root: &Path, received_at_ms: i64, sanitized_filename: &str) -> PathBuf {
    archive_dir(root, received_at_ms).join(format!("{sanitized_filename}.records"))
}

fn local_date(received_at_ms: i64) -> String {
    use chrono::{Local, LocalResult, TimeZone};
    let secs = received_at_ms.div_euclid(1000);
    match Local.timestamp_opt(secs, 0) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.format("%Y-%m-%d").to_string(),
        LocalResult::None => "1970-01-01".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_with_filename_creates_active_print() {
        let t = decide(None, Some("job.gcode"), 1000, PRINT_END_TIMEOUT_MS);
        assert_eq!(t.persist_as.as_deref(), Some("job.gcode"));
        assert_eq!(
            t.next_state,
            Some(ActivePrint {
                filename: "job.gcode".to_owned(),
                last_seen_ms: 1000
            })
        );
    }

    #[test]
    fn idle_without_filename_drops_the_packet() {
        let t = decide(None, None, 1000, PRINT_END_TIMEOUT_MS);
        assert_eq!(t.persist_as, None);
        assert_eq!(t.next_state, None);
    }

    #[test]
    fn sticky_filename_persists_across_packets_without_one() {
        let active = ActivePrint {
            filename: "job.gcode".to_owned(),
            last_seen_ms: 0,
        };
        let t = decide(Some(active), None, 30_000, PRINT_END_TIMEOUT_MS);
        assert_eq!(t.persist_as.as_deref(), Some("job.gcode"));
        assert_eq!(t.next_state.unwrap().last_seen_ms, 30_000);
    }

    #[test]
    fn timeout_drops_active_print_and_the_packet() {
        let active = ActivePrint {
            filename: "job.gcode".to_owned(),
            last_seen_ms: 0,
        };
        let eleven_minutes = 11 * 60 * 1000;
        let t = decide(Some(active), None, eleven_minutes, PRINT_END_TIMEOUT_MS);
        assert_eq!(t.persist_as, None);
        assert_eq!(t.next_state, None);
    }

    #[test]
    fn new_filename_supersedes_without_a_footer() {
        let active = ActivePrint {
            filename: "job.gcode".to_owned(),
            last_seen_ms: 0,
        };
        let t = decide(Some(active), Some("job2.gcode"), 1, PRINT_END_TIMEOUT_MS);
        assert_eq!(t.persist_as.as_deref(), Some("job2.gcode"));
        assert_eq!(t.next_state.unwrap().filename, "job2.gcode");
    }

    #[test]
    fn filename_scenario_end_to_end() {
        // Scenario 6: timeout then a fresh filename re-establishes state.
        let active = ActivePrint {
            filename: "job.gcode".to_owned(),
            last_seen_ms: 0,
        };
        let after_timeout = decide(Some(active), None, 11 * 60 * 1000, PRINT_END_TIMEOUT_MS);
        assert_eq!(after_timeout.next_state, None);

        let fresh = decide(
            after_timeout.next_state,
            Some("job2.gcode"),
            11 * 60 * 1000 + 1,
            PRINT_END_TIMEOUT_MS,
        );
        assert_eq!(fresh.persist_as.as_deref(), Some("job2.gcode"));
    }

    #[test]
    fn sanitize_strips_disallowed_characters_and_collapses_whitespace() {
        assert_eq!(sanitize_filename("job.gcode"), "job.gcode");
        assert_eq!(sanitize_filename("my  weird/job*.gcode"), "my_weird_job_.gcode");
        assert_eq!(sanitize_filename("  padded  "), "padded");
    }

    #[test]
    fn extract_filename_strips_quotes_and_whitespace() {
        let m = Metric {
            name: "print_filename".to_owned(),
            payload: MetricPayload::Numeric {
                value: telemetry_protocol::Scalar::Str(" \"job.gcode\" ".to_owned()),
            },
            offset_ms: None,
            device_time_us: None,
            device_time_str: None,
        };
        assert_eq!(extract_filename(&[m]).as_deref(), Some("job.gcode"));
    }

    #[test]
    fn path_component_safety() {
        assert!(is_safe_path_component("2026-01-02"));
        assert!(is_safe_path_component("job.gcode"));
        assert!(!is_safe_path_component(".."));
        assert!(!is_safe_path_component("../etc"));
        assert!(!is_safe_path_component("a/b"));
        assert!(!is_safe_path_component("a\\b"));
        assert!(!is_safe_path_component(""));
        assert!(!is_safe_path_component("."));
    }

    #[test]
    fn extract_filename_is_absent_when_not_present() {
        let m = Metric {
            name: "temp".to_owned(),
            payload: MetricPayload::Numeric {
                value: telemetry_protocol::Scalar::Int(1),
            },
            offset_ms: None,
            device_time_us: None,
            device_time_str: None,
        };
        assert_eq!(extract_filename(&[m]), None);
    }
}
