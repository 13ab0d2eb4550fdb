//! Wire and in-memory data model for the printer telemetry pipeline.
//!
//! This crate is pure data: no sockets, no files, no async. It defines the
//! `Packet`/`Metric`/`EnrichedPacket` types from the telemetry spec's data
//! model (§3) and their JSON encoding (§6), which both the WebSocket fan-out
//! and the on-disk archive format reuse unchanged.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Scalar
// ---------------------------------------------------------------------------

/// A dynamically-typed metric value: integer, float, or string.
///
/// Explicit tagged variants rather than a universal "any" type — the wire
/// grammar distinguishes these three shapes (`25i`, `3.14`, `"foo"`) and we
/// keep that distinction all the way through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Str(String),
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v:.3}"),
            Scalar::Str(v) => write!(f, "{v}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// The packet's leading header line: `msg=<u64>,tm=<u64>,v=<u32>`.
///
/// Any field may be absent — a packet with no prelude line at all, or one
/// missing a field, is still a valid packet; its metrics simply lack
/// `device_time_us`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prelude {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub msg: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tm: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub v: Option<u32>,
}

impl Prelude {
    pub fn is_empty(&self) -> bool {
        self.msg.is_none() && self.tm.is_none() && self.v.is_none()
    }
}

// ---------------------------------------------------------------------------
// Metric
// ---------------------------------------------------------------------------

/// Kind-specific metric payload. Serializes flattened into the owning
/// `Metric`, tagged by `kind`, matching the wire-out JSON shape (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricPayload {
    Numeric {
        value: Scalar,
    },
    Error {
        error: String,
    },
    Structured {
        /// Ordered mapping, key insertion order preserved (`preserve_order`).
        fields: serde_json::Map<String, serde_json::Value>,
    },
    Unknown {
        raw: String,
    },
}

/// One parsed line within a packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(flatten)]
    pub payload: MetricPayload,
    /// Signed millisecond offset from the packet's `base_time_us`. May be
    /// negative when the metric was captured before the packet was
    /// assembled.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub offset_ms: Option<i64>,
    /// `base_time_us + offset_ms * 1000`, when both are defined.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub device_time_us: Option<i64>,
    /// `MM:SS.mmm` formatted from `device_time_us`, filled in by enrichment.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub device_time_str: Option<String>,
}

impl Metric {
    pub fn kind_str(&self) -> &'static str {
        match self.payload {
            MetricPayload::Numeric { .. } => "numeric",
            MetricPayload::Error { .. } => "error",
            MetricPayload::Structured { .. } => "structured",
            MetricPayload::Unknown { .. } => "unknown",
        }
    }
}

// ---------------------------------------------------------------------------
// PacketId
// ---------------------------------------------------------------------------

/// Stable provenance key for a packet, derived at decode time and carried
/// alongside metrics that outlive their packet (e.g. through the reorder
/// window) without needing to duplicate the whole packet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketId {
    pub msg_id: Option<u64>,
    pub sender: String,
    pub received_at_ms: i64,
}

// ---------------------------------------------------------------------------
// Packet (pre-enrichment)
// ---------------------------------------------------------------------------

/// A decoded packet, as produced by C1, before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub sender: String,
    pub received_at_ms: i64,
    pub prelude: Prelude,
    pub metrics: Vec<Metric>,
    /// Original text, retained for diagnostics; may be dropped after
    /// enrichment.
    pub raw: Option<String>,
    /// Mutually exclusive with a non-empty `metrics`.
    pub error: Option<String>,
}

impl Packet {
    pub fn id(&self) -> PacketId {
        PacketId {
            msg_id: self.prelude.msg,
            sender: self.sender.clone(),
            received_at_ms: self.received_at_ms,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// ---------------------------------------------------------------------------
// EnrichedPacket (post C2, wire-out shape)
// ---------------------------------------------------------------------------

/// The fully enriched packet: sorted metrics, formatted times, and display
/// lines. This is exactly the JSON document sent over WebSocket and written
/// (one per line) to archive files (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPacket {
    pub sender: String,
    pub received_at: i64,
    #[serde(default)]
    pub prelude: Prelude,
    pub wall_time_str: String,
    pub metrics: Vec<Metric>,
    pub display_lines: Vec<String>,
}

impl EnrichedPacket {
    pub fn id(&self) -> PacketId {
        PacketId {
            msg_id: self.prelude.msg,
            sender: self.sender.clone(),
            received_at_ms: self.received_at,
        }
    }

    /// Encode as a single-line JSON record suitable for an archive file or a
    /// WebSocket text frame.
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a single archive-file line. Callers are expected to skip a
    /// line that fails to parse (a truncated trailing record, most commonly).
    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}
