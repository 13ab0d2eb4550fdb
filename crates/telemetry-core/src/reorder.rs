//! C3 — Reorder window: serialize metrics across adjacent packets into
//! non-decreasing device-time order, tolerating per-packet negative offsets.
//! §4.3.

use crate::enrich::compare_device_time;
use std::collections::VecDeque;
use telemetry_protocol::{Metric, Packet, PacketId};

/// Default window size: two packets of reordering tolerance.
pub const DEFAULT_WINDOW: usize = 2;

/// A metric emitted by the window, carrying enough provenance (`PacketId`)
/// to be interpreted without the rest of its packet.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedMetric {
    pub packet_id: PacketId,
    pub metric: Metric,
}

/// Returns `false` for packets C1 marked as decode failures — callers must
/// filter those out before calling `push`.
pub fn admits(packet: &Packet) -> bool {
    !packet.is_error()
}

/// Buffer of the last up-to-`W` received packets, each eviction releasing
/// its own metrics sorted by device time.
pub struct ReorderWindow {
    window: usize,
    fifo: VecDeque<(PacketId, Vec<Metric>)>,
}

impl ReorderWindow {
    pub fn new(window: usize) -> Self {
        assert!(window >= 1, "reorder window size must be at least 1");
        Self {
            window,
            fifo: VecDeque::new(),
        }
    }

    /// Feed one packet's already-sorted-per-packet metrics; returns the
    /// metrics evicted as a side effect, if the FIFO overflowed.
    pub fn push(&mut self, packet_id: PacketId, metrics: Vec<Metric>) -> Vec<TaggedMetric> {
        self.fifo.push_back((packet_id, metrics));
        if self.fifo.len() > self.window {
            self.evict_oldest()
        } else {
            Vec::new()
        }
    }

    /// Drain remaining packets in FIFO order. Used at shutdown so no
    /// buffered metric is lost.
    pub fn flush(&mut self) -> Vec<TaggedMetric> {
        let mut out = Vec::new();
        while !self.fifo.is_empty() {
            out.extend(self.evict_oldest());
        }
        out
    }

    fn evict_oldest(&mut self) -> Vec<TaggedMetric> {
        let Some((packet_id, mut metrics)) = self.fifo.pop_front() else {
            return Vec::new();
        };
        metrics.sort_by(|a, b| compare_device_time(a.device_time_us, b.device_time_us));
        metrics
            .into_iter()
            .map(|metric| TaggedMetric {
                packet_id: packet_id.clone(),
                metric,
            })
            .collect()
    }
}
