//! Shared observability counters, threaded through the pipeline, archive
//! writer, and archive reader: cheap visibility into drop/error rates
//! without querying the archive itself.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct IngestCounters {
    pub datagrams_received: AtomicU64,
    pub decode_errors: AtomicU64,
    pub packets_published: AtomicU64,
    pub archive_write_failures: AtomicU64,
    pub archive_skipped_records: AtomicU64,
}

impl IngestCounters {
    pub fn snapshot(&self) -> IngestCountersSnapshot {
        IngestCountersSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            packets_published: self.packets_published.load(Ordering::Relaxed),
            archive_write_failures: self.archive_write_failures.load(Ordering::Relaxed),
            archive_skipped_records: self.archive_skipped_records.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestCountersSnapshot {
    pub datagrams_received: u64,
    pub decode_errors: u64,
    pub packets_published: u64,
    pub archive_write_failures: u64,
    pub archive_skipped_records: u64,
}
