//! C5 — Archive writer: drains the hub and persists enriched packets into
//! per-print `.records` files, applying the active-print state machine.

use super::{
    archive_path, decide, extract_filename, sanitize_filename, ActivePrint, ArchiveError,
    PRINT_END_TIMEOUT_MS,
};
use crate::counters::IngestCounters;
use crate::hub::Hub;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use telemetry_protocol::EnrichedPacket;
use tokio::io::AsyncWriteExt;
use tracing::error;

/// Owns the per-sender `ActivePrint` table. Confined to a single task by
/// convention (§9): nothing outside this struct's own methods ever touches
/// `active`.
pub struct ArchiveWriter {
    root: PathBuf,
    timeout_ms: i64,
    active: HashMap<String, ActivePrint>,
}

impl ArchiveWriter {
    pub fn new(root: PathBuf) -> Self {
        Self::with_timeout(root, PRINT_END_TIMEOUT_MS)
    }

    pub fn with_timeout(root: PathBuf, timeout_ms: i64) -> Self {
        Self {
            root,
            timeout_ms,
            active: HashMap::new(),
        }
    }

    /// Apply the state machine for one packet's sender, returning the
    /// filename to persist under, if any. Split out from `persist` so the
    /// transition logic is unit-testable without touching the filesystem.
    pub fn handle_packet(&mut self, packet: &EnrichedPacket) -> Option<String> {
        let observed = extract_filename(&packet.metrics);
        let current = self.active.get(&packet.sender).cloned();
        let transition = decide(current, observed.as_deref(), packet.received_at, self.timeout_ms);
        match transition.next_state.clone() {
            Some(state) => {
                self.active.insert(packet.sender.clone(), state);
            }
            None => {
                self.active.remove(&packet.sender);
            }
        }
        transition.persist_as
    }

    /// Append one record to the target print's archive file. A failed write
    /// is the caller's concern to log; in-memory state is untouched either
    /// way (§4.5 failure handling).
    pub async fn persist(&self, packet: &EnrichedPacket, filename: &str) -> Result<(), ArchiveError> {
        let sanitized = sanitize_filename(filename);
        let path = archive_path(&self.root, packet.received_at, &sanitized);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let line = packet.to_line()?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    /// Drain a fresh hub subscription until it closes, persisting each
    /// packet the state machine decides to keep.
    pub async fn run(
        mut self,
        hub: Arc<Hub<EnrichedPacket>>,
        buffer_capacity: usize,
        counters: Arc<IngestCounters>,
    ) {
        let (_handle, subscription) = hub.subscribe(buffer_capacity).await;
        while let Some(packet) = subscription.recv().await {
            if let Some(filename) = self.handle_packet(&packet) {
                if let Err(error) = self.persist(&packet, &filename).await {
                    counters.archive_write_failures.fetch_add(1, Ordering::Relaxed);
                    let path = archive_path(&self.root, packet.received_at, &sanitize_filename(&filename));
                    error!(sender = %packet.sender, ?path, %error, "archive write failed");
                }
            }
        }
    }
}
