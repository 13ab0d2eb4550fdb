//! Ingest-and-fan-out core: frame decoding, enrichment, the reorder window,
//! the broadcast hub, and per-print archival. No sockets or HTTP live here;
//! those are thin adapters built on top of these pieces.

pub mod archive;
pub mod counters;
pub mod decode;
pub mod enrich;
pub mod hub;
pub mod queue;
pub mod reorder;

pub use archive::{ArchiveReader, ArchiveWriter};
pub use counters::{IngestCounters, IngestCountersSnapshot};
pub use decode::decode;
pub use enrich::enrich;
pub use hub::Hub;
pub use queue::DropOldestQueue;
pub use reorder::ReorderWindow;
