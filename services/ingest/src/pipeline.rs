//! Decode+enrich stage: drains the raw-datagram input queue, runs C1 and
//! C2, and publishes onto the hub. Errored decodes are counted and never
//! reach C3/C5 or the WebSocket fan-out (§7).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use telemetry_core::queue::DropOldestQueue;
use telemetry_core::{decode, enrich, Hub, IngestCounters};
use telemetry_protocol::EnrichedPacket;
use tracing::{info, warn};

/// One datagram as handed off by the UDP listener, before decoding.
#[derive(Debug, Clone)]
pub struct RawDatagram {
    pub payload: String,
    pub sender: String,
    pub received_at_ms: i64,
}

/// Drain `input` until it closes, decoding and enriching each datagram and
/// publishing the result onto `hub`.
pub async fn run(
    input: DropOldestQueue<RawDatagram>,
    hub: Arc<Hub<EnrichedPacket>>,
    counters: Arc<IngestCounters>,
) {
    while let Some(datagram) = input.recv().await {
        counters.datagrams_received.fetch_add(1, Ordering::Relaxed);
        let packet = decode(&datagram.payload, datagram.sender, datagram.received_at_ms);
        if packet.is_error() {
            counters.decode_errors.fetch_add(1, Ordering::Relaxed);
            warn!(
                error = packet.error.as_deref().unwrap_or("unknown"),
                "decode failed, dropping datagram"
            );
            continue;
        }
        let enriched = enrich(&packet);
        counters.packets_published.fetch_add(1, Ordering::Relaxed);
        hub.publish(enriched).await;
    }
    info!("decode+enrich stage drained, exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn well_formed_datagrams_reach_the_hub() {
        let input = DropOldestQueue::new(10);
        let hub = Arc::new(Hub::new());
        let counters = Arc::new(IngestCounters::default());
        let (_handle, subscription) = hub.subscribe(10).await;

        input
            .push(RawDatagram {
                payload: "msg=7,tm=9000,v=2\ntemp v=25i 1\n".to_owned(),
                sender: "10.0.0.1:5000".to_owned(),
                received_at_ms: 0,
            })
            .await;
        input.close();

        run(input, Arc::clone(&hub), Arc::clone(&counters)).await;

        let enriched = subscription.recv().await.expect("packet delivered");
        assert_eq!(enriched.metrics.len(), 1);
        assert_eq!(counters.packets_published.load(Ordering::Relaxed), 1);
        assert_eq!(counters.decode_errors.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn malformed_datagrams_are_counted_and_never_published() {
        let input = DropOldestQueue::new(10);
        let hub = Arc::new(Hub::new());
        let counters = Arc::new(IngestCounters::default());
        let (_handle, subscription) = hub.subscribe(10).await;

        input
            .push(RawDatagram {
                payload: String::new(),
                sender: "10.0.0.1:5000".to_owned(),
                received_at_ms: 0,
            })
            .await;
        input.close();

        run(input, Arc::clone(&hub), Arc::clone(&counters)).await;
        hub.close().await;

        assert_eq!(subscription.recv().await, None);
        assert_eq!(counters.decode_errors.load(Ordering::Relaxed), 1);
        assert_eq!(counters.packets_published.load(Ordering::Relaxed), 0);
    }
}
