use ingest::http::{build_router, AppState};
use ingest::pipeline::{self, RawDatagram};
use ingest::udp;
use std::sync::Arc;
use std::time::Duration;
use telemetry_core::archive::{ArchiveReader, ArchiveWriter};
use telemetry_core::queue::DropOldestQueue;
use telemetry_core::{Hub, IngestCounters};
use telemetry_protocol::EnrichedPacket;

/// A datagram sent over real UDP ends up archived on disk and readable
/// through the HTTP API, exercising C1 through C7 together.
#[tokio::test]
async fn udp_datagram_is_decoded_archived_and_served_over_http() {
    let archive_dir = tempfile::tempdir().unwrap();

    let hub: Arc<Hub<EnrichedPacket>> = Arc::new(Hub::new());
    let input_queue = DropOldestQueue::<RawDatagram>::new(100);
    let counters = Arc::new(IngestCounters::default());

    let writer = ArchiveWriter::new(archive_dir.path().to_path_buf());
    tokio::spawn(writer.run(Arc::clone(&hub), 10, Arc::clone(&counters)));
    tokio::spawn(pipeline::run(
        input_queue.clone(),
        Arc::clone(&hub),
        Arc::clone(&counters),
    ));

    let udp_socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let udp_addr = udp_socket.local_addr().unwrap();
    tokio::spawn(udp::run(udp_socket, input_queue.clone()));

    let state = AppState {
        hub: Arc::clone(&hub),
        archive_reader: Arc::new(ArchiveReader::new(archive_dir.path().to_path_buf())),
        counters: Arc::clone(&counters),
        input_queue: input_queue.clone(),
    };
    let router = build_router(state);
    let http_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_addr = http_listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(http_listener, router).await.unwrap();
    });

    let client = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let payload = b"msg=1,tm=0,v=1\nprint_filename v=\"job.gcode\" 0\ntemp v=25i 5\n";
    client.send_to(payload, udp_addr).await.unwrap();

    // Give the pipeline a moment to decode, enrich, publish, and persist.
    let http_client = reqwest::Client::new();
    let archives = poll_until_non_empty(&http_client, &http_addr.to_string()).await;
    assert_eq!(archives.len(), 1);
    assert_eq!(archives[0]["filename"], "job.gcode");

    let date = archives[0]["date"].as_str().unwrap();
    let records: serde_json::Value = http_client
        .get(format!(
            "http://{http_addr}/api/archive/{date}/job.gcode"
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    // print_filename (offset 0 -> device_time_us 0) sorts ahead of temp
    // (offset 5 -> device_time_us 5000).
    assert_eq!(records[0]["metrics"][0]["name"], "print_filename");
    assert_eq!(records[0]["metrics"][1]["name"], "temp");

    let stats: serde_json::Value = http_client
        .get(format!("http://{http_addr}/api/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["packets_published"], 1);
    assert_eq!(stats["decode_errors"], 0);
}

async fn poll_until_non_empty(client: &reqwest::Client, http_addr: &str) -> Vec<serde_json::Value> {
    for _ in 0..50 {
        let archives: Vec<serde_json::Value> = client
            .get(format!("http://{http_addr}/api/archives"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if !archives.is_empty() {
            return archives;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("archive never appeared");
}
