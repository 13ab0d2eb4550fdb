use clap::Parser;
use ingest::config::{archive_root, Cli, Command};
use ingest::http::{build_router, AppState};
use ingest::pipeline::{self, RawDatagram};
use ingest::udp;
use std::sync::Arc;
use telemetry_core::archive::{ArchiveReader, ArchiveWriter};
use telemetry_core::queue::DropOldestQueue;
use telemetry_core::{Hub, IngestCounters};
use tracing::info;
use tracing_subscriber::EnvFilter;

const INPUT_BUFFER_CAPACITY: usize = 1000;
const ARCHIVE_WRITER_BUFFER_CAPACITY: usize = 100;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let Command::Serve { udp_port, http_port } = cli.command;

    let archive_root = archive_root();
    info!(?archive_root, "using archive root");

    let udp_socket = match tokio::net::UdpSocket::bind(("0.0.0.0", udp_port)).await {
        Ok(socket) => socket,
        Err(error) => {
            eprintln!("FATAL: failed to bind UDP port {udp_port}: {error}");
            std::process::exit(1);
        }
    };

    let hub = Arc::new(Hub::new());
    let input_queue = DropOldestQueue::<RawDatagram>::new(INPUT_BUFFER_CAPACITY);
    let counters = Arc::new(IngestCounters::default());
    let archive_reader = Arc::new(ArchiveReader::new(archive_root.clone()));

    let writer = ArchiveWriter::new(archive_root);
    tokio::spawn(writer.run(
        Arc::clone(&hub),
        ARCHIVE_WRITER_BUFFER_CAPACITY,
        Arc::clone(&counters),
    ));
    tokio::spawn(pipeline::run(
        input_queue.clone(),
        Arc::clone(&hub),
        Arc::clone(&counters),
    ));
    tokio::spawn(udp::run(udp_socket, input_queue.clone()));

    let state = AppState {
        hub: Arc::clone(&hub),
        archive_reader,
        counters,
        input_queue,
    };
    let router = build_router(state);

    let http_addr = format!("0.0.0.0:{http_port}");
    let listener = match tokio::net::TcpListener::bind(&http_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            eprintln!("FATAL: failed to bind HTTP port {http_port}: {error}");
            std::process::exit(1);
        }
    };
    info!(udp_port, http_port, "ingest service listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("http server error");

    hub.close().await;
    info!("ingest service shut down gracefully");
}

/// Cooperative shutdown trigger: Ctrl+C or SIGTERM. The UDP and
/// decode+enrich tasks are detached and simply stop being polled once the
/// process exits; the hub close above unblocks any still-draining
/// subscriber (§5).
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
