//! Thin transport adapters wired around `telemetry-core`: UDP input, a
//! decode+enrich stage, and the HTTP/WebSocket outbound side (C7).

pub mod config;
pub mod http;
pub mod pipeline;
pub mod udp;
