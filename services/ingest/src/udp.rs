//! Inbound UDP listener (C7). Converts each datagram into a `RawDatagram`
//! and hands it to the decode+enrich stage's input queue. Socket read
//! errors are logged; the listener keeps running (§4.7).

use crate::pipeline::RawDatagram;
use std::time::{SystemTime, UNIX_EPOCH};
use telemetry_core::queue::DropOldestQueue;
use tokio::net::UdpSocket;
use tracing::{error, info};

const MAX_DATAGRAM_BYTES: usize = 64 * 1024;

pub async fn run(socket: UdpSocket, input: DropOldestQueue<RawDatagram>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
    info!(addr = ?socket.local_addr().ok(), "udp listener started");
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, peer)) => {
                let payload = String::from_utf8_lossy(&buf[..len]).into_owned();
                input
                    .push(RawDatagram {
                        payload,
                        sender: peer.to_string(),
                        received_at_ms: now_ms(),
                    })
                    .await;
            }
            Err(error) => {
                error!(%error, "udp recv failed, continuing");
            }
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_one_datagram_to_the_input_queue() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let input = DropOldestQueue::new(10);
        let task_input = input.clone();
        let task = tokio::spawn(run(listener, task_input));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(b"msg=1,tm=0,v=1\ntemp v=1i 0\n", addr)
            .await
            .unwrap();

        let datagram = tokio::time::timeout(std::time::Duration::from_secs(2), input.recv())
            .await
            .expect("datagram arrived")
            .expect("queue not closed");
        assert!(datagram.payload.contains("temp"));

        task.abort();
    }
}
