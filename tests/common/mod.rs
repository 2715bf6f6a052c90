//! Shared helpers for broker integration tests
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use tracefab::broker::{Broker, BrokerHandle};
use tracefab::config::BrokerConfig;

/// Bind an ephemeral port and run the broker in the background.
pub async fn start_broker(mut config: BrokerConfig) -> (SocketAddr, BrokerHandle) {
    config.port = 0;
    let broker = Broker::bind(config).await.expect("broker bind");
    let addr = broker.local_addr().expect("broker addr");
    let handle = broker.handle();
    tokio::spawn(broker.run());
    (addr, handle)
}

/// A raw NDJSON client over one broker link.
pub struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    /// Connect and consume the `connected` status ack.
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read, writer) = stream.into_split();
        let mut client = Self {
            lines: BufReader::new(read).lines(),
            writer,
        };
        let hello = client.recv().await;
        assert_eq!(hello["type"], "status");
        assert_eq!(hello["status"], "connected");
        assert!(hello["data"]["serverTime"].is_string());
        client
    }

    pub async fn send(&mut self, frame: Value) {
        self.send_raw(&frame.to_string()).await;
    }

    pub async fn send_raw(&mut self, line: &str) {
        let mut line = line.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.expect("send");
    }

    pub async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("recv timed out")
            .expect("link io error")
            .expect("link closed");
        serde_json::from_str(&line).expect("reply is json")
    }

    /// Receive, skipping broker heartbeat pings.
    pub async fn recv_frame(&mut self) -> Value {
        loop {
            let frame = self.recv().await;
            if frame["type"] != "ping" {
                return frame;
            }
        }
    }

    /// Subscribe and consume the ack.
    pub async fn subscribe(&mut self, route: &str, filters: Value) {
        let mut frame = json!({ "type": "subscribe", "route": route });
        if !filters.is_null() {
            frame["filters"] = filters;
        }
        self.send(frame).await;
        let ack = self.recv_frame().await;
        assert_eq!(ack["type"], "status");
        assert_eq!(ack["status"], "subscribed");
    }
}

/// A producer log frame with explicit event fields.
pub fn log_frame(id: &str, route: &str, level: &str, message: &str, source: &str) -> Value {
    json!({
        "type": "log",
        "id": id,
        "route": route,
        "data": {
            "id": id,
            "timestamp": "2026-08-02T10:00:00.000Z",
            "level": level,
            "message": message,
            "source": source,
            "threadId": 1,
            "nestingLevel": 0
        }
    })
}
