//! Producer-side link transport.
//!
//! A [`Link`] owns a background driver task that connects to the broker,
//! writes offered frames as NDJSON, and reads inbound frames (acks,
//! broadcasts, heartbeat pings). Frames offered while the link is not
//! connected are queued in order and drained before new frames once the
//! connection opens. Reconnects back off exponentially; after
//! `max_retries` consecutive failures the link gives up terminally.
//!
//! The driver task is the single owner of the pending queue; producers
//! reach it only through the unbounded offer channel.

use std::collections::VecDeque;
use std::future::Future;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use super::backoff::BackoffPolicy;
use super::frame::Frame;

/// Observable transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: `max_retries` consecutive reconnects failed
    GaveUp,
    /// Terminal: closed by the producer
    Closed,
}

impl LinkState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GaveUp | Self::Closed)
    }
}

/// Link configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub addr: String,
    /// Consecutive reconnect failures before giving up
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
}

impl LinkConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            max_retries: 10,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Handle to a running link.
pub struct Link {
    offers: mpsc::UnboundedSender<Frame>,
    state_rx: watch::Receiver<LinkState>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    shutdown: watch::Sender<bool>,
}

impl Link {
    /// Start the driver task. The link begins connecting immediately;
    /// frames offered before the connection opens are queued.
    pub fn connect(config: LinkConfig) -> Self {
        let (offers_tx, offers_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(drive(config, offers_rx, state_tx, inbound_tx, shutdown_rx));

        Self {
            offers: offers_tx,
            state_rx,
            inbound: Mutex::new(Some(inbound_rx)),
            shutdown: shutdown_tx,
        }
    }

    /// Offer a frame for delivery. Never blocks; while disconnected the
    /// frame is queued (producer's risk, the queue is unbounded).
    pub fn offer(&self, frame: Frame) {
        let _ = self.offers.send(frame);
    }

    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    /// Watch state transitions, including the terminal `GaveUp` signal.
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    /// Take the inbound frame stream (broadcasts and acks). Yields `None`
    /// after the first call.
    pub fn take_incoming(&self) -> Option<mpsc::UnboundedReceiver<Frame>> {
        self.inbound.lock().take()
    }

    /// Cancel the reconnect timer and any pending send. Queued frames are
    /// lost; this is a terminal transition.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

enum Raced<T> {
    Done(T),
    Shutdown,
}

enum IoEnd {
    Disconnected,
    Shutdown,
}

struct DriverIo {
    offers: mpsc::UnboundedReceiver<Frame>,
    offers_open: bool,
    queue: VecDeque<Frame>,
    inbound: mpsc::UnboundedSender<Frame>,
    shutdown: watch::Receiver<bool>,
}

impl DriverIo {
    /// Run `fut` to completion while still accepting offers into the queue
    /// and honoring shutdown.
    async fn race<T>(&mut self, fut: impl Future<Output = T>) -> Raced<T> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return Raced::Done(out),
                maybe = self.offers.recv(), if self.offers_open => match maybe {
                    Some(frame) => self.queue.push_back(frame),
                    None => self.offers_open = false,
                },
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        return Raced::Shutdown;
                    }
                }
            }
        }
    }
}

async fn drive(
    config: LinkConfig,
    offers: mpsc::UnboundedReceiver<Frame>,
    state: watch::Sender<LinkState>,
    inbound: mpsc::UnboundedSender<Frame>,
    shutdown: watch::Receiver<bool>,
) {
    let mut io = DriverIo {
        offers,
        offers_open: true,
        queue: VecDeque::new(),
        inbound,
        shutdown,
    };
    let mut attempts: u32 = 0;

    loop {
        if *io.shutdown.borrow() {
            let _ = state.send(LinkState::Closed);
            return;
        }

        let _ = state.send(LinkState::Connecting);
        let interval = config.backoff.delay_for(attempts);
        let connect = tokio::time::timeout(interval, TcpStream::connect(&config.addr));

        match io.race(connect).await {
            Raced::Shutdown => {
                let _ = state.send(LinkState::Closed);
                return;
            }
            Raced::Done(Ok(Ok(stream))) => {
                attempts = 0;
                let _ = state.send(LinkState::Connected);
                tracing::debug!(addr = %config.addr, "Link connected");
                match connected_io(stream, &mut io).await {
                    IoEnd::Shutdown => {
                        let _ = state.send(LinkState::Closed);
                        return;
                    }
                    IoEnd::Disconnected => {
                        tracing::debug!(addr = %config.addr, "Link lost");
                    }
                }
            }
            Raced::Done(Ok(Err(err))) => {
                tracing::debug!(addr = %config.addr, %err, "Link connect failed");
            }
            Raced::Done(Err(_elapsed)) => {
                tracing::debug!(addr = %config.addr, "Link connect timed out");
            }
        }

        let _ = state.send(LinkState::Disconnected);
        if attempts >= config.max_retries {
            tracing::warn!(
                addr = %config.addr,
                attempts,
                "Link giving up after repeated reconnect failures"
            );
            let _ = state.send(LinkState::GaveUp);
            return;
        }
        let delay = config.backoff.delay_for(attempts);
        attempts += 1;
        if let Raced::Shutdown = io.race(tokio::time::sleep(delay)).await {
            let _ = state.send(LinkState::Closed);
            return;
        }
    }
}

async fn connected_io(stream: TcpStream, io: &mut DriverIo) -> IoEnd {
    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    // Queued frames drain in order before anything new
    while let Some(frame) = io.queue.pop_front() {
        if write_frame(&mut writer, &frame).await.is_err() {
            io.queue.push_front(frame);
            return IoEnd::Disconnected;
        }
    }

    loop {
        tokio::select! {
            maybe = io.offers.recv(), if io.offers_open => match maybe {
                Some(frame) => {
                    if write_frame(&mut writer, &frame).await.is_err() {
                        io.queue.push_front(frame);
                        return IoEnd::Disconnected;
                    }
                }
                None => io.offers_open = false,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if handle_inbound(&line, &mut writer, &io.inbound).await.is_err() {
                        return IoEnd::Disconnected;
                    }
                }
                Ok(None) | Err(_) => return IoEnd::Disconnected,
            },
            _ = io.shutdown.changed() => {
                if *io.shutdown.borrow() {
                    return IoEnd::Shutdown;
                }
            }
        }
    }
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &Frame) -> std::io::Result<()> {
    // Frame serialization cannot fail for the envelope types we construct
    let mut line = serde_json::to_string(frame).unwrap_or_default();
    line.push('\n');
    writer.write_all(line.as_bytes()).await
}

/// Answer heartbeat pings in place; everything else goes to the consumer.
async fn handle_inbound(
    line: &str,
    writer: &mut OwnedWriteHalf,
    inbound: &mpsc::UnboundedSender<Frame>,
) -> std::io::Result<()> {
    match serde_json::from_str::<Frame>(line) {
        Ok(Frame::Ping { .. }) => write_frame(writer, &Frame::Pong).await,
        Ok(frame) => {
            let _ = inbound.send(frame);
            Ok(())
        }
        Err(err) => {
            tracing::warn!(%err, "Dropping malformed inbound frame");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::frame::StatusKind;
    use tokio::net::TcpListener;

    async fn recv_state(rx: &mut watch::Receiver<LinkState>, want: LinkState) {
        loop {
            if *rx.borrow() == want {
                return;
            }
            rx.changed().await.expect("state channel closed");
        }
    }

    #[tokio::test]
    async fn connects_and_drains_queued_frames_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let link = Link::connect(LinkConfig::new(addr.to_string()));
        // Offered before the connection opens: both must arrive, in order
        link.offer(Frame::Ping {
            id: Some("first".to_string()),
        });
        link.offer(Frame::Ping {
            id: Some("second".to_string()),
        });

        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        let first = lines.next_line().await.unwrap().unwrap();
        let second = lines.next_line().await.unwrap().unwrap();
        assert!(first.contains("first"));
        assert!(second.contains("second"));

        let mut state = link.watch_state();
        recv_state(&mut state, LinkState::Connected).await;
        link.close();
        recv_state(&mut state, LinkState::Closed).await;
    }

    #[tokio::test]
    async fn answers_broker_pings_and_forwards_the_rest() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let link = Link::connect(LinkConfig::new(addr.to_string()));
        let mut incoming = link.take_incoming().unwrap();
        assert!(link.take_incoming().is_none());

        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(b"{\"type\":\"ping\"}\n{\"type\":\"status\",\"status\":\"connected\"}\n")
            .await
            .unwrap();

        // Ping is answered on the wire, not surfaced
        let reply = lines.next_line().await.unwrap().unwrap();
        assert_eq!(reply, r#"{"type":"pong"}"#);

        match incoming.recv().await.unwrap() {
            Frame::Status { status, .. } => assert_eq!(status, StatusKind::Connected),
            other => panic!("expected status, got {:?}", other),
        }

        link.close();
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        // Unroutable per RFC 5737; with a tight backoff the failures are fast
        let config = LinkConfig::new("127.0.0.1:1")
            .with_max_retries(2)
            .with_backoff(BackoffPolicy {
                initial_delay: std::time::Duration::from_millis(10),
                max_delay: std::time::Duration::from_millis(20),
            });

        let link = Link::connect(config);
        let mut state = link.watch_state();
        recv_state(&mut state, LinkState::GaveUp).await;
        assert!(link.state().is_terminal());
    }

    #[tokio::test]
    async fn close_cancels_pending_reconnect() {
        let config = LinkConfig::new("127.0.0.1:1").with_backoff(BackoffPolicy {
            initial_delay: std::time::Duration::from_secs(3600),
            max_delay: std::time::Duration::from_secs(3600),
        });

        let link = Link::connect(config);
        // Give the driver a moment to enter its first failure/backoff
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        link.close();

        let mut state = link.watch_state();
        recv_state(&mut state, LinkState::Closed).await;
    }
}
