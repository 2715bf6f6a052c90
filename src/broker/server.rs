//! The broker: link acceptance, frame dispatch, persistence, broadcast.
//!
//! Each accepted link gets a reader task (this module's dispatch loop) and
//! a writer task fed by an unbounded channel. Dispatch itself never awaits:
//! the subscription table uses short read/write lock sections and sends are
//! channel pushes. A link whose channel is gone is removed from the table
//! without aborting the broadcast that discovered it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::config::BrokerConfig;
use crate::error::{Result, TracefabError};
use crate::event::Event;
use crate::link::{Frame, StatusKind};

use super::persist::RouteSink;
use super::route::{prefix_matches, RouteTable};
use super::stats::{BrokerStats, StatsSnapshot};
use super::subscription::Subscription;

const KNOWN_TYPES: [&str; 8] = [
    "log",
    "trace",
    "subscribe",
    "unsubscribe",
    "ping",
    "pong",
    "status",
    "error",
];

/// Per-link broker state.
struct BrokerLink {
    id: u64,
    addr: SocketAddr,
    connected_at: Instant,
    tx: mpsc::UnboundedSender<Frame>,
    /// Route → compiled subscription
    subs: RwLock<HashMap<String, Subscription>>,
    /// The link's last-subscribed route, default for unrouted events
    current_route: Mutex<Option<String>>,
    last_activity: Mutex<Instant>,
}

impl BrokerLink {
    fn send(&self, frame: Frame) -> bool {
        self.tx.send(frame).is_ok()
    }
}

struct Shared {
    config: BrokerConfig,
    routes: RouteTable,
    /// Parallel to `routes`: the writer behind each configured route
    sinks: Vec<RouteSink>,
    links: DashMap<u64, Arc<BrokerLink>>,
    next_link_id: AtomicU64,
    stats: BrokerStats,
}

impl Shared {
    fn remove_link(&self, id: u64) {
        if self.links.remove(&id).is_some() {
            self.stats.link_closed();
        }
    }
}

/// Cloneable control surface over a running broker.
#[derive(Clone)]
pub struct BrokerHandle {
    shared: Arc<Shared>,
}

impl BrokerHandle {
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Drop every link. Writer channels close, which ends the per-link
    /// tasks and the connections.
    pub fn shutdown(&self) {
        self.shared.links.clear();
    }
}

/// The fan-out broker server.
pub struct Broker {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl Broker {
    /// Bind the configured port. `port` 0 binds an ephemeral port (tests).
    pub async fn bind(config: BrokerConfig) -> Result<Self> {
        let port = config.port;
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| TracefabError::BindError {
                port,
                reason: e.to_string(),
            })?;

        let routes = RouteTable::new(config.routes.clone());
        let sinks = config.routes.iter().cloned().map(RouteSink::new).collect();

        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                config,
                routes,
                sinks,
                links: DashMap::new(),
                next_link_id: AtomicU64::new(1),
                stats: BrokerStats::new(),
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> BrokerHandle {
        BrokerHandle {
            shared: self.shared.clone(),
        }
    }

    /// Accept links until the listener fails. Spawns the heartbeat task.
    pub async fn run(self) -> Result<()> {
        spawn_heartbeat(self.shared.clone());
        loop {
            let (stream, addr) = self.listener.accept().await?;
            tokio::spawn(serve_link(self.shared.clone(), stream, addr));
        }
    }
}

fn spawn_heartbeat(shared: Arc<Shared>) {
    tokio::spawn(async move {
        let period = Duration::from_secs(shared.config.heartbeat_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // immediate first tick is not a probe
        loop {
            interval.tick().await;
            let mut dead = Vec::new();
            for entry in shared.links.iter() {
                if !entry.value().send(Frame::Ping { id: None }) {
                    dead.push(*entry.key());
                }
            }
            for id in dead {
                tracing::warn!(link = id, "Removing link after failed heartbeat");
                shared.remove_link(id);
            }

            let snap = shared.stats.snapshot();
            tracing::info!(
                uptime_secs = snap.uptime_secs,
                links = snap.links,
                messages = snap.messages,
                rate_per_sec = snap.rate_per_sec,
                rss_bytes = snap.rss_bytes.unwrap_or(0),
                "Broker stats"
            );
        }
    });
}

async fn serve_link(shared: Arc<Shared>, stream: TcpStream, addr: SocketAddr) {
    let id = shared.next_link_id.fetch_add(1, Ordering::SeqCst);
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();

    let link = Arc::new(BrokerLink {
        id,
        addr,
        connected_at: Instant::now(),
        tx,
        subs: RwLock::new(HashMap::new()),
        current_route: Mutex::new(None),
        last_activity: Mutex::new(Instant::now()),
    });
    shared.links.insert(id, link.clone());
    shared.stats.link_opened();
    tracing::info!(link = id, %addr, "Link connected");

    let writer = tokio::spawn(write_loop(rx, write_half));

    link.send(Frame::Status {
        status: StatusKind::Connected,
        id: None,
        data: Some(json!({
            "serverTime": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        })),
    });

    let mut lines = BufReader::new(read_half).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        dispatch(&shared, &link, &line);
    }

    shared.remove_link(id);
    writer.abort();
    tracing::info!(
        link = id,
        addr = %link.addr,
        uptime_secs = link.connected_at.elapsed().as_secs(),
        "Link removed"
    );
}

async fn write_loop(mut rx: mpsc::UnboundedReceiver<Frame>, mut writer: OwnedWriteHalf) {
    while let Some(frame) = rx.recv().await {
        let mut line = match serde_json::to_string(&frame) {
            Ok(line) => line,
            Err(err) => {
                tracing::error!(%err, "Failed to serialize outbound frame");
                continue;
            }
        };
        line.push('\n');
        if writer.write_all(line.as_bytes()).await.is_err() {
            break;
        }
    }
}

/// Handle one inbound frame. Never awaits.
fn dispatch(shared: &Arc<Shared>, link: &Arc<BrokerLink>, line: &str) {
    *link.last_activity.lock() = Instant::now();

    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(err) => {
            link.send(Frame::Error {
                error: format!("Malformed frame: {}", err),
            });
            return;
        }
    };
    let kind = value.get("type").and_then(Value::as_str).map(str::to_string);
    let frame: Frame = match serde_json::from_value(value) {
        Ok(f) => f,
        Err(err) => {
            let error = match kind.as_deref() {
                Some(k) if !KNOWN_TYPES.contains(&k) => "Unknown message type".to_string(),
                _ => format!("Malformed frame: {}", err),
            };
            link.send(Frame::Error { error });
            return;
        }
    };

    match frame {
        Frame::Log { id, route, data } | Frame::Trace { id, route, data } => {
            handle_event(shared, link, id, route, data);
        }
        Frame::Subscribe { route, filters } => {
            let subscription = Subscription::compile(route.clone(), filters.unwrap_or_default());
            link.subs.write().insert(route.clone(), subscription);
            *link.current_route.lock() = Some(route.clone());
            tracing::debug!(link = link.id, route, "Subscribed");
            link.send(Frame::Status {
                status: StatusKind::Subscribed,
                id: None,
                data: Some(json!({ "route": route })),
            });
        }
        Frame::Unsubscribe { route } => {
            link.subs.write().remove(&route);
            link.send(Frame::Status {
                status: StatusKind::Unsubscribed,
                id: None,
                data: Some(json!({ "route": route })),
            });
        }
        Frame::Ping { .. } => {
            link.send(Frame::Pong);
        }
        // Heartbeat responses and peer acks: activity already recorded
        Frame::Pong | Frame::Status { .. } | Frame::Error { .. } => {}
    }
}

fn handle_event(
    shared: &Arc<Shared>,
    link: &Arc<BrokerLink>,
    frame_id: Option<String>,
    route: Option<String>,
    event: Event,
) {
    let route = route
        .or_else(|| link.current_route.lock().clone())
        .unwrap_or_else(|| "/".to_string());

    let Some((sink_index, _)) = shared.routes.resolve(&route) else {
        link.send(Frame::Error {
            error: format!("No route configured for '{}'", route),
        });
        return;
    };

    shared.stats.record_message();
    let frame_type = if event.is_trace() { "trace" } else { "log" };
    shared.sinks[sink_index].write(link.id, &route, frame_type, &event);
    broadcast(shared, &route, &event);

    link.send(Frame::Status {
        status: StatusKind::Ok,
        id: frame_id,
        data: None,
    });
}

/// Fan the event out to every link whose subscription covers the route and
/// whose predicates all pass. Dead links are swept afterwards.
fn broadcast(shared: &Arc<Shared>, route: &str, event: &Event) {
    let frame = Frame::broadcast(event.clone());
    let mut dead = Vec::new();

    for entry in shared.links.iter() {
        let candidate = entry.value();
        let interested = {
            let subs = candidate.subs.read();
            subs.values().any(|sub| {
                prefix_matches(&sub.route, route)
                    && sub.accepts(event, shared.config.filter_rule)
            })
        };
        if interested && !candidate.send(frame.clone()) {
            dead.push(candidate.id);
        }
    }

    for id in dead {
        tracing::warn!(link = id, "Removed link after send failure");
        shared.remove_link(id);
    }
}
