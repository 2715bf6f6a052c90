//! Broker runtime statistics.
//!
//! Counters plus a 60-second sliding window for the per-second message
//! rate, and a best-effort process RSS gauge (Linux only).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Point-in-time statistics snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub links: u64,
    pub messages: u64,
    /// Messages per second over the sliding window
    pub rate_per_sec: f64,
    pub rss_bytes: Option<u64>,
}

pub struct BrokerStats {
    started: Instant,
    links: AtomicU64,
    messages: AtomicU64,
    window: Mutex<VecDeque<Instant>>,
}

impl BrokerStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            links: AtomicU64::new(0),
            messages: AtomicU64::new(0),
            window: Mutex::new(VecDeque::new()),
        }
    }

    pub fn link_opened(&self) {
        self.links.fetch_add(1, Ordering::SeqCst);
    }

    pub fn link_closed(&self) {
        // Saturating: double-remove must not wrap the gauge
        let _ = self
            .links
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn record_message(&self) {
        self.messages.fetch_add(1, Ordering::SeqCst);
        let now = Instant::now();
        let mut window = self.window.lock();
        window.push_back(now);
        Self::prune(&mut window, now);
    }

    fn prune(window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = window.front() {
            if now.duration_since(*front) > RATE_WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let now = Instant::now();
        let rate = {
            let mut window = self.window.lock();
            Self::prune(&mut window, now);
            window.len() as f64 / RATE_WINDOW.as_secs_f64()
        };
        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            links: self.links.load(Ordering::SeqCst),
            messages: self.messages.load(Ordering::SeqCst),
            rate_per_sec: rate,
            rss_bytes: process_rss_bytes(),
        }
    }
}

impl Default for BrokerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Resident set size from `/proc/self/statm`; `None` off Linux or on any
/// read failure.
#[cfg(target_os = "linux")]
fn process_rss_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn process_rss_bytes() -> Option<u64> {
    None
}
