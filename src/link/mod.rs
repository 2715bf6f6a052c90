//! Link Transport - the persistent bidirectional channel to the broker.
//!
//! Key types:
//! - `Frame`: the NDJSON wire envelope (both directions)
//! - `Link`: reconnecting transport handle with an unbounded offer queue
//! - `LinkState`: observable state machine including terminal `GaveUp`
//! - `BackoffPolicy`: the `min(1s · 2^k, 30s)` reconnect curve

mod backoff;
mod frame;
mod transport;

pub use backoff::BackoffPolicy;
pub use frame::{Frame, StatusKind, SubscriptionFilters};
pub use transport::{Link, LinkConfig, LinkState};
