//! Deterministic event-to-line rendering for local sinks.
//!
//! Line format: `[HH.MM.SS.mmm] <pipes><payload>` where `<pipes>` is `"|"`
//! repeated `nesting_level` times. Entry/exit markers render their raw
//! `>>> Call` / `<<< Exit` message; any other event at depth > 0 gets two
//! leading spaces so nested logs read as children of the enclosing frame.

use chrono::Local;

use crate::event::Event;

/// Render the line body (everything after the timestamp tag).
pub fn render_body(event: &Event) -> String {
    let pipes = "|".repeat(event.nesting_level as usize);
    if event.is_frame_marker() || event.nesting_level == 0 {
        format!("{}{}", pipes, event.message)
    } else {
        format!("{}  {}", pipes, event.message)
    }
}

/// Render a full sink line with the current local wall time.
pub fn render_line(event: &Event) -> String {
    let stamp = Local::now().format("%H.%M.%S%.3f");
    format!("[{}] {}", stamp, render_body(event))
}
