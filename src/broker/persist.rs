//! Route persistence: one record per dispatched event.
//!
//! Record shape follows the route's capture mode; `console` routes write to
//! stdout, file routes append a line (parent directories created lazily).
//! Write failures are logged and never interrupt dispatch.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::event::Event;

use super::route::{CaptureMode, RecordFormat, RouteConfig};

/// Build the persisted record for an event per the capture mode.
pub fn build_record(
    mode: CaptureMode,
    client_id: u64,
    route: &str,
    frame_type: &str,
    event: &Event,
) -> Value {
    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    match mode {
        CaptureMode::Full => json!({
            "timestamp": timestamp,
            "clientId": client_id,
            "route": route,
            "type": frame_type,
            "data": event,
        }),
        CaptureMode::PayloadOnly => json!({
            "timestamp": timestamp,
            "data": event,
        }),
        CaptureMode::BodyOnly => serde_json::to_value(event).unwrap_or(Value::Null),
    }
}

/// The writer behind one configured route.
pub struct RouteSink {
    config: RouteConfig,
    writer: Mutex<Option<BufWriter<File>>>,
    path: Option<PathBuf>,
}

impl RouteSink {
    pub fn new(config: RouteConfig) -> Self {
        let path = (!config.is_console()).then(|| PathBuf::from(&config.output));
        Self {
            config,
            writer: Mutex::new(None),
            path,
        }
    }

    pub fn config(&self) -> &RouteConfig {
        &self.config
    }

    /// Persist one event. Failures are logged, not returned: a broken sink
    /// must not abort dispatch.
    pub fn write(&self, client_id: u64, route: &str, frame_type: &str, event: &Event) {
        let line = match self.config.format {
            RecordFormat::Text => {
                let stamp =
                    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
                format!("[{}] {}", stamp, event.message)
            }
            RecordFormat::Json | RecordFormat::Jsonl => {
                let record = build_record(self.config.capture, client_id, route, frame_type, event);
                match serde_json::to_string(&record) {
                    Ok(s) => s,
                    Err(err) => {
                        tracing::error!(%err, route, "Failed to serialize record");
                        return;
                    }
                }
            }
        };

        if self.config.is_console() {
            println!("{}", line);
            return;
        }
        if let Err(err) = self.append(&line) {
            tracing::error!(
                output = %self.config.output,
                %err,
                "Sink write failed, event not persisted"
            );
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let mut slot = self.writer.lock();
        if slot.is_none() {
            let path = match &self.path {
                Some(p) => p,
                None => return Ok(()),
            };
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            *slot = Some(BufWriter::new(file));
        }
        // Drop the writer on failure so the next write retries the open
        if let Some(writer) = slot.as_mut() {
            if let Err(err) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
                *slot = None;
                return Err(err);
            }
        }
        Ok(())
    }
}
