//! Event log output.
//!
//! Handlers run on the hook thread and must not block, so they hand finished
//! lines to a printer thread over a bounded channel and drop lines when it
//! falls behind.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// One logged event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLine {
    pub event: &'static str,
    pub detail: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub suppressed: bool,
    pub timestamp_ms: u64,
}

impl EventLine {
    pub fn render(&self, format: LogFormat) -> String {
        match format {
            LogFormat::Text => {
                let mut text = format!("{:<18} {}", self.event, self.detail);
                if self.suppressed {
                    text.push_str(" Suppressed");
                }
                text.trim_end().to_string()
            }
            LogFormat::Json => serde_json::to_string(self)
                .unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}")),
        }
    }
}

/// Non-blocking handle for queuing lines.
#[derive(Clone)]
pub struct LineSender {
    tx: Sender<EventLine>,
    dropped: Arc<AtomicU64>,
}

impl LineSender {
    pub fn new(tx: Sender<EventLine>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn send(&self, line: EventLine) {
        match self.tx.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    warn!(dropped, "Printer queue full, dropping event lines");
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Start the printer thread. It exits once every sender is dropped.
pub fn spawn(format: LogFormat) -> (LineSender, JoinHandle<()>) {
    let (tx, rx) = bounded(QUEUE_CAPACITY);
    let handle = thread::spawn(move || run(rx, format));
    (LineSender::new(tx), handle)
}

fn run(rx: Receiver<EventLine>, format: LogFormat) {
    debug!(?format, "Printer thread started");
    for line in rx.iter() {
        println!("{}", line.render(format));
    }
    debug!("Printer thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(suppressed: bool) -> EventLine {
        EventLine {
            event: "MouseDownExt",
            detail: "Right".into(),
            suppressed,
            timestamp_ms: 12,
        }
    }

    #[test]
    fn test_text_render() {
        assert_eq!(line(false).render(LogFormat::Text), "MouseDownExt       Right");
        assert!(line(true).render(LogFormat::Text).ends_with("Right Suppressed"));
    }

    #[test]
    fn test_json_render() {
        let value: serde_json::Value =
            serde_json::from_str(&line(true).render(LogFormat::Json)).unwrap();
        assert_eq!(value["event"], "MouseDownExt");
        assert_eq!(value["suppressed"], true);
        assert_eq!(value["timestamp_ms"], 12);

        let value: serde_json::Value =
            serde_json::from_str(&line(false).render(LogFormat::Json)).unwrap();
        assert!(value.get("suppressed").is_none());
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let (tx, rx) = bounded(1);
        let sender = LineSender::new(tx);
        sender.send(line(false));
        sender.send(line(false));
        sender.send(line(false));
        assert_eq!(sender.dropped(), 2);
        assert_eq!(rx.len(), 1);
    }
}
