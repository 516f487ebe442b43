use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::protocol::StreamEvent;

pub const EVENT_SCHEMA_VERSION: &str = "agentcheck.stream.v1";

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Consumer of decoded agent stream events. The driver forwards every
/// event it decodes, in order, to one sink.
pub trait EventSink {
    fn emit(&mut self, event: &StreamEvent);
}

/// Discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &StreamEvent) {}
}

#[derive(Serialize)]
struct EventRecord<'a> {
    schema_version: &'static str,
    ts: String,
    #[serde(flatten)]
    event: &'a StreamEvent,
}

/// Appends one JSON record per event to a file. Write failures are
/// swallowed: the event log must never take a run down.
pub struct JsonlFileSink {
    path: PathBuf,
}

impl JsonlFileSink {
    pub fn new(path: &Path) -> JsonlFileSink {
        JsonlFileSink {
            path: path.to_path_buf(),
        }
    }
}

impl EventSink for JsonlFileSink {
    fn emit(&mut self, event: &StreamEvent) {
        let record = EventRecord {
            schema_version: EVENT_SCHEMA_VERSION,
            ts: now_rfc3339(),
            event,
        };
        let Ok(line) = serde_json::to_string(&record) else {
            return;
        };
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            let _ = writeln!(file, "{}", line);
        }
    }
}

/// Fans events out to several sinks in order.
pub struct MultiSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn EventSink>>) -> MultiSink {
        MultiSink { sinks }
    }
}

impl EventSink for MultiSink {
    fn emit(&mut self, event: &StreamEvent) {
        for sink in &mut self.sinks {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn jsonl_sink_appends_tagged_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut sink = JsonlFileSink::new(&path);
        sink.emit(&StreamEvent::SessionStart);
        sink.emit(&StreamEvent::AssistantText {
            text: "hello".to_string(),
        });
        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["schema_version"], json!(EVENT_SCHEMA_VERSION));
        assert_eq!(first["event"], json!("session_start"));
        assert!(first["ts"].as_str().unwrap().contains('T'));
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], json!("assistant_text"));
        assert_eq!(second["text"], json!("hello"));
    }

    #[test]
    fn multi_sink_fans_out_in_order() {
        struct Counter(std::sync::Arc<std::sync::atomic::AtomicU32>);
        impl EventSink for Counter {
            fn emit(&mut self, _event: &StreamEvent) {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }
        let count = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let mut multi = MultiSink::new(vec![
            Box::new(Counter(count.clone())),
            Box::new(Counter(count.clone())),
        ]);
        multi.emit(&StreamEvent::SessionStart);
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn timestamps_are_rfc3339() {
        let ts = now_rfc3339();
        assert!(ts.ends_with('Z'), "{ts}");
        assert_eq!(&ts[4..5], "-");
    }
}
