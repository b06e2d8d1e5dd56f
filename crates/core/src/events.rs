//! Change events emitted by mutating filesystem operations.

use serde::Serialize;

use crate::inode::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
    Rename,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Modify => "modify",
            ChangeKind::Delete => "delete",
            ChangeKind::Rename => "rename",
        }
    }
}

impl Serialize for ChangeKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One mutation, as delivered to watchers.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub path: String,
    #[serde(rename = "oldPath", skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub timestamp: u64,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<String>) -> Self {
        ChangeEvent { kind, path: path.into(), old_path: None, timestamp: now_millis() }
    }

    pub fn renamed(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        ChangeEvent {
            kind: ChangeKind::Rename,
            path: new_path.into(),
            old_path: Some(old_path.into()),
            timestamp: now_millis(),
        }
    }
}

/// Receives events from the engine. Implementations must be cheap and
/// non-blocking; fan-out happens downstream.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ChangeEvent);
}

/// Discards everything. Default sink for engines without watchers.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ChangeEvent) {}
}

/// Collects events into a vector; test helper.
#[derive(Default)]
pub struct CollectingSink {
    pub events: std::sync::Mutex<Vec<ChangeEvent>>,
}

impl EventSink for CollectingSink {
    fn emit(&self, event: ChangeEvent) {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).push(event);
    }
}

impl CollectingSink {
    pub fn take(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_shape() {
        let ev = ChangeEvent::renamed("/a", "/b");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "rename");
        assert_eq!(json["path"], "/b");
        assert_eq!(json["oldPath"], "/a");
        assert!(json["timestamp"].is_u64());

        let ev = ChangeEvent::new(ChangeKind::Create, "/c");
        let json = serde_json::to_value(&ev).unwrap();
        assert!(json.get("oldPath").is_none());
    }
}
