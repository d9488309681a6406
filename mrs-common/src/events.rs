//! Event types for the MRS client
//!
//! Selection and upload progress are published on an [`EventBus`] so that a
//! front end (terminal, desktop shell, web bridge) can refresh its status
//! display without the selection core knowing anything about rendering.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Upload role a batch registry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadRole {
    /// Multi-patient mode: one directory tree per subject
    MultiFolder,
    /// Mono mode: primary (metabolite) signal
    MonoFid,
    /// Mono mode: water-reference signal
    MonoWater,
}

impl UploadRole {
    /// All roles, in the order the session stores them
    pub const ALL: [UploadRole; 3] = [
        UploadRole::MultiFolder,
        UploadRole::MonoFid,
        UploadRole::MonoWater,
    ];

    /// Multipart field name the processing endpoint expects for this role
    pub fn form_field(&self) -> &'static str {
        match self {
            UploadRole::MultiFolder => "directoryFiles",
            UploadRole::MonoFid => "dcmFiles",
            UploadRole::MonoWater => "waterDcmFiles",
        }
    }
}

impl fmt::Display for UploadRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadRole::MultiFolder => "multi-folder",
            UploadRole::MonoFid => "mono-fid",
            UploadRole::MonoWater => "mono-water",
        };
        f.write_str(name)
    }
}

/// MRS client event types
///
/// Events are broadcast via EventBus and can be serialized for forwarding
/// to an external UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MrsEvent {
    /// A role's registry changed (merge or folder add)
    SelectionChanged {
        /// Role whose registry changed
        role: UploadRole,
        /// Number of batches now held for the role
        batch_count: usize,
        /// Number of files across all batches
        total_files: usize,
        /// Rendered status summary (`"<label>: <n> .dcm"` lines + total)
        summary: String,
        /// When the change was committed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// All registries were cleared
    SelectionReset {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A request to the remote service is about to be sent
    UploadStarted {
        /// Endpoint path, e.g. `/run-processing`
        endpoint: String,
        /// Number of file parts in the body
        file_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Remote service accepted the request
    UploadCompleted {
        endpoint: String,
        /// Server-side working folder, `users/` prefix removed
        user_folder: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Request failed (network or remote error)
    UploadFailed {
        endpoint: String,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast channel for [`MrsEvent`]s
///
/// Cloning the bus shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MrsEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before slow receivers
    /// start losing the oldest ones.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<MrsEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: MrsEvent) -> Result<usize, broadcast::error::SendError<MrsEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MrsEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_fields_match_endpoint_contract() {
        assert_eq!(UploadRole::MultiFolder.form_field(), "directoryFiles");
        assert_eq!(UploadRole::MonoFid.form_field(), "dcmFiles");
        assert_eq!(UploadRole::MonoWater.form_field(), "waterDcmFiles");
    }

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        let result = bus.emit(MrsEvent::SelectionReset {
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());
        assert_eq!(bus.capacity(), 10);
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit_lossy(MrsEvent::SelectionChanged {
            role: UploadRole::MonoFid,
            batch_count: 1,
            total_files: 2,
            summary: "S14: 2 .dcm\nTotal: 2 .dcm".to_string(),
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            MrsEvent::SelectionChanged { role, total_files, .. } => {
                assert_eq!(role, UploadRole::MonoFid);
                assert_eq!(total_files, 2);
            }
            other => panic!("Expected SelectionChanged, got {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = MrsEvent::UploadFailed {
            endpoint: "/run-processing".to_string(),
            message: "boom".to_string(),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "UploadFailed");
        assert_eq!(json["endpoint"], "/run-processing");
    }
}
