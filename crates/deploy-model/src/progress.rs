//! Streaming progress messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One progress item published by a plug-in during a phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressMessage {
    /// Human-readable progress text
    pub message: String,
    /// When the item was emitted
    pub timestamp: DateTime<Utc>,
}

impl ProgressMessage {
    /// Create a progress message stamped now
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Sink for progress messages; unbounded so publishers never block
pub type ProgressSink = async_channel::Sender<ProgressMessage>;

/// Create an unbounded progress channel
pub fn progress_channel() -> (ProgressSink, async_channel::Receiver<ProgressMessage>) {
    async_channel::unbounded()
}

/// Publish one progress item, ignoring a dropped receiver
pub async fn report(sink: &ProgressSink, message: impl Into<String>) {
    let _ = sink.send(ProgressMessage::new(message)).await;
}
