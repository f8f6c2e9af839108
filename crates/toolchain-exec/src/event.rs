//! Raw events from a running tool invocation

use chrono::{DateTime, Utc};

/// A raw event from a tool process
#[derive(Debug, Clone)]
pub struct ToolEvent {
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The type of event
    pub kind: ToolEventKind,
    /// Optional data associated with the event (log line contents)
    pub data: Option<String>,
}

impl ToolEvent {
    /// Create a new event
    pub fn new(kind: ToolEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            data: None,
        }
    }

    /// Create a new event carrying a log line
    pub fn with_data(kind: ToolEventKind, data: String) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            data: Some(data),
        }
    }
}

/// Types of raw tool events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolEventKind {
    /// Process has started
    Started {
        /// Operating system process id
        pid: u32,
    },
    /// Process has exited
    Exited {
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Terminating signal, if any
        signal: Option<i32>,
    },
    /// Log line from stdout
    Stdout,
    /// Log line from stderr
    Stderr,
}
