//! Error types for toolchain execution

use thiserror::Error;

/// Unified error type for tool invocation
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn a process
    #[error("failed to spawn process: {reason}")]
    SpawnFailed {
        /// The reason for the spawn failure
        reason: String,
    },

    /// The tool binary was not found on the PATH
    #[error("required tool not found: {tool}")]
    ToolNotFound {
        /// The tool that was not found
        tool: String,
    },

    /// The tool exited with a non-zero status
    #[error("{tool} exited with code {code}: {stderr}")]
    NonZeroExit {
        /// The tool that failed
        tool: String,
        /// The exit code (or -1 when killed by signal)
        code: i32,
        /// Captured standard error output
        stderr: String,
    },

    /// Failed to send a signal to the process
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// The invocation was cancelled by the caller
    #[error("tool invocation cancelled")]
    Cancelled,

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Nix error (Unix signal handling)
    #[cfg(unix)]
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Create a tool not found error
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
