//! Exit status capture and child process signalling

/// Exit status of a finished tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Terminating signal, if any (Unix only)
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Whether the process exited with code zero
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The exit code, substituting -1 for signal termination
    pub fn code_or_signal(&self) -> i32 {
        self.code.unwrap_or(-1)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
            #[cfg(not(unix))]
            signal: None,
        }
    }
}

/// Send SIGTERM to a process by pid (best-effort termination)
#[cfg(unix)]
pub(crate) fn terminate_pid(pid: u32) -> crate::Result<()> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| crate::Error::signal_failed(15, e.to_string()))
}

#[cfg(not(unix))]
pub(crate) fn terminate_pid(_pid: u32) -> crate::Result<()> {
    // No SIGTERM equivalent; the caller falls back to kill().
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_requires_zero_code() {
        let ok = ExitStatus {
            code: Some(0),
            signal: None,
        };
        let failed = ExitStatus {
            code: Some(2),
            signal: None,
        };
        let signalled = ExitStatus {
            code: None,
            signal: Some(9),
        };

        assert!(ok.success());
        assert!(!failed.success());
        assert!(!signalled.success());
        assert_eq!(signalled.code_or_signal(), -1);
    }
}
