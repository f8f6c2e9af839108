//! Host console bridging for extension output

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use toolchain_exec::{ToolEvent, ToolEventKind};
use tracing::debug;

/// Tees extension stdout/stderr into the host console while bridge calls are
/// outstanding.
///
/// The extension process runs for the whole session; its output is only
/// surfaced while a call is in flight and suppressed again on return.
#[derive(Debug, Clone, Default)]
pub struct ConsoleBridge {
    outstanding: Arc<AtomicUsize>,
}

impl ConsoleBridge {
    /// Create an inactive console bridge
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a call as outstanding until the guard drops
    pub fn guard(&self) -> ConsoleGuard {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        ConsoleGuard {
            outstanding: self.outstanding.clone(),
        }
    }

    /// Whether any call is currently outstanding
    pub fn is_active(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) > 0
    }

    /// Forward the extension process's output events to the host console.
    ///
    /// Runs until the event channel closes; spawned next to the bridge
    /// driver.
    pub async fn drive(self, events: async_channel::Receiver<ToolEvent>) {
        while let Ok(event) = events.recv().await {
            if !self.is_active() {
                continue;
            }
            let Some(line) = event.data else { continue };
            match event.kind {
                ToolEventKind::Stdout => {
                    let mut stdout = std::io::stdout();
                    let _ = writeln!(stdout, "{}", line);
                }
                ToolEventKind::Stderr => {
                    let mut stderr = std::io::stderr();
                    let _ = writeln!(stderr, "{}", line);
                }
                ToolEventKind::Started { pid } => {
                    debug!("Extension process started (pid {})", pid);
                }
                ToolEventKind::Exited { code, .. } => {
                    debug!("Extension process exited (code {:?})", code);
                }
            }
        }
    }
}

/// Guard marking one outstanding bridge call
#[derive(Debug)]
pub struct ConsoleGuard {
    outstanding: Arc<AtomicUsize>,
}

impl Drop for ConsoleGuard {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}
