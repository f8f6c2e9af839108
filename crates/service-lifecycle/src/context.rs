//! Operation context threaded through plug-in invocations

use crate::environment::EnvironmentManager;
use deploy_model::{ProgressSink, report};
use std::sync::Arc;
use toolchain_exec::{CancelToken, ToolCommand, ToolOutput, ToolRunner};

/// Runtime dependencies handed to every plug-in phase invocation.
///
/// Carries the tool runner for subprocess execution, the project environment
/// for expandable-string resolution and persisted state, and the caller's
/// cancellation token.
#[derive(Clone)]
pub struct OperationContext {
    /// Runner for language toolchains and container CLIs
    pub runner: Arc<dyn ToolRunner>,
    /// Project-scoped environment store
    pub environment: EnvironmentManager,
    /// Cooperative cancellation from the caller's request context
    pub cancel: CancelToken,
}

impl OperationContext {
    /// Create a context for one operation
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        environment: EnvironmentManager,
        cancel: CancelToken,
    ) -> Self {
        Self {
            runner,
            environment,
            cancel,
        }
    }

    /// Lookup function for resolving expandable strings: environment values
    /// first, process environment as fallback
    pub fn resolver(&self) -> impl Fn(&str) -> Option<String> + '_ {
        let snapshot = self.environment.snapshot();
        move |name: &str| {
            snapshot
                .get(name)
                .cloned()
                .or_else(|| std::env::var(name).ok())
        }
    }

    /// Run a tool, forwarding its output lines to the progress sink as they
    /// arrive. A non-zero exit fails with the captured stderr.
    pub async fn run_streaming(
        &self,
        command: ToolCommand,
        progress: &ProgressSink,
    ) -> crate::Result<ToolOutput> {
        let (events, event_rx) = async_channel::unbounded();

        let run = async move {
            let output = self
                .runner
                .run_checked(command, &self.cancel, Some(&events))
                .await;
            // Dropping the sender ends the forwarding loop below.
            drop(events);
            output
        };

        let forward = async {
            while let Ok(event) = event_rx.recv().await {
                if let Some(line) = event.data {
                    report(progress, line).await;
                }
            }
        };

        let (output, ()) = futures::join!(run, forward);
        Ok(output?)
    }
}
