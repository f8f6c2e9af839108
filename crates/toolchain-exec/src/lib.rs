//! # toolchain-exec
//!
//! Subprocess execution for language toolchains and container CLIs.
//!
//! Every external tool the orchestrator touches (npm, mvn, dotnet, docker,
//! kubectl, ...) is invoked through the [`ToolRunner`] trait so that callers
//! can stream output line-by-line, propagate cancellation into the child
//! process, and substitute a recording fake in tests.
//!
//! ## Example
//!
//! ```rust,no_run
//! use toolchain_exec::{CancelToken, LocalRunner, ToolCommand, ToolRunner};
//!
//! # async fn example() -> toolchain_exec::Result<()> {
//! let runner = LocalRunner::new();
//! let mut cmd = ToolCommand::new("npm");
//! cmd.arg("install").current_dir("./src/api");
//!
//! let output = runner.run(cmd, &CancelToken::none(), None).await?;
//! assert!(output.success());
//! # Ok(())
//! # }
//! ```

mod cancel;
mod command;
mod error;
mod event;
mod process;
mod runner;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use cancel::{CancelSource, CancelToken, cancel_pair};
pub use command::ToolCommand;
pub use error::{Error, Result};
pub use event::{ToolEvent, ToolEventKind};
pub use process::ExitStatus;
pub use runner::{EventSink, LocalRunner, ToolOutput, ToolRunner};
