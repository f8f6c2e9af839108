//! Recording fakes for exercising tool-driven code without real toolchains

use crate::{
    CancelToken, Error, Result, ToolCommand,
    process::ExitStatus,
    runner::{EventSink, ToolOutput, ToolRunner},
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

/// One recorded tool invocation
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// The program that was invoked
    pub program: String,
    /// The arguments it was given
    pub args: Vec<String>,
    /// The working directory, if one was set
    pub cwd: Option<PathBuf>,
    /// Environment variables that were set
    pub env: HashMap<String, String>,
}

/// A [`ToolRunner`] that records every invocation instead of spawning
///
/// By default every command succeeds with empty output. Individual programs
/// can be scripted to produce output, fail, or appear missing.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<RecordedCall>>,
    scripted: Mutex<HashMap<String, ScriptedResult>>,
    missing: Mutex<HashSet<String>>,
}

#[derive(Debug, Clone)]
struct ScriptedResult {
    code: i32,
    stdout: String,
    stderr: String,
}

impl RecordingRunner {
    /// Create a runner where every command succeeds with empty output
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the given program to succeed with the given stdout
    pub fn respond(&self, program: &str, stdout: &str) {
        self.scripted.lock().unwrap().insert(
            program.to_string(),
            ScriptedResult {
                code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
    }

    /// Script the given program to exit non-zero with the given stderr
    pub fn fail(&self, program: &str, code: i32, stderr: &str) {
        self.scripted.lock().unwrap().insert(
            program.to_string(),
            ScriptedResult {
                code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        );
    }

    /// Make the given tool appear absent from the PATH
    pub fn without_tool(&self, program: &str) {
        self.missing.lock().unwrap().insert(program.to_string());
    }

    /// All invocations recorded so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of invocations recorded so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Invocations of one program only
    pub fn calls_of(&self, program: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }
}

#[async_trait]
impl ToolRunner for RecordingRunner {
    async fn run(
        &self,
        command: ToolCommand,
        cancel: &CancelToken,
        _events: Option<&EventSink>,
    ) -> Result<ToolOutput> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let program = command.get_program().to_string_lossy().into_owned();
        if self.missing.lock().unwrap().contains(&program) {
            return Err(Error::tool_not_found(program));
        }

        self.calls.lock().unwrap().push(RecordedCall {
            program: program.clone(),
            args: command.args_lossy(),
            cwd: command.get_current_dir().map(|p| p.to_path_buf()),
            env: command
                .get_envs()
                .iter()
                .map(|(k, v)| {
                    (
                        k.to_string_lossy().into_owned(),
                        v.to_string_lossy().into_owned(),
                    )
                })
                .collect(),
        });

        let scripted = self.scripted.lock().unwrap().get(&program).cloned();
        let result = scripted.unwrap_or(ScriptedResult {
            code: 0,
            stdout: String::new(),
            stderr: String::new(),
        });

        Ok(ToolOutput {
            status: ExitStatus {
                code: Some(result.code),
                signal: None,
            },
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }

    fn has_tool(&self, program: &str) -> bool {
        !self.missing.lock().unwrap().contains(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[smol_potat::test]
    async fn test_recording_and_scripting() {
        let runner = RecordingRunner::new();
        runner.respond("npm", "added 12 packages");
        runner.fail("mvn", 1, "BUILD FAILURE");

        let mut npm = ToolCommand::new("npm");
        npm.args(["install", "--prefer-offline"]).current_dir("/svc");
        let output = runner.run(npm, &CancelToken::none(), None).await.unwrap();
        assert_eq!(output.stdout, "added 12 packages");

        let mvn = ToolCommand::new("mvn");
        let err = runner
            .run_checked(mvn, &CancelToken::none(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NonZeroExit { code: 1, .. }));

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, "npm");
        assert_eq!(calls[0].args, vec!["install", "--prefer-offline"]);
        assert_eq!(calls[0].cwd.as_deref(), Some(std::path::Path::new("/svc")));
    }

    #[smol_potat::test]
    async fn test_missing_tool() {
        let runner = RecordingRunner::new();
        runner.without_tool("docker");

        assert!(!runner.has_tool("docker"));
        let err = runner
            .run(ToolCommand::new("docker"), &CancelToken::none(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
        assert_eq!(runner.call_count(), 0);
    }
}
