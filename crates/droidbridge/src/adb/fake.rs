//! Scripted adb executor for tests.

use std::path::Path;
use std::sync::Mutex;

use super::{AdbExecutor, CommandOutput, LineStream};
use crate::error::Result;

#[derive(Debug)]
struct Rule {
    prefix: Vec<String>,
    output: CommandOutput,
}

/// Answers adb invocations from a list of prefix rules.
///
/// Rules are matched in registration order against the start of the
/// argument list. Unmatched calls fail with exit code 1. `pull` calls with
/// a matching rule write the rule's stdout to the local path so callers see
/// a real file. Streams replay the rule's stdout and then end.
#[derive(Debug, Default)]
pub(crate) struct FakeAdb {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeAdb {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Succeed with `stdout` for calls starting with `prefix`.
    pub(crate) fn on(&self, prefix: &[&str], stdout: &str) {
        self.push_rule(prefix, CommandOutput::success(stdout));
    }

    /// Fail with `code` and `stderr` for calls starting with `prefix`.
    pub(crate) fn fail(&self, prefix: &[&str], code: i32, stderr: &str) {
        self.push_rule(prefix, CommandOutput::failure(code, stderr));
    }

    /// Every invocation so far.
    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn lookup(&self, args: &[&str]) -> Option<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push(args.iter().map(ToString::to_string).collect());

        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|rule| {
                rule.prefix.len() <= args.len()
                    && rule.prefix.iter().zip(args).all(|(p, a)| p == a)
            })
            .map(|rule| rule.output.clone())
    }

    fn push_rule(&self, prefix: &[&str], output: CommandOutput) {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.iter().map(ToString::to_string).collect(),
            output,
        });
    }
}

#[async_trait::async_trait]
impl AdbExecutor for FakeAdb {
    async fn execute(&self, args: &[&str]) -> Result<CommandOutput> {
        let Some(output) = self.lookup(args) else {
            return Ok(CommandOutput::failure(1, format!("no rule for {args:?}")));
        };

        let pull_at = args.iter().position(|a| *a == "pull");
        if let (Some(i), true) = (pull_at, output.is_success()) {
            if let Some(local) = args.get(i + 2) {
                let local = Path::new(local);
                if let Some(parent) = local.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(local, &output.stdout)?;
            }
        }

        Ok(output)
    }

    async fn stream(&self, args: &[&str]) -> Result<LineStream> {
        let stdout = self.lookup(args).map(|o| o.stdout).unwrap_or_default();
        Ok(LineStream::from_reader(std::io::Cursor::new(stdout.into_bytes())))
    }
}
