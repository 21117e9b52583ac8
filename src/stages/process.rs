//! External-process stages.
//!
//! `sh` feeds every upstream line to the child's stdin, closes it, then
//! yields the child's stdout line by line. `run` does the same with no
//! input. Once stdout ends the child is always waited for; with
//! `check_success` a non-zero exit becomes [`PipelineError::CommandFailed`]
//! after the last output line. A child still running when its stream is
//! dropped is killed and reaped.
//!
//! Stdin is written in full before stdout is read, on the pulling thread.
//! A child that fills its stdout pipe before draining stdin will block.

use std::io::{BufReader, Write};
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::debug;

use super::Lines;
use crate::error::{PipelineError, Result};
use crate::stage::{Deferred, Source, Transform};
use crate::stream::Stream;

/// A command given either as one shell-quoted string or as explicit
/// arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    Line(String),
    Args(Vec<String>),
}

impl From<&str> for CommandLine {
    fn from(line: &str) -> Self {
        CommandLine::Line(line.to_string())
    }
}

impl From<String> for CommandLine {
    fn from(line: String) -> Self {
        CommandLine::Line(line)
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(args: Vec<String>) -> Self {
        CommandLine::Args(args)
    }
}

impl From<&[&str]> for CommandLine {
    fn from(args: &[&str]) -> Self {
        CommandLine::Args(args.iter().map(|a| a.to_string()).collect())
    }
}

/// Parameters of [`sh`] and [`run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShParams {
    stage: &'static str,
    argv: Vec<String>,
    check_success: bool,
}

impl ShParams {
    fn parse(stage: &'static str, command: CommandLine) -> Result<Self> {
        let argv = match command {
            CommandLine::Args(args) => args,
            CommandLine::Line(line) => shlex::split(&line).ok_or_else(|| {
                PipelineError::configuration(stage, format!("unbalanced quoting in {line:?}"))
            })?,
        };
        if argv.is_empty() {
            return Err(PipelineError::configuration(stage, "empty command"));
        }
        Ok(ShParams {
            stage,
            argv,
            check_success: false,
        })
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Kills and reaps the child unless it was already waited for.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            debug!(pid = self.child.id(), "killing abandoned child");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

struct ProcessOutput {
    guard: ChildGuard,
    lines: Lines<BufReader<ChildStdout>>,
    params: ShParams,
    finished: bool,
}

impl ProcessOutput {
    fn finish(&mut self) -> Option<Result<String>> {
        self.finished = true;
        let status = match self.guard.child.wait() {
            Ok(status) => status,
            Err(e) => return Some(Err(PipelineError::io(self.params.stage, e))),
        };
        self.guard.reaped = true;
        debug!(command = %self.params.display(), %status, "command exited");
        if self.params.check_success && !status.success() {
            return Some(Err(PipelineError::CommandFailed {
                stage: self.params.stage.to_string(),
                command: self.params.display(),
                status,
            }));
        }
        None
    }
}

impl Iterator for ProcessOutput {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.lines.next() {
            Some(line) => Some(line),
            None => self.finish(),
        }
    }
}

fn spawn(params: ShParams, input: Stream<String>) -> Result<ProcessOutput> {
    let stage = params.stage;
    let command = params.display();
    let mut child = Command::new(&params.argv[0])
        .args(&params.argv[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| PipelineError::resource(stage, format!("spawn {command:?}"), e))?;
    debug!(%command, pid = child.id(), "spawned");

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let guard = ChildGuard {
        child,
        reaped: false,
    };

    if let Some(mut stdin) = stdin {
        for line in input {
            let line = line?;
            stdin
                .write_all(line.as_bytes())
                .map_err(|e| PipelineError::io(stage, e))?;
            // Each item is one line of the child's input.
            if !line.ends_with('\n') {
                stdin
                    .write_all(b"\n")
                    .map_err(|e| PipelineError::io(stage, e))?;
            }
        }
        // stdin closes here so the child sees end of input.
    }

    let stdout =
        stdout.ok_or_else(|| PipelineError::runtime(stage, "child stdout not captured"))?;
    Ok(ProcessOutput {
        guard,
        lines: Lines::new(BufReader::new(stdout), stage),
        params,
        finished: false,
    })
}

fn sh_body(upstream: Stream<String>, params: ShParams) -> Stream<String> {
    // The child starts on the first pull, not when the chain is built.
    Stream::lazy(move || spawn(params, upstream))
}

const SH: Transform<ShParams, String, String> = Transform::new("sh", sh_body);

/// Pipe upstream lines through an external command.
///
/// `command` is split with POSIX shell quoting when given as a string.
/// Bad quoting or an empty command is rejected here.
pub fn sh(command: impl Into<CommandLine>) -> Result<Deferred<ShParams, String, String>> {
    Ok(SH.defer(ShParams::parse("sh", command.into())?))
}

impl Deferred<ShParams, String, String> {
    /// Fail with `CommandFailed` if the command exits non-zero.
    pub fn check_success(mut self) -> Self {
        self.params_mut().check_success = true;
        self
    }
}

fn run_body(params: ShParams) -> Result<Stream<String>> {
    Ok(SH.apply(Stream::empty(), params).named("run"))
}

const RUN: Source<ShParams, String> = Source::new("run", run_body);

/// Run a command with no input and yield its output lines.
pub fn run(command: impl Into<CommandLine>) -> Result<Stream<String>> {
    RUN.open(ShParams::parse("run", command.into())?)
}

/// Like [`run`], failing with `CommandFailed` on a non-zero exit.
pub fn run_checked(command: impl Into<CommandLine>) -> Result<Stream<String>> {
    let mut params = ShParams::parse("run", command.into())?;
    params.check_success = true;
    RUN.open(params)
}
