//! The stage library.
//!
//! Sources open a [`Stream`] directly. Transforms return a
//! [`Deferred`](crate::stage::Deferred) that goes on the right of `|`.
//! Constructors that validate their parameters (patterns, commands,
//! delimiters) return `Result` so bad configuration is reported before
//! anything runs.

use std::io::BufRead;

use crate::error::{PipelineError, Result};
use crate::stage::StageInfo;
use crate::stream::Stream;

mod flow;
mod process;
mod source;
mod text;

pub use flow::{Printer, filter, head, map, pretty_print, pretty_print_to, tail};
pub use process::{CommandLine, ShParams, run, run_checked, sh};
pub use source::{cat, curl, dir_file, echo, expand};
pub use text::{
    CutParams, Fields, SedParams, cut, cut_field, dos2unix, grep, grep_in, join, sed, unix2dos,
};

/// Every stage reachable by name, with its declared shape.
pub const CATALOG: &[StageInfo] = &[
    StageInfo::source("stdin", "stdin"),
    StageInfo::source("cat", "cat PATH"),
    StageInfo::source("curl", "curl URL"),
    StageInfo::source("echo", "echo TEXT..."),
    StageInfo::source("expand", "expand PATTERN..."),
    StageInfo::source("run", "run [--check] COMMAND [ARG...]"),
    StageInfo::transform("head", "head [N]"),
    StageInfo::transform("tail", "tail [N]"),
    StageInfo::transform("grep", "grep PATTERN"),
    StageInfo::transform("grep_in", "grep_in TEXT..."),
    StageInfo::transform("sed", "sed PATTERN REPLACEMENT [--exclusive]"),
    StageInfo::transform("cut", "cut [-d DELIM] [-f N[,N...]]"),
    StageInfo::transform("join", "join [DELIM]"),
    StageInfo::transform("dos2unix", "dos2unix"),
    StageInfo::transform("unix2dos", "unix2dos"),
    StageInfo::transform("dir_file", "dir_file"),
    StageInfo::transform("pretty_print", "pretty_print"),
    StageInfo::transform("sh", "sh [--check] COMMAND [ARG...]"),
];

/// Look up a stage by name.
pub fn lookup(name: &str) -> Option<&'static StageInfo> {
    CATALOG.iter().find(|info| info.name == name)
}

/// Newline-preserving line reader over any buffered input.
///
/// Owns the reader, so dropping it closes the underlying handle.
pub(crate) struct Lines<R> {
    reader: R,
    stage: &'static str,
}

impl<R: BufRead> Lines<R> {
    pub(crate) fn new(reader: R, stage: &'static str) -> Self {
        Lines { reader, stage }
    }
}

impl<R: BufRead> Iterator for Lines<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(Ok(line)),
            Err(e) => Some(Err(PipelineError::io(self.stage, e))),
        }
    }
}

/// Stream the lines of any buffered reader.
pub fn read_lines<R>(reader: R) -> Stream<String>
where
    R: BufRead + 'static,
{
    Stream::from_results(Lines::new(reader, "stdin")).named("stdin")
}
