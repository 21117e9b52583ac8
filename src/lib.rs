//! # shell-pipes
//!
//! Lazy, shell-style pipelines of composable stages.
//!
//! Stages are ordinary functions wrapped once as a *source* (no upstream) or
//! a *transform* (consumes an upstream). Transforms called with only their
//! parameters become deferred values that the `|` operator later binds to an
//! upstream stream, so pipelines read like a shell command line:
//!
//! ```
//! use shell_pipes::prelude::*;
//!
//! let words = Stream::from_items(vec!["cat", "dog", "cab"]);
//! let out = words | grep("^ca").unwrap() | head(Some(1));
//!
//! assert_eq!(out.collect_items().unwrap(), vec!["cat"]);
//! ```
//!
//! ## Overview
//!
//! - **Pull-based**: nothing runs until the final stream is iterated, and
//!   only as many items are produced as are consumed
//! - **Single-pass**: each [`Stream`] is consumed once, in order
//! - **Scoped resources**: files, connections and child processes close as
//!   soon as their stream ends, fails or is dropped
//! - **Text pipelines**: [`dsl`] parses and runs pipelines written as text,
//!   which is what the `pipe-run` binary uses

pub mod dsl;
pub mod error;
pub mod pipeline;
pub mod stage;
pub mod stages;
pub mod stream;
pub mod value;

pub use dsl::{Command, build_pipeline, execute_pipeline, parse_commands, run_pipeline};
pub use error::{ErrorKind, PipelineError, Result};
pub use stage::{Bind, Chained, Deferred, Source, StageInfo, StageKind, Transform, Yields};
pub use stream::{StageState, Stream};
pub use value::Value;

/// Everything needed to build pipelines in code.
pub mod prelude {
    pub use crate::error::{ErrorKind, PipelineError};
    pub use crate::stage::{Bind, Deferred, Source, Transform};
    pub use crate::stages::{
        CommandLine, Fields, cat, curl, cut, cut_field, dir_file, dos2unix, echo, expand, filter,
        grep, grep_in, head, join, map, pretty_print, pretty_print_to, read_lines, run,
        run_checked, sed, sh, tail, unix2dos,
    };
    pub use crate::stream::{StageState, Stream};
}
