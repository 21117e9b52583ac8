//! Parser and runner for pipelines written as text.
//!
//! Pipeline format:
//! ```text
//! # comment lines start with '#'
//! stdin
//! | grep '^ca'
//! | sed '^ca' fu --exclusive
//! | head 5
//! ```
//!
//! - Words are split with POSIX shell quoting; newlines are whitespace
//! - A bare `|` word separates stages
//! - The first stage must be a source; every later stage must be a transform
//!
//! Supported stages:
//! - `stdin` - Lines of the runner's input
//! - `cat PATH` - Lines of a file
//! - `curl URL` - Lines of a fetched document
//! - `echo TEXT...` - One line made of the words
//! - `expand PATTERN...` - Files matching `dir/glob`, recursively
//! - `run [--check] COMMAND [ARG...]` - Output lines of a command
//! - `head [N]` / `tail [N]` - First or last N items (all when omitted)
//! - `grep PATTERN` - Items matching a regex
//! - `grep_in TEXT...` - Items containing any of the words
//! - `sed PATTERN REPLACEMENT [--exclusive]` - Replace the first match
//! - `cut [-d DELIM] [-f N[,N...]]` - Split into fields (zero-based indices)
//! - `join [DELIM]` - Join fields back into text
//! - `dos2unix` / `unix2dos` - Convert line endings
//! - `dir_file` - Split a path into directory and file name
//! - `pretty_print` - Print a debug rendering to stdout and pass through
//! - `sh [--check] COMMAND [ARG...]` - Pipe items through a command

use std::io::{BufRead, Cursor, Write};

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::stage::StageKind;
use crate::stages::{
    Fields, cat, curl, cut, cut_field, dir_file, dos2unix, echo, expand, grep, grep_in, head,
    join, lookup, pretty_print, read_lines, run, run_checked, sed, sh, tail, unix2dos,
};
use crate::stream::Stream;
use crate::value::Value;

/// Parsed pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// stdin
    Stdin,
    /// cat PATH
    Cat { path: String },
    /// curl URL
    Curl { url: String },
    /// echo TEXT...
    Echo { text: String },
    /// expand PATTERN...
    Expand { patterns: Vec<String> },
    /// run [--check] COMMAND [ARG...]
    Run { argv: Vec<String>, check: bool },
    /// head [N]
    Head { n: Option<usize> },
    /// tail [N]
    Tail { n: Option<usize> },
    /// grep PATTERN
    Grep { pattern: String },
    /// grep_in TEXT...
    GrepIn { needles: Vec<String> },
    /// sed PATTERN REPLACEMENT [--exclusive]
    Sed {
        pattern: String,
        replacement: String,
        exclusive: bool,
    },
    /// cut [-d DELIM] [-f N[,N...]]
    Cut {
        delimiter: Option<String>,
        /// `None` keeps every field.
        fields: Option<Vec<usize>>,
    },
    /// join [DELIM]
    Join { delimiter: String },
    Dos2Unix,
    Unix2Dos,
    DirFile,
    PrettyPrint,
    /// sh [--check] COMMAND [ARG...]
    Sh { argv: Vec<String>, check: bool },
}

impl Command {
    /// Get the stage name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Stdin => "stdin",
            Command::Cat { .. } => "cat",
            Command::Curl { .. } => "curl",
            Command::Echo { .. } => "echo",
            Command::Expand { .. } => "expand",
            Command::Run { .. } => "run",
            Command::Head { .. } => "head",
            Command::Tail { .. } => "tail",
            Command::Grep { .. } => "grep",
            Command::GrepIn { .. } => "grep_in",
            Command::Sed { .. } => "sed",
            Command::Cut { .. } => "cut",
            Command::Join { .. } => "join",
            Command::Dos2Unix => "dos2unix",
            Command::Unix2Dos => "unix2dos",
            Command::DirFile => "dir_file",
            Command::PrettyPrint => "pretty_print",
            Command::Sh { .. } => "sh",
        }
    }

    /// The declared kind, as listed in the stage catalog.
    pub fn kind(&self) -> StageKind {
        lookup(self.name()).map_or(StageKind::Transform, |info| info.kind)
    }

    /// Can this stage start a pipeline?
    pub fn can_be_first(&self) -> bool {
        self.kind().can_be_first()
    }
}

/// Parse pipeline text into commands.
///
/// An input with no stages parses to an empty list; [`build_pipeline`]
/// rejects it.
pub fn parse_commands(text: &str) -> Result<Vec<Command>> {
    let body: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect();
    let words = shlex::split(&body.join("\n"))
        .ok_or_else(|| PipelineError::composition("unbalanced quoting in pipeline text"))?;
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = vec![Vec::new()];
    for word in words {
        if word == "|" {
            segments.push(Vec::new());
        } else if let Some(current) = segments.last_mut() {
            current.push(word);
        }
    }

    segments
        .iter()
        .enumerate()
        .map(|(index, words)| {
            if words.is_empty() {
                return Err(PipelineError::composition(format!(
                    "stage {} is empty",
                    index + 1
                )));
            }
            parse_command(words)
        })
        .collect()
}

/// Parse one stage's words.
fn parse_command(words: &[String]) -> Result<Command> {
    let (name, args) = match words.split_first() {
        Some(split) => split,
        None => return Err(PipelineError::composition("empty stage")),
    };

    match name.as_str() {
        "stdin" => no_args("stdin", args).map(|_| Command::Stdin),
        "cat" => Ok(Command::Cat {
            path: one_arg("cat", args)?,
        }),
        "curl" => Ok(Command::Curl {
            url: one_arg("curl", args)?,
        }),
        "echo" => Ok(Command::Echo {
            text: format!("{}\n", args.join(" ")),
        }),
        "expand" => Ok(Command::Expand {
            patterns: args.to_vec(),
        }),
        "run" => {
            let (argv, check) = parse_command_line("run", args)?;
            Ok(Command::Run { argv, check })
        }
        "sh" => {
            let (argv, check) = parse_command_line("sh", args)?;
            Ok(Command::Sh { argv, check })
        }
        "head" => Ok(Command::Head {
            n: optional_count("head", args)?,
        }),
        "tail" => Ok(Command::Tail {
            n: optional_count("tail", args)?,
        }),
        "grep" => Ok(Command::Grep {
            pattern: one_arg("grep", args)?,
        }),
        "grep_in" => Ok(Command::GrepIn {
            needles: args.to_vec(),
        }),
        "sed" => parse_sed(args),
        "cut" => parse_cut(args),
        "join" => match args {
            [] => Ok(Command::Join {
                delimiter: " ".to_string(),
            }),
            [delimiter] => Ok(Command::Join {
                delimiter: delimiter.clone(),
            }),
            _ => Err(usage_error("join", args)),
        },
        "dos2unix" => no_args("dos2unix", args).map(|_| Command::Dos2Unix),
        "unix2dos" => no_args("unix2dos", args).map(|_| Command::Unix2Dos),
        "dir_file" => no_args("dir_file", args).map(|_| Command::DirFile),
        "pretty_print" => no_args("pretty_print", args).map(|_| Command::PrettyPrint),
        other => Err(PipelineError::composition(format!("unknown stage `{other}`"))),
    }
}

fn usage_error(stage: &str, args: &[String]) -> PipelineError {
    let usage = lookup(stage).map_or(stage, |info| info.usage);
    PipelineError::configuration(stage, format!("bad arguments {args:?} (usage: {usage})"))
}

fn no_args(stage: &str, args: &[String]) -> Result<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(usage_error(stage, args))
    }
}

fn one_arg(stage: &str, args: &[String]) -> Result<String> {
    match args {
        [arg] => Ok(arg.clone()),
        _ => Err(usage_error(stage, args)),
    }
}

fn parse_count(stage: &str, word: &str) -> Result<usize> {
    word.parse()
        .map_err(|_| PipelineError::configuration(stage, format!("expected a count, got {word:?}")))
}

fn optional_count(stage: &str, args: &[String]) -> Result<Option<usize>> {
    match args {
        [] => Ok(None),
        [n] => parse_count(stage, n).map(Some),
        _ => Err(usage_error(stage, args)),
    }
}

fn parse_command_line(stage: &str, args: &[String]) -> Result<(Vec<String>, bool)> {
    match args.split_first() {
        Some((flag, rest)) if flag == "--check" || flag == "-c" => {
            if rest.is_empty() {
                return Err(usage_error(stage, args));
            }
            Ok((rest.to_vec(), true))
        }
        Some(_) => Ok((args.to_vec(), false)),
        None => Err(usage_error(stage, args)),
    }
}

fn parse_sed(args: &[String]) -> Result<Command> {
    let (exclusive, rest): (Vec<_>, Vec<_>) = args
        .iter()
        .partition(|arg| *arg == "--exclusive" || *arg == "-x");
    match rest.as_slice() {
        [pattern, replacement] => Ok(Command::Sed {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
            exclusive: !exclusive.is_empty(),
        }),
        _ => Err(usage_error("sed", args)),
    }
}

fn parse_cut(args: &[String]) -> Result<Command> {
    let mut delimiter = None;
    let mut fields = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-d" => delimiter = Some(iter.next().ok_or_else(|| usage_error("cut", args))?.clone()),
            "-f" => {
                let list = iter.next().ok_or_else(|| usage_error("cut", args))?;
                let indices = list
                    .split(',')
                    .map(|n| parse_count("cut", n.trim()))
                    .collect::<Result<Vec<_>>>()?;
                fields = Some(indices);
            }
            _ => return Err(usage_error("cut", args)),
        }
    }
    Ok(Command::Cut { delimiter, fields })
}

/// Check stage kinds against their positions.
pub fn validate(commands: &[Command]) -> Result<()> {
    let first = match commands.first() {
        Some(first) => first,
        None => return Err(PipelineError::composition("pipeline is empty")),
    };
    if !first.can_be_first() {
        let hint = match first {
            Command::Sh { .. } => "try `run`",
            _ => "try stdin, cat, echo or run",
        };
        return Err(PipelineError::composition(format!(
            "`{}` cannot be the first stage ({hint})",
            first.name()
        )));
    }
    for (index, cmd) in commands.iter().enumerate().skip(1) {
        if cmd.kind() == StageKind::Source {
            return Err(PipelineError::composition(format!(
                "`{}` is a source and cannot follow `|` (stage {})",
                cmd.name(),
                index + 1
            )));
        }
    }
    Ok(())
}

type Binder = Box<dyn FnOnce(Stream<Value>) -> Stream<Value>>;

/// Text items for a text-only stage.
fn texts(upstream: Stream<Value>, stage: &'static str) -> Stream<String> {
    upstream.try_map(move |value| value.into_text(stage))
}

/// Text items with their line ending removed.
fn bare_lines(upstream: Stream<Value>, stage: &'static str) -> Stream<String> {
    upstream.try_map(move |value| {
        let text = value.into_text(stage)?;
        Ok(text.trim_end_matches(['\r', '\n']).to_string())
    })
}

/// Build the stage that binds `cmd` to an upstream.
///
/// Parameters are validated here, before any source is opened.
fn binder(cmd: &Command) -> Result<Binder> {
    let bind: Binder = match cmd {
        Command::Head { n } => {
            let stage = head(*n);
            Box::new(move |up: Stream<Value>| up | stage)
        }
        Command::Tail { n } => {
            let stage = tail(*n);
            Box::new(move |up: Stream<Value>| up | stage)
        }
        Command::Grep { pattern } => {
            let stage = grep(pattern)?;
            Box::new(move |up: Stream<Value>| (texts(up, "grep") | stage).map_ok(Value::Text))
        }
        Command::GrepIn { needles } => {
            let stage = grep_in(needles.clone());
            Box::new(move |up: Stream<Value>| (texts(up, "grep_in") | stage).map_ok(Value::Text))
        }
        Command::Sed {
            pattern,
            replacement,
            exclusive,
        } => {
            let mut stage = sed(pattern, replacement)?;
            if *exclusive {
                stage = stage.exclusive();
            }
            Box::new(move |up: Stream<Value>| (texts(up, "sed") | stage).map_ok(Value::Text))
        }
        Command::Cut {
            delimiter,
            fields: Some(indices),
        } if indices.len() == 1 => {
            let stage = cut_field(indices[0], delimiter.as_deref())?;
            Box::new(move |up: Stream<Value>| (bare_lines(up, "cut") | stage).map_ok(Value::Text))
        }
        Command::Cut { delimiter, fields } => {
            let fields = fields.clone().map_or(Fields::All, Fields::Pick);
            let stage = cut(fields, delimiter.as_deref())?;
            Box::new(move |up: Stream<Value>| (bare_lines(up, "cut") | stage).map_ok(Value::Fields))
        }
        Command::Join { delimiter } => {
            let stage = join(delimiter);
            Box::new(move |up: Stream<Value>| {
                (up.try_map(|value| value.into_fields("join")) | stage).map_ok(Value::Text)
            })
        }
        Command::Dos2Unix => {
            let stage = dos2unix();
            Box::new(move |up: Stream<Value>| (texts(up, "dos2unix") | stage).map_ok(Value::Text))
        }
        Command::Unix2Dos => {
            let stage = unix2dos();
            Box::new(move |up: Stream<Value>| (texts(up, "unix2dos") | stage).map_ok(Value::Text))
        }
        Command::DirFile => {
            let stage = dir_file();
            Box::new(move |up: Stream<Value>| {
                (bare_lines(up, "dir_file") | stage)
                    .map_ok(|(dir, name)| Value::Fields(vec![dir.display().to_string(), name]))
            })
        }
        Command::PrettyPrint => {
            let stage = pretty_print();
            Box::new(move |up: Stream<Value>| up | stage)
        }
        Command::Sh { argv, check } => {
            let mut stage = sh(argv.clone())?;
            if *check {
                stage = stage.check_success();
            }
            Box::new(move |up: Stream<Value>| (texts(up, "sh") | stage).map_ok(Value::Text))
        }
        source => {
            return Err(PipelineError::composition(format!(
                "`{}` is a source and cannot follow `|`",
                source.name()
            )));
        }
    };
    Ok(bind)
}

fn open_source<R: BufRead + 'static>(cmd: &Command, input: R) -> Result<Stream<Value>> {
    let stream = match cmd {
        Command::Stdin => read_lines(input).map_ok(Value::Text),
        Command::Cat { path } => cat(path)?.map_ok(Value::Text),
        Command::Curl { url } => curl(url)?.map_ok(Value::Text),
        Command::Echo { text } => echo(Value::Text(text.clone()))?,
        Command::Expand { patterns } => {
            expand(patterns.clone())?.map_ok(|path| Value::Text(path.display().to_string()))
        }
        Command::Run { argv, check: false } => run(argv.clone())?.map_ok(Value::Text),
        Command::Run { argv, check: true } => run_checked(argv.clone())?.map_ok(Value::Text),
        transform => {
            return Err(PipelineError::composition(format!(
                "`{}` cannot be the first stage",
                transform.name()
            )));
        }
    };
    Ok(stream)
}

/// Chain parsed commands into one stream, reading `stdin` from `input`.
///
/// Composition and parameters are checked before the source opens. Nothing
/// is pulled until the returned stream is iterated.
pub fn build_pipeline<R: BufRead + 'static>(
    commands: &[Command],
    input: R,
) -> Result<Stream<Value>> {
    validate(commands)?;
    let binders = commands[1..]
        .iter()
        .map(binder)
        .collect::<Result<Vec<_>>>()?;
    let source = open_source(&commands[0], input)?;
    debug!(stages = commands.len(), "pipeline built");
    Ok(binders.into_iter().fold(source, |stream, bind| bind(stream)))
}

/// Write one output item: text newline-terminated, fields as a list.
fn write_value<W: Write + ?Sized>(output: &mut W, value: &Value) -> std::io::Result<()> {
    match value {
        Value::Text(text) if text.ends_with('\n') => output.write_all(text.as_bytes()),
        other => writeln!(output, "{other}"),
    }
}

/// Run pipeline text, streaming each output item to `output`.
///
/// Returns the number of items written.
pub fn run_pipeline<R, W>(pipeline_text: &str, input: R, output: &mut W) -> Result<usize>
where
    R: BufRead + 'static,
    W: Write + ?Sized,
{
    let commands = parse_commands(pipeline_text)?;
    let stream = build_pipeline(&commands, input)?;
    let mut count = 0;
    for value in stream {
        write_value(output, &value?).map_err(|e| PipelineError::io("output", e))?;
        count += 1;
    }
    output.flush().map_err(|e| PipelineError::io("output", e))?;
    debug!(output_count = count, "pipeline finished");
    Ok(count)
}

/// Execute pipeline text on in-memory input.
///
/// Returns (output_text, output_count) on success.
pub fn execute_pipeline(input_text: &str, pipeline_text: &str) -> Result<(String, usize)> {
    let mut output = Vec::new();
    let count = run_pipeline(pipeline_text, Cursor::new(input_text.to_string()), &mut output)?;
    Ok((String::from_utf8_lossy(&output).into_owned(), count))
}
