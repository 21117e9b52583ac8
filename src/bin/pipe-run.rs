//! CLI tool to run pipeline (.pipe) files.

use clap::Parser;
use shell_pipes::stages::CATALOG;
use shell_pipes::{PipelineError, run_pipeline};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

/// Run a pipeline file, reading `stdin` stages from an input file.
#[derive(Parser)]
#[command(name = "pipe-run")]
struct Cli {
    /// Pipeline definition file (.pipe)
    #[arg(required_unless_present = "list")]
    pipeline: Option<String>,

    /// Input for `stdin` stages (default: standard input)
    input: Option<String>,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Log stage activity and the output count on stderr
    #[arg(short, long)]
    verbose: bool,

    /// List available stages and exit
    #[arg(long)]
    list: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "shell_pipes=debug,pipe_run=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn print_catalog() {
    for info in CATALOG {
        println!("{:<10} {:<13} {}", info.name, info.kind, info.usage);
    }
}

fn fail(error: &PipelineError) -> ! {
    eprintln!("error[{}]: {error}", error.kind());
    process::exit(1);
}

fn open_output(path: &str) -> io::Result<Box<dyn Write>> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(Box::new(BufWriter::new(File::create(path)?)))
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.list {
        print_catalog();
        return;
    }
    let Some(pipe_file) = cli.pipeline.as_deref() else {
        eprintln!("Error: no pipeline file given");
        process::exit(2);
    };

    let pipeline_text = match fs::read_to_string(pipe_file) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading pipeline file '{pipe_file}': {e}");
            process::exit(1);
        }
    };

    let mut output: Box<dyn Write> = match &cli.output {
        Some(path) => match open_output(path) {
            Ok(writer) => writer,
            Err(e) => {
                eprintln!("Error opening output file '{path}': {e}");
                process::exit(1);
            }
        },
        None => Box::new(io::stdout().lock()),
    };

    tracing::debug!(
        pipeline = pipe_file,
        input = cli.input.as_deref().unwrap_or("(stdin)"),
        output = cli.output.as_deref().unwrap_or("(stdout)"),
        "starting"
    );

    let result = match &cli.input {
        Some(path) => match File::open(path) {
            Ok(file) => run_pipeline(&pipeline_text, BufReader::new(file), &mut output),
            Err(e) => {
                eprintln!("Error reading input file '{path}': {e}");
                process::exit(1);
            }
        },
        None => run_pipeline(&pipeline_text, BufReader::new(io::stdin()), &mut output),
    };

    match result {
        Ok(count) => tracing::info!(output_count = count, "done"),
        Err(e) => {
            // Keep whatever was produced before the failure.
            let _ = output.flush();
            fail(&e);
        }
    }
}
