use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

/// Stream block-alignment pre-processor for deduplicating storage backends.
#[derive(Parser)]
#[command(name = "blockalign", version, about = "Align a byte stream so unchanged content lands at the same output offset across runs")]
struct Cli {
    /// Restore (decode) a previously aligned stream back to its original bytes.
    #[arg(short = 'r', long = "restore")]
    restore: bool,

    /// Print a one-line block-statistics summary after a successful encode.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Suppress the verbose summary line even with --verbose.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Input file, or "-" for stdin. Restore mode does not accept stdin.
    input: PathBuf,

    /// Output file, or "-" for stdout.
    output: PathBuf,

    /// Sidecar fingerprint file. Required in encode mode; ignored in restore mode.
    hashfile: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if cli.restore {
        return run_restore(cli);
    }
    run_encode(cli)
}

fn run_restore(cli: Cli) -> anyhow::Result<ExitCode> {
    if is_stdio_marker(&cli.input) {
        tracing::error!("restore from stdin is not supported; provide a seekable file");
        return Ok(ExitCode::from(2));
    }

    let output: Box<dyn Write> = if is_stdio_marker(&cli.output) {
        Box::new(io::stdout())
    } else {
        Box::new(File::create(&cli.output).with_context(|| format!("creating {}", cli.output.display()))?)
    };

    blockalign::decode(&cli.input, output)?;
    Ok(ExitCode::SUCCESS)
}

fn run_encode(cli: Cli) -> anyhow::Result<ExitCode> {
    let hashfile = cli
        .hashfile
        .ok_or_else(|| anyhow::anyhow!("hash output name not given as an argument"))?;

    let input: Box<dyn Read> = if is_stdio_marker(&cli.input) {
        Box::new(io::stdin())
    } else {
        Box::new(File::open(&cli.input).with_context(|| format!("opening {}", cli.input.display()))?)
    };

    let output: Box<dyn Write> = if is_stdio_marker(&cli.output) {
        Box::new(io::stdout())
    } else {
        Box::new(File::create(&cli.output).with_context(|| format!("creating {}", cli.output.display()))?)
    };

    let stats = blockalign::encode(input, output, &hashfile)?;

    if cli.verbose && !cli.quiet {
        tracing::info!(
            avg_block_size = stats.avg_block_size(),
            hit_percent = stats.hit_percent(),
            n_blocks = stats.n_total_blocks,
            "block align finished",
        );
    }

    Ok(ExitCode::SUCCESS)
}

fn is_stdio_marker(path: &std::path::Path) -> bool {
    path.as_os_str() == "-"
}
