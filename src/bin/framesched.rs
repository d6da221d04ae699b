use std::{
    fs::File,
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "framesched", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSON call trace on a virtual clock and report execution order.
    ///
    /// Each task failure is printed to stderr as one line.
    Replay(ReplayArgs),
    /// Print the frame interval for a frame rate.
    Interval(IntervalArgs),
}

#[derive(Parser, Debug)]
struct ReplayArgs {
    /// Input trace JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output report JSON path (stdout when omitted).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Stop at this virtual time (ms) instead of running until idle.
    #[arg(long)]
    until: Option<u64>,
}

#[derive(Parser, Debug)]
struct IntervalArgs {
    /// Frames per second numerator.
    #[arg(long, default_value_t = 60)]
    num: u32,

    /// Frames per second denominator.
    #[arg(long, default_value_t = 1)]
    den: u32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Replay(args) => cmd_replay(args),
        Command::Interval(args) => cmd_interval(args),
    }
}

fn read_trace(path: &Path) -> anyhow::Result<framesched::Trace> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read trace '{}'", path.display()))?;
    let trace = framesched::Trace::from_json(&s).with_context(|| "parse trace JSON")?;
    Ok(trace)
}

fn cmd_replay(args: ReplayArgs) -> anyhow::Result<()> {
    let mut trace = read_trace(&args.in_path)?;
    if let Some(until) = args.until {
        trace.until = Some(framesched::Millis(until));
    }

    // Replayed panics are reported as task failures; keep the default hook's backtrace line
    // off stderr and leave it to `RUST_LOG=debug`.
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|info| tracing::debug!(%info, "task panic caught")));
    let report = framesched::replay(&trace);
    std::panic::set_hook(prev_hook);
    let report = report?;
    for failure in &report.failures {
        eprintln!("{failure}");
    }

    match args.out {
        Some(out) => {
            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create '{}'", parent.display()))?;
            }
            let f = File::create(&out).with_context(|| format!("create '{}'", out.display()))?;
            let mut w = BufWriter::new(f);
            serde_json::to_writer_pretty(&mut w, &report).with_context(|| "write report")?;
            w.flush()?;
        }
        None => {
            let mut w = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut w, &report).with_context(|| "write report")?;
            writeln!(w)?;
        }
    }
    Ok(())
}

fn cmd_interval(args: IntervalArgs) -> anyhow::Result<()> {
    let fps = framesched::Fps::new(args.num, args.den)?;
    println!("{}", fps.frame_interval());
    Ok(())
}
