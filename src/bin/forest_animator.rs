use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use forest_animator::{Layout as _, Session, Strictness};

#[derive(Parser, Debug)]
#[command(name = "forest-animator", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render every configured year and assemble the animation.
    Render(RenderArgs),
    /// Render a single year's frame as a PNG.
    Frame(FrameArgs),
    /// Load the configuration and report years, slots and unreadable layers.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Animation config JSON.
    #[arg(long)]
    config: PathBuf,

    /// Skip failed years instead of aborting the run.
    #[arg(long)]
    lenient: bool,

    /// Drop every cached entry before rendering.
    #[arg(long)]
    clear_cache: bool,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Animation config JSON.
    #[arg(long)]
    config: PathBuf,

    #[arg(long)]
    year: i32,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Animation config JSON.
    #[arg(long)]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Check(args) => cmd_check(args),
    }
}

fn load_session(path: &Path, lenient: bool) -> anyhow::Result<Session> {
    let mut config = forest_animator::AnimationConfig::from_path(path)?;
    if lenient {
        config.strictness = Strictness::Lenient;
    }
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Session::build(&config, base).with_context(|| format!("set up run from '{}'", path.display()))
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let session = load_session(&args.config, args.lenient)?;
    if args.clear_cache {
        session.animator().context().cache.clear()?;
    }
    let report = session.run()?;
    for failure in &report.skipped {
        eprintln!("skipped {}: {}", failure.year, failure.error);
    }
    for path in &report.saved_frames {
        eprintln!("saved {}", path.display());
    }
    eprintln!(
        "wrote {} ({} frames)",
        report.artifact.display(),
        report.frames.len()
    );
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let session = load_session(&args.config, false)?;
    let frame = session.render_frame(args.year)?;
    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    frame.save_png(&args.out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let session = load_session(&args.config, false)?;
    let animator = session.animator();
    let years: Vec<String> = session.years().iter().map(|y| y.to_string()).collect();
    eprintln!("layout:   {}", animator.layout().name());
    for slot in animator.layout().slots() {
        eprintln!("  slot:   {}", slot.name);
    }
    eprintln!("years:    {}", years.join(", "));
    eprintln!("artifact: {}", animator.artifact_path().display());
    for failure in session.load_failures() {
        eprintln!(
            "unreadable {} ({}): {}",
            failure.year, failure.source, failure.error
        );
    }
    Ok(())
}
