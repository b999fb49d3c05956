use std::{ffi::OsString, path::PathBuf, time::Duration};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

use chronoscope::{
    ContentRedactor, JobOrchestrator, JobRequest, OrchestratorConfig, TimelapseRequest,
    encode::ffmpeg::DEFAULT_ENCODER,
    jobs::model::{DEFAULT_FPS, DEFAULT_RESOLUTION, Dimension},
    pipeline::{render_preview, render_timelapse},
    render::composer::{DEFAULT_BACKGROUND, DEFAULT_FONT_SIZE, DEFAULT_TEXT_COLOR},
    server::{DEFAULT_HOST, DEFAULT_PORT},
};

#[derive(Parser, Debug)]
#[command(name = "chronoscope", version, about = "Render a git history as a time-lapse video")]
struct Cli {
    /// Encoder executable (ffmpeg or compatible).
    #[arg(long, global = true, env = "CHRONOSCOPE_FFMPEG", default_value = DEFAULT_ENCODER)]
    ffmpeg: OsString,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render every commit of a branch and encode them into a video.
    Render(RenderArgs),
    /// Render a single commit as a PNG.
    Frame(FrameArgs),
    /// List local branches.
    Branches(BranchesArgs),
    /// Serve the HTTP job API.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct StyleArgs {
    /// Output resolution: 720p, 1080p, 4k or custom.
    #[arg(long, default_value = DEFAULT_RESOLUTION)]
    resolution: String,

    /// Width for `--resolution custom`.
    #[arg(long)]
    width: Option<String>,

    /// Height for `--resolution custom`.
    #[arg(long)]
    height: Option<String>,

    #[arg(long = "bg-color", default_value = DEFAULT_BACKGROUND)]
    bg_color: String,

    #[arg(long = "text-color", default_value = DEFAULT_TEXT_COLOR)]
    text_color: String,

    /// TrueType/OpenType font file.
    #[arg(long)]
    font: Option<PathBuf>,

    #[arg(long = "font-size", default_value_t = DEFAULT_FONT_SIZE)]
    font_size: f32,

    /// Do not show author emails.
    #[arg(long = "no-email")]
    no_email: bool,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Repository to read.
    repo: PathBuf,

    /// Output video path.
    out: PathBuf,

    /// mp4 or gif. Defaults to the output extension, then mp4.
    #[arg(long)]
    format: Option<String>,

    #[arg(long)]
    branch: Option<String>,

    #[arg(long, default_value_t = DEFAULT_FPS)]
    fps: u32,

    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Repository to read.
    repo: PathBuf,

    /// Output PNG path.
    out: PathBuf,

    /// Branch or revision; the newest commit reachable from it is drawn.
    #[arg(long)]
    commit: Option<String>,

    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Parser, Debug)]
struct BranchesArgs {
    repo: PathBuf,
}

#[derive(Parser, Debug)]
struct ServeArgs {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory finished videos are written to.
    #[arg(long, env = "CHRONOSCOPE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Delete finished videos this many seconds after completion.
    #[arg(long, env = "CHRONOSCOPE_RETENTION_SECS")]
    retention_secs: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args, cli.ffmpeg),
        Command::Frame(args) => cmd_frame(args),
        Command::Branches(args) => cmd_branches(args),
        Command::Serve(args) => cmd_serve(args, cli.ffmpeg),
    }
}

fn job_request(repo: &std::path::Path, style: StyleArgs) -> JobRequest {
    JobRequest {
        repo_path: repo.to_string_lossy().into_owned(),
        resolution: Some(style.resolution),
        width: style.width.map(Dimension::Text),
        height: style.height.map(Dimension::Text),
        bg_color: Some(style.bg_color),
        text_color: Some(style.text_color),
        font_path: style.font.map(|p| p.to_string_lossy().into_owned()),
        font_size: Some(style.font_size),
        no_email: Some(style.no_email),
        ..JobRequest::default()
    }
}

fn cmd_render(args: RenderArgs, ffmpeg: OsString) -> anyhow::Result<()> {
    let format = args.format.clone().or_else(|| {
        args.out
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.eq_ignore_ascii_case("gif"))
            .map(str::to_owned)
    });
    let options = JobRequest {
        format,
        branch: args.branch.clone(),
        fps: Some(args.fps),
        ..job_request(&args.repo, args.style)
    }
    .to_options()?;

    let req = TimelapseRequest {
        repo_path: args.repo,
        branch: options.branch.clone(),
        out_path: args.out,
        format: options.format,
        fps: options.fps,
        composer: options.composer_opts(),
        encoder_program: ffmpeg,
    };

    let scratch = tempfile::Builder::new()
        .prefix("chronoscope_frames_")
        .tempdir()
        .context("create frame directory")?;
    let progress = |pct: u8, message: &str| eprintln!("[{pct:>3}%] {message}");
    let summary = render_timelapse(&req, &ContentRedactor::new(), scratch.path(), &progress)?;
    scratch.close().context("remove frame directory")?;

    eprintln!(
        "wrote {} ({} frames, {} truncated)",
        summary.out_path.display(),
        summary.frames,
        summary.truncated_frames
    );
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let options = job_request(&args.repo, args.style).to_options()?;
    let preview = render_preview(
        &args.repo,
        args.commit.as_deref(),
        &options.composer_opts(),
        &ContentRedactor::new(),
    )?;

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, &preview.png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!(
        "wrote {} (commit {})",
        args.out.display(),
        preview.commit.hash
    );
    Ok(())
}

fn cmd_branches(args: BranchesArgs) -> anyhow::Result<()> {
    let reader = chronoscope::HistoryReader::open(&args.repo)?;
    for branch in reader.list_branches()? {
        println!("{branch}");
    }
    Ok(())
}

fn cmd_serve(args: ServeArgs, ffmpeg: OsString) -> anyhow::Result<()> {
    let defaults = OrchestratorConfig::default();
    let config = OrchestratorConfig {
        output_dir: args.output_dir.unwrap_or(defaults.output_dir),
        scratch_root: defaults.scratch_root,
        encoder_program: ffmpeg,
        retention: args.retention_secs.map(Duration::from_secs),
    };
    let orchestrator = JobOrchestrator::new(config)?;

    let runtime = tokio::runtime::Runtime::new().context("start async runtime")?;
    runtime.block_on(chronoscope::server::serve(
        orchestrator,
        &args.host,
        args.port,
    ))
}
