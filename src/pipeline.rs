use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::encode::ffmpeg::{AssemblerOpts, DEFAULT_ENCODER, OutputFormat, VideoAssembler};
use crate::foundation::error::{ChronoError, ChronoResult};
use crate::history::repo::HistoryReader;
use crate::history::snapshot::CommitInfo;
use crate::redact::ContentRedactor;
use crate::render::composer::{ComposerOpts, FrameComposer};

/// Progress after the repository is opened.
pub const PROGRESS_OPENED: u8 = 5;
/// Progress once history is listed; frame rendering starts here.
pub const PROGRESS_FRAMES_START: u8 = 10;
/// Progress once every frame is on disk; encoding starts here.
pub const PROGRESS_FRAMES_DONE: u8 = 80;
pub const PROGRESS_DONE: u8 = 100;

/// Receives `(progress, message)` pairs as a render advances. Both values always arrive together.
pub trait ProgressSink {
    fn report(&self, progress: u8, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str),
{
    fn report(&self, progress: u8, message: &str) {
        self(progress, message)
    }
}

/// Discards progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: u8, _message: &str) {}
}

/// Everything needed to turn one branch of one repository into one video file.
#[derive(Clone, Debug)]
pub struct TimelapseRequest {
    pub repo_path: PathBuf,
    pub branch: Option<String>,
    pub out_path: PathBuf,
    pub format: OutputFormat,
    pub fps: u32,
    pub composer: ComposerOpts,
    pub encoder_program: OsString,
}

impl TimelapseRequest {
    pub fn new(repo_path: impl Into<PathBuf>, out_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            branch: None,
            out_path: out_path.into(),
            format: OutputFormat::Mp4,
            fps: 2,
            composer: ComposerOpts::default(),
            encoder_program: OsString::from(DEFAULT_ENCODER),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderSummary {
    pub frames: usize,
    pub truncated_frames: usize,
    pub out_path: PathBuf,
}

/// File name of the frame at `index` in commit order.
pub fn frame_file_name(index: usize) -> String {
    format!("frame_{index:05}.png")
}

/// Linear progress between the frame watermarks after `done` of `total` frames.
pub fn frame_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_FRAMES_START;
    }
    let span = usize::from(PROGRESS_FRAMES_DONE - PROGRESS_FRAMES_START);
    let step = done.min(total) * span / total;
    PROGRESS_FRAMES_START + step as u8
}

/// Render every commit of the requested branch into `scratch_dir` and encode the result.
///
/// The encoder is checked before any frame is drawn. Frames are left in `scratch_dir`; the
/// caller owns that directory and its cleanup.
#[tracing::instrument(skip_all, fields(repo = %req.repo_path.display(), format = %req.format))]
pub fn render_timelapse(
    req: &TimelapseRequest,
    redactor: &ContentRedactor,
    scratch_dir: &Path,
    progress: &dyn ProgressSink,
) -> ChronoResult<RenderSummary> {
    progress.report(0, "Initializing...");
    let assembler = VideoAssembler::new(
        AssemblerOpts::new(&req.out_path, req.fps, req.format)
            .with_program(req.encoder_program.clone()),
    )?;
    let mut composer = FrameComposer::new(&req.composer)?;
    let reader = HistoryReader::open(&req.repo_path)?;

    progress.report(PROGRESS_OPENED, "Analyzing repository...");
    let history = reader.list_history(req.branch.as_deref())?;
    if history.is_empty() {
        return Err(ChronoError::empty_history(
            "No commits found in the specified branch.",
        ));
    }
    let total = history.len();
    tracing::info!(commits = total, "rendering frames");
    progress.report(
        PROGRESS_FRAMES_START,
        &format!("Found {total} commits. Rendering frames..."),
    );

    let mut frames = Vec::with_capacity(total);
    let mut truncated_frames = 0;
    for (i, commit) in history.iter().enumerate() {
        let path = scratch_dir.join(frame_file_name(i));
        if render_commit_frame(&reader, &mut composer, redactor, commit, &path)? {
            truncated_frames += 1;
        }
        frames.push(path);
        progress.report(
            frame_progress(i + 1, total),
            &format!("Rendering frames: {}/{total}", i + 1),
        );
    }

    progress.report(PROGRESS_FRAMES_DONE, "Encoding video...");
    assembler.assemble(&frames, scratch_dir)?;

    Ok(RenderSummary {
        frames: total,
        truncated_frames,
        out_path: req.out_path.clone(),
    })
}

/// Snapshot, redact, draw and save one commit. Returns whether the frame was truncated.
fn render_commit_frame(
    reader: &HistoryReader,
    composer: &mut FrameComposer,
    redactor: &ContentRedactor,
    commit: &CommitInfo,
    path: &Path,
) -> ChronoResult<bool> {
    let snapshot = reader.snapshot_at(&commit.id)?;
    let commit = redactor.redact_commit(commit);
    let files = redactor.redact_snapshot(&snapshot);

    let frame = composer.render(&commit, &files)?;
    frame.image.save(path).map_err(|e| {
        ChronoError::render(format!("failed to write frame '{}': {e}", path.display()))
    })?;
    tracing::debug!(commit = %commit.hash, frame = %path.display(), "frame rendered");
    Ok(frame.report.truncated)
}

/// A single encoded preview frame.
#[derive(Clone, Debug)]
pub struct Preview {
    pub commit: CommitInfo,
    pub png: Vec<u8>,
}

/// Render the newest commit reachable from `rev` (a branch name, or any revision) as PNG.
#[tracing::instrument(skip(composer_opts, redactor))]
pub fn render_preview(
    repo_path: &Path,
    rev: Option<&str>,
    composer_opts: &ComposerOpts,
    redactor: &ContentRedactor,
) -> ChronoResult<Preview> {
    let reader = HistoryReader::open(repo_path)?;
    let history = reader.list_history(rev)?;
    let commit = history.last().ok_or_else(|| {
        ChronoError::empty_history("No commits found in the specified branch.")
    })?;

    let files = redactor.redact_snapshot(&reader.snapshot_at(&commit.id)?);
    let redacted = redactor.redact_commit(commit);
    let mut composer = FrameComposer::new(composer_opts)?;
    let frame = composer.render(&redacted, &files)?;

    let mut png = std::io::Cursor::new(Vec::new());
    frame
        .image
        .write_to(&mut png, image::ImageFormat::Png)
        .map_err(|e| ChronoError::render(format!("failed to encode preview PNG: {e}")))?;

    Ok(Preview {
        commit: redacted,
        png: png.into_inner(),
    })
}
