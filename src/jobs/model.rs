use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::encode::ffmpeg::OutputFormat;
use crate::foundation::core::{Canvas, Resolution};
use crate::foundation::error::{ChronoError, ChronoResult};
use crate::pipeline::PROGRESS_DONE;
use crate::render::composer::{
    ComposerOpts, DEFAULT_BACKGROUND, DEFAULT_FONT_SIZE, DEFAULT_TEXT_COLOR,
};

pub type JobId = String;

pub const DEFAULT_FPS: u32 = 2;
pub const DEFAULT_RESOLUTION: &str = "1080p";

const SUCCESS_MESSAGE: &str = "Time-lapse generated successfully!";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Validated per-job settings.
#[derive(Clone, Debug, PartialEq)]
pub struct JobOptions {
    pub format: OutputFormat,
    pub branch: Option<String>,
    pub fps: u32,
    pub canvas: Canvas,
    pub background: String,
    pub text_color: String,
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    pub show_email: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Mp4,
            branch: None,
            fps: DEFAULT_FPS,
            canvas: Canvas::default(),
            background: DEFAULT_BACKGROUND.to_owned(),
            text_color: DEFAULT_TEXT_COLOR.to_owned(),
            font_path: None,
            font_size: DEFAULT_FONT_SIZE,
            show_email: true,
        }
    }
}

impl JobOptions {
    pub fn validate(&self) -> ChronoResult<()> {
        if self.fps == 0 {
            return Err(ChronoError::invalid_option("fps must be > 0"));
        }
        if !self.font_size.is_finite() || self.font_size <= 0.0 {
            return Err(ChronoError::invalid_option("font size must be > 0"));
        }
        if self.format == OutputFormat::Mp4 && !self.canvas.is_even() {
            return Err(ChronoError::invalid_option(format!(
                "mp4 output needs even dimensions (yuv420p), got {}x{}",
                self.canvas.width, self.canvas.height
            )));
        }
        if self.branch.as_deref().is_some_and(|b| b.trim().is_empty()) {
            return Err(ChronoError::invalid_option("branch name must be non-empty"));
        }
        Ok(())
    }

    pub fn composer_opts(&self) -> ComposerOpts {
        ComposerOpts {
            canvas: self.canvas,
            background: self.background.clone(),
            text_color: self.text_color.clone(),
            font_path: self.font_path.clone(),
            font_size: self.font_size,
            show_email: self.show_email,
        }
    }
}

/// A custom dimension as it arrives over the wire: a JSON number or a string.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Dimension {
    Number(u64),
    Text(String),
}

impl Dimension {
    fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

/// Unvalidated job submission, field names as the HTTP API accepts them.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct JobRequest {
    pub repo_path: String,
    pub format: Option<String>,
    pub branch: Option<String>,
    pub fps: Option<u32>,
    pub resolution: Option<String>,
    pub width: Option<Dimension>,
    pub height: Option<Dimension>,
    pub bg_color: Option<String>,
    pub text_color: Option<String>,
    pub font_path: Option<String>,
    pub font_size: Option<f32>,
    pub no_email: Option<bool>,
}

impl JobRequest {
    /// Parse and validate into [`JobOptions`], filling defaults for absent fields.
    pub fn to_options(&self) -> ChronoResult<JobOptions> {
        let defaults = JobOptions::default();

        let format = match self.format.as_deref() {
            Some(f) => f.parse()?,
            None => defaults.format,
        };
        let width = self.width.as_ref().map(Dimension::as_text);
        let height = self.height.as_ref().map(Dimension::as_text);
        let canvas = Resolution::parse(
            self.resolution.as_deref().unwrap_or(DEFAULT_RESOLUTION),
            width.as_deref(),
            height.as_deref(),
        )?
        .canvas();

        let options = JobOptions {
            format,
            branch: self
                .branch
                .as_deref()
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(str::to_owned),
            fps: self.fps.unwrap_or(defaults.fps),
            canvas,
            background: self.bg_color.clone().unwrap_or(defaults.background),
            text_color: self.text_color.clone().unwrap_or(defaults.text_color),
            font_path: self
                .font_path
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            font_size: self.font_size.unwrap_or(defaults.font_size),
            show_email: !self.no_email.unwrap_or(false),
        };
        options.validate()?;
        Ok(options)
    }
}

/// One submitted render and everything observed about it so far.
#[derive(Clone, Debug)]
pub struct Job {
    pub id: JobId,
    pub repo_path: PathBuf,
    pub options: JobOptions,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, repo_path: PathBuf, options: JobOptions) -> Self {
        Self {
            id,
            repo_path,
            options,
            status: JobStatus::Pending,
            progress: 0,
            message: "Queued".to_owned(),
            output_path: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// `pending -> running`. Returns false if the job had already left `pending`.
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Running;
        self.message = "Initializing...".to_owned();
        true
    }

    /// Record progress. Progress never goes backwards and terminal jobs ignore updates.
    pub fn report(&mut self, progress: u8, message: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.progress = self.progress.max(progress.min(PROGRESS_DONE));
        self.message = message.to_owned();
        true
    }

    pub fn complete(&mut self, output_path: PathBuf) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress = PROGRESS_DONE;
        self.message = SUCCESS_MESSAGE.to_owned();
        self.output_path = Some(output_path);
        self.error = None;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Terminal failure. Progress stays at its last reported value.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let error = error.into();
        self.status = JobStatus::Failed;
        self.message = format!("Error: {error}");
        self.error = Some(error);
        self.output_path = None;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Completed with an artifact that is still on disk.
    pub fn has_output(&self) -> bool {
        self.status == JobStatus::Completed
            && self.output_path.as_deref().is_some_and(Path::exists)
    }

    pub fn view(&self) -> JobView {
        JobView {
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            error: self.error.clone(),
            has_output: self.has_output(),
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            repo_path: self.repo_path.display().to_string(),
            format: self.options.format,
            created_at: self.created_at,
        }
    }
}

/// What a status poll sees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub has_output: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub repo_path: String,
    pub format: OutputFormat,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "../../tests/unit/jobs/model.rs"]
mod tests;
