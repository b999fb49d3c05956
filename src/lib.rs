#![forbid(unsafe_code)]

pub mod encode;
pub mod foundation;
pub mod history;
pub mod jobs;
pub mod pipeline;
pub mod redact;
pub mod render;
pub mod server;

pub use encode::ffmpeg::{AssemblerOpts, OutputFormat, VideoAssembler};
pub use foundation::color::Rgb8;
pub use foundation::core::{Canvas, Resolution};
pub use foundation::error::{ChronoError, ChronoResult};
pub use history::repo::HistoryReader;
pub use history::snapshot::{BINARY_SENTINEL, CommitInfo, FileContent, FrameFile, Snapshot};
pub use jobs::model::{Job, JobId, JobOptions, JobRequest, JobStatus, JobSummary, JobView};
pub use jobs::orchestrator::{JobOrchestrator, OrchestratorConfig};
pub use pipeline::{ProgressSink, RenderSummary, TimelapseRequest};
pub use redact::{ContentRedactor, RedactionRule};
pub use render::composer::{ComposerOpts, FrameComposer};
