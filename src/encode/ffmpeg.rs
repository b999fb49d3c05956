use std::{
    ffi::{OsStr, OsString},
    fmt,
    io::Write as _,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    str::FromStr,
};

use crate::foundation::error::{ChronoError, ChronoResult};

pub const DEFAULT_ENCODER: &str = "ffmpeg";

const GIF_FILTER: &str = "[0:v] split [a][b];[a] palettegen [p];[b][p] paletteuse";

/// Container formats the assembler can produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// H.264 in MP4, yuv420p.
    #[default]
    Mp4,
    /// Palette-optimized animated GIF.
    Gif,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Gif => "gif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Gif => "image/gif",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ChronoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "gif" => Ok(Self::Gif),
            other => Err(ChronoError::invalid_option(format!(
                "unsupported output format '{other}' (expected 'mp4' or 'gif')"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AssemblerOpts {
    pub out_path: PathBuf,
    pub fps: u32,
    pub format: OutputFormat,
    /// Encoder executable, looked up on `PATH` when not a path.
    pub program: OsString,
}

impl AssemblerOpts {
    pub fn new(out_path: impl Into<PathBuf>, fps: u32, format: OutputFormat) -> Self {
        Self {
            out_path: out_path.into(),
            fps,
            format,
            program: OsString::from(DEFAULT_ENCODER),
        }
    }

    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }
}

/// True when `program -version` runs and exits successfully.
pub fn encoder_available(program: &OsStr) -> bool {
    Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ensure_parent_dir(path: &Path) -> ChronoResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// One concat-demuxer manifest entry. Single quotes are closed, escaped and reopened.
pub fn manifest_line(frame: &Path) -> String {
    let quoted = frame.to_string_lossy().replace('\'', r"'\''");
    format!("file '{quoted}'")
}

/// Turns an ordered list of frame images into one video via an external encoder process.
///
/// The encoder binary is a system `ffmpeg` (or a compatible program) rather than linked
/// libraries, so no native codec headers are needed at build time.
#[derive(Debug)]
pub struct VideoAssembler {
    opts: AssemblerOpts,
}

impl VideoAssembler {
    /// Validate options and check the encoder up front, before any frame is rendered.
    pub fn new(opts: AssemblerOpts) -> ChronoResult<Self> {
        if opts.fps == 0 {
            return Err(ChronoError::invalid_option("fps must be > 0"));
        }
        if !encoder_available(&opts.program) {
            return Err(ChronoError::encoder_unavailable(format!(
                "'{}' is required for video encoding, but was not found or could not be run",
                opts.program.to_string_lossy()
            )));
        }
        Ok(Self { opts })
    }

    pub fn out_path(&self) -> &Path {
        &self.opts.out_path
    }

    pub fn format(&self) -> OutputFormat {
        self.opts.format
    }

    /// Full encoder argument list for a given manifest.
    pub fn encoder_args(&self, manifest: &Path) -> Vec<OsString> {
        let fps = self.opts.fps.to_string();
        let mut args: Vec<OsString> = [
            "-y",
            "-loglevel",
            "error",
            "-r",
            fps.as_str(),
            "-f",
            "concat",
            "-safe",
            "0",
            "-i",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(manifest.as_os_str().to_owned());

        let codec: &[&str] = match self.opts.format {
            OutputFormat::Mp4 => &["-c:v", "libx264", "-pix_fmt", "yuv420p", "-preset", "medium"],
            OutputFormat::Gif => &["-filter_complex", GIF_FILTER],
        };
        args.extend(codec.iter().map(OsString::from));
        args.push(self.opts.out_path.as_os_str().to_owned());
        args
    }

    /// Encode `frames` in order. An empty list is a no-op.
    ///
    /// The manifest lives in `scratch_dir` and is removed on every exit path.
    #[tracing::instrument(skip_all, fields(frames = frames.len(), out = %self.opts.out_path.display()))]
    pub fn assemble(&self, frames: &[PathBuf], scratch_dir: &Path) -> ChronoResult<()> {
        if frames.is_empty() {
            tracing::debug!("no frames to assemble");
            return Ok(());
        }
        ensure_parent_dir(&self.opts.out_path)?;

        let manifest = self.write_manifest(frames, scratch_dir)?;

        let output = Command::new(&self.opts.program)
            .args(self.encoder_args(manifest.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                ChronoError::encoder_unavailable(format!(
                    "failed to run '{}': {e}",
                    self.opts.program.to_string_lossy()
                ))
            })?;
        drop(manifest);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChronoError::encoding(format!(
                "encoder exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!(format = %self.opts.format, "video assembled");
        Ok(())
    }

    fn write_manifest(
        &self,
        frames: &[PathBuf],
        scratch_dir: &Path,
    ) -> ChronoResult<tempfile::NamedTempFile> {
        use anyhow::Context as _;

        let mut manifest = tempfile::Builder::new()
            .prefix("frames_")
            .suffix(".txt")
            .tempfile_in(scratch_dir)
            .with_context(|| {
                format!("failed to create manifest in '{}'", scratch_dir.display())
            })?;
        {
            let mut w = std::io::BufWriter::new(manifest.as_file_mut());
            for frame in frames {
                let abs = std::path::absolute(frame).with_context(|| {
                    format!("failed to resolve frame path '{}'", frame.display())
                })?;
                writeln!(w, "{}", manifest_line(&abs)).context("failed to write manifest")?;
            }
            w.flush().context("failed to write manifest")?;
        }
        Ok(manifest)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
