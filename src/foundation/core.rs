use crate::foundation::error::{ChronoError, ChronoResult};

/// Fixed output canvas size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    /// Create a validated canvas.
    ///
    /// The CPU rasterizer addresses pixmaps with `u16`, so both sides are capped at 65535.
    pub fn new(width: u32, height: u32) -> ChronoResult<Self> {
        if width == 0 || height == 0 {
            return Err(ChronoError::invalid_option(
                "canvas width/height must be non-zero",
            ));
        }
        if width > u32::from(u16::MAX) || height > u32::from(u16::MAX) {
            return Err(ChronoError::invalid_option(format!(
                "canvas {width}x{height} exceeds the maximum of {max}x{max}",
                max = u16::MAX
            )));
        }
        Ok(Self { width, height })
    }

    pub fn is_even(self) -> bool {
        self.width.is_multiple_of(2) && self.height.is_multiple_of(2)
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Resolution::P1080.canvas()
    }
}

/// Named output resolution presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    P720,
    P1080,
    K4,
    Custom(Canvas),
}

impl Resolution {
    pub fn canvas(self) -> Canvas {
        match self {
            Self::P720 => Canvas {
                width: 1280,
                height: 720,
            },
            Self::P1080 => Canvas {
                width: 1920,
                height: 1080,
            },
            Self::K4 => Canvas {
                width: 3840,
                height: 2160,
            },
            Self::Custom(c) => c,
        }
    }

    /// Resolve a preset name, or `custom` with explicit dimensions.
    ///
    /// Dimensions arrive as text because they come straight from CLI flags or JSON fields;
    /// anything that is not a positive integer is an [`ChronoError::InvalidOption`].
    pub fn parse(preset: &str, width: Option<&str>, height: Option<&str>) -> ChronoResult<Self> {
        match preset.trim().to_ascii_lowercase().as_str() {
            "720p" => Ok(Self::P720),
            "1080p" => Ok(Self::P1080),
            "4k" | "2160p" => Ok(Self::K4),
            "custom" => {
                let w = parse_dimension("width", width)?;
                let h = parse_dimension("height", height)?;
                Ok(Self::Custom(Canvas::new(w, h)?))
            }
            other => Err(ChronoError::invalid_option(format!(
                "unknown resolution '{other}' (expected 720p, 1080p, 4k or custom)"
            ))),
        }
    }
}

fn parse_dimension(name: &str, raw: Option<&str>) -> ChronoResult<u32> {
    let raw = raw.ok_or_else(|| {
        ChronoError::invalid_option(format!("custom resolution requires a {name}"))
    })?;
    raw.trim().parse::<u32>().map_err(|_| {
        ChronoError::invalid_option(format!("{name} must be a positive integer, got '{raw}'"))
    })
}
