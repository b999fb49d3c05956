use std::path::PathBuf;

use crate::foundation::color::Rgb8;
use crate::foundation::core::Canvas;
use crate::foundation::error::{ChronoError, ChronoResult};
use crate::history::snapshot::{CommitInfo, FrameFile};
use crate::render::cpu::CpuRasterizer;
use crate::render::text::TextLayoutEngine;
use crate::render::{FrameSurface, TextStyle};

pub const DEFAULT_BACKGROUND: &str = "#141618";
pub const DEFAULT_TEXT_COLOR: &str = "#FFFFFF";
pub const DEFAULT_FONT_SIZE: f32 = 15.0;

const PADDING: f32 = 20.0;
const LINE_SPACING: f32 = 8.0;
const HEADER_SCALE: f32 = 1.2;
const TAB: &str = "    ";
const OVERFLOW_MARKER: &str = "...";

/// Frame appearance, as requested by a caller.
#[derive(Clone, Debug, PartialEq)]
pub struct ComposerOpts {
    pub canvas: Canvas,
    pub background: String,
    pub text_color: String,
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    /// Whether the author email is displayed at all. Independent of secret redaction.
    pub show_email: bool,
}

impl Default for ComposerOpts {
    fn default() -> Self {
        Self {
            canvas: Canvas::default(),
            background: DEFAULT_BACKGROUND.to_owned(),
            text_color: DEFAULT_TEXT_COLOR.to_owned(),
            font_path: None,
            font_size: DEFAULT_FONT_SIZE,
            show_email: true,
        }
    }
}

/// What a composition pass drew.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayoutReport {
    pub lines_drawn: usize,
    pub truncated: bool,
}

pub struct ComposedFrame {
    pub image: image::RgbImage,
    pub report: LayoutReport,
}

/// Resolved layout parameters; everything `compose` needs besides the surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameLayout {
    pub text_color: Rgb8,
    pub font_size: f32,
    pub show_email: bool,
}

impl FrameLayout {
    fn body_style(&self) -> TextStyle {
        TextStyle {
            size_px: self.font_size,
            color: self.text_color,
        }
    }

    fn header_style(&self) -> TextStyle {
        TextStyle {
            size_px: (self.font_size * HEADER_SCALE).floor().max(1.0),
            color: self.text_color,
        }
    }

    /// Lay out one commit onto `surface`.
    ///
    /// Every line goes through the same overflow check, so the truncation point depends only on
    /// the input and the canvas height.
    pub fn compose<S: FrameSurface>(
        &self,
        surface: &mut S,
        commit: &CommitInfo,
        files: &[FrameFile],
    ) -> ChronoResult<LayoutReport> {
        let canvas = surface.canvas();
        let mut cursor = Cursor {
            y: PADDING,
            limit: canvas.height as f32 - PADDING,
            max_chars: max_chars_for(canvas.width, self.font_size),
            report: LayoutReport::default(),
        };
        let body = self.body_style();
        let header = self.header_style();

        let author = if self.show_email {
            format!("Author: {} <{}>", commit.author_name, commit.author_email)
        } else {
            format!("Author: {}", commit.author_name)
        };
        let date = format!("Date: {}", commit.time.format("%Y-%m-%d %H:%M:%S"));
        let subject = format!("Commit: {} - {}", commit.hash, commit.subject());

        if !cursor.line(surface, &author, &body, LINE_SPACING)?
            || !cursor.line(surface, &date, &body, PADDING)?
            || !cursor.line(surface, &subject, &header, PADDING)?
        {
            return Ok(cursor.report);
        }

        if cursor.y > cursor.limit {
            cursor.overflow(surface, &body)?;
            return Ok(cursor.report);
        }
        surface.draw_hline(
            PADDING,
            canvas.width as f32 - PADDING,
            cursor.y,
            self.text_color,
        );
        cursor.y += PADDING;

        'files: for file in files {
            let header_line = format!("--- {} ---", file.path);
            if !cursor.line(surface, &header_line, &body, LINE_SPACING)? {
                break;
            }
            for raw in file.content.display().lines() {
                let text = raw.replace('\t', TAB);
                if !cursor.line(surface, &text, &body, LINE_SPACING)? {
                    break 'files;
                }
            }
        }

        Ok(cursor.report)
    }
}

struct Cursor {
    y: f32,
    limit: f32,
    max_chars: usize,
    report: LayoutReport,
}

impl Cursor {
    /// Draw `text` and advance; returns `false` once the canvas is full.
    fn line<S: FrameSurface>(
        &mut self,
        surface: &mut S,
        text: &str,
        style: &TextStyle,
        gap: f32,
    ) -> ChronoResult<bool> {
        let text = clip_chars(text, self.max_chars);
        let height = surface.text_height(text, style)?;
        if self.y + height > self.limit {
            self.overflow(surface, style)?;
            return Ok(false);
        }
        if !text.trim().is_empty() {
            surface.draw_text(PADDING, self.y, text, style)?;
        }
        self.report.lines_drawn += 1;
        self.y += height + gap;
        Ok(true)
    }

    fn overflow<S: FrameSurface>(&mut self, surface: &mut S, style: &TextStyle) -> ChronoResult<()> {
        let y = self.y.min(self.limit);
        surface.draw_text(PADDING, y, OVERFLOW_MARKER, style)?;
        self.report.truncated = true;
        Ok(())
    }
}

/// Upper bound on characters worth shaping per line; anything past it is off-canvas.
fn max_chars_for(width: u32, font_size: f32) -> usize {
    let min_advance = (font_size * 0.25).max(1.0);
    (width as f32 / min_advance).ceil() as usize + 1
}

fn clip_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Renders one fixed-size frame per commit.
pub struct FrameComposer {
    canvas: Canvas,
    background: Rgb8,
    layout: FrameLayout,
    raster: CpuRasterizer,
}

impl FrameComposer {
    /// Build a composer. Bad colors and fonts degrade with a warning; only a non-positive
    /// font size is rejected.
    pub fn new(opts: &ComposerOpts) -> ChronoResult<Self> {
        if !opts.font_size.is_finite() || opts.font_size <= 0.0 {
            return Err(ChronoError::invalid_option(format!(
                "font size must be > 0, got {}",
                opts.font_size
            )));
        }
        let background = Rgb8::parse_or(&opts.background, Rgb8::BLACK);
        let text_color = Rgb8::parse_or(&opts.text_color, Rgb8::WHITE);
        let text = TextLayoutEngine::new(opts.font_path.as_deref());

        Ok(Self {
            canvas: opts.canvas,
            background,
            layout: FrameLayout {
                text_color,
                font_size: opts.font_size,
                show_email: opts.show_email,
            },
            raster: CpuRasterizer::new(text),
        })
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn background(&self) -> Rgb8 {
        self.background
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Draw `commit` and `files` (already in display order) onto a fresh frame.
    pub fn render(&mut self, commit: &CommitInfo, files: &[FrameFile]) -> ChronoResult<ComposedFrame> {
        let layout = self.layout;
        let mut surface = self.raster.surface(self.canvas, self.background)?;
        let report = layout.compose(&mut surface, commit, files)?;
        let image = surface.into_image()?;
        if report.truncated {
            tracing::debug!(commit = %commit.hash, lines = report.lines_drawn, "frame content truncated");
        }
        Ok(ComposedFrame { image, report })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/composer.rs"]
mod tests;
