use crate::foundation::color::Rgb8;
use crate::foundation::core::Canvas;
use crate::foundation::error::ChronoResult;

pub mod composer;
pub mod cpu;
pub mod text;

/// Font size and fill for one run of text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextStyle {
    pub size_px: f32,
    pub color: Rgb8,
}

/// Drawing surface a frame is composed onto.
///
/// Coordinates are pixels from the top-left corner; text is positioned by the top of its line
/// box. Implementations must keep the configured size no matter what is drawn.
pub trait FrameSurface {
    fn canvas(&self) -> Canvas;

    /// Height of the line box `text` occupies at `style`.
    fn text_height(&mut self, text: &str, style: &TextStyle) -> ChronoResult<f32>;

    fn draw_text(&mut self, x: f32, y: f32, text: &str, style: &TextStyle) -> ChronoResult<()>;

    /// One-pixel horizontal rule from `x0` to `x1` at `y`.
    fn draw_hline(&mut self, x0: f32, x1: f32, y: f32, color: Rgb8);
}
