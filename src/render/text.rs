use std::borrow::Cow;
use std::path::Path;

use crate::foundation::color::Rgb8;
use crate::foundation::error::{ChronoError, ChronoResult};

/// Font used when no custom font is configured or it fails to load.
const BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSansMono.ttf");

/// Generic family requested only if the bundled font itself cannot be registered.
const GENERIC_FAMILY: &str = "monospace";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// RGBA8 brush color used by Parley text layout.
pub(crate) struct TextBrushRgba8 {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

impl From<Rgb8> for TextBrushRgba8 {
    fn from(c: Rgb8) -> Self {
        Self {
            r: c.r,
            g: c.g,
            b: c.b,
            a: 255,
        }
    }
}

/// Stateful helper for shaping single lines of text with Parley.
///
/// The bundled font is always registered. A user-supplied font file is registered on top of it
/// and used instead when it loads.
pub struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
    family: String,
    custom: bool,
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TextLayoutEngine {
    /// Construct an engine, loading `font_path` when given.
    ///
    /// A font that cannot be read or registered is a warning, not an error.
    pub fn new(font_path: Option<&Path>) -> Self {
        let mut font_ctx = parley::FontContext::default();
        let bundled = register_font_bytes(&mut font_ctx, BUNDLED_FONT.to_vec())
            .unwrap_or_else(|e| {
                tracing::error!("bundled font rejected: {e}");
                GENERIC_FAMILY.to_owned()
            });

        let (family, custom) = match font_path {
            Some(path) => match register_font_file(&mut font_ctx, path) {
                Ok(family) => {
                    tracing::debug!(font = %path.display(), family = %family, "custom font registered");
                    (family, true)
                }
                Err(e) => {
                    tracing::warn!(font = %path.display(), "{e}; using default font");
                    (bundled, false)
                }
            },
            None => (bundled, false),
        };

        Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            family,
            custom,
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn uses_default_font(&self) -> bool {
        !self.custom
    }

    /// Shape one line of plain text without wrapping.
    pub(crate) fn layout_line(
        &mut self,
        text: &str,
        size_px: f32,
        color: Rgb8,
    ) -> ChronoResult<parley::Layout<TextBrushRgba8>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(ChronoError::invalid_option(
                "text size_px must be finite and > 0",
            ));
        }

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(Cow::Owned(self.family.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(TextBrushRgba8::from(
            color,
        )));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }
}

fn register_font_file(font_ctx: &mut parley::FontContext, path: &Path) -> ChronoResult<String> {
    let bytes = std::fs::read(path).map_err(|e| {
        ChronoError::render(format!("font '{}' could not be read: {e}", path.display()))
    })?;
    register_font_bytes(font_ctx, bytes)
        .map_err(|e| ChronoError::render(format!("font '{}': {e}", path.display())))
}

fn register_font_bytes(font_ctx: &mut parley::FontContext, bytes: Vec<u8>) -> ChronoResult<String> {
    let families = font_ctx
        .collection
        .register_fonts(parley::fontique::Blob::from(bytes), None);
    let family_id = families
        .first()
        .map(|(id, _)| *id)
        .ok_or_else(|| ChronoError::render("no font families registered"))?;

    font_ctx
        .collection
        .family_name(family_id)
        .map(str::to_owned)
        .ok_or_else(|| ChronoError::render("registered font family has no name"))
}
