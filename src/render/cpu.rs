use std::collections::HashMap;

use crate::foundation::color::Rgb8;
use crate::foundation::core::Canvas;
use crate::foundation::error::{ChronoError, ChronoResult};
use crate::render::text::{TextBrushRgba8, TextLayoutEngine};
use crate::render::{FrameSurface, TextStyle};

/// Text shaping plus the raster-side font cache, shared by every frame a composer draws.
pub struct CpuRasterizer {
    text: TextLayoutEngine,
    font_cache: HashMap<(u64, u32), vello_cpu::peniko::FontData>,
}

impl CpuRasterizer {
    pub fn new(text: TextLayoutEngine) -> Self {
        Self {
            text,
            font_cache: HashMap::new(),
        }
    }

    pub fn text_engine(&self) -> &TextLayoutEngine {
        &self.text
    }

    /// Start a frame filled with `background`.
    pub fn surface(&mut self, canvas: Canvas, background: Rgb8) -> ChronoResult<CpuSurface<'_>> {
        let (width, height) = canvas_u16(canvas)?;
        let mut ctx = vello_cpu::RenderContext::new(width, height);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            background.r,
            background.g,
            background.b,
            255,
        ));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(width),
            f64::from(height),
        ));
        Ok(CpuSurface {
            raster: self,
            ctx,
            canvas,
            width,
            height,
        })
    }

    fn font_for_run(&mut self, font: &parley::FontData) -> vello_cpu::peniko::FontData {
        let key = (font.data.id(), font.index);
        self.font_cache
            .entry(key)
            .or_insert_with(|| {
                vello_cpu::peniko::FontData::new(
                    vello_cpu::peniko::Blob::from(font.data.data().to_vec()),
                    font.index,
                )
            })
            .clone()
    }
}

/// One frame being drawn with `vello_cpu`.
pub struct CpuSurface<'a> {
    raster: &'a mut CpuRasterizer,
    ctx: vello_cpu::RenderContext,
    canvas: Canvas,
    width: u16,
    height: u16,
}

impl CpuSurface<'_> {
    /// Rasterize everything drawn so far into an opaque RGB image of the surface's size.
    pub fn into_image(mut self) -> ChronoResult<image::RgbImage> {
        let mut pixmap = vello_cpu::Pixmap::new(self.width, self.height);
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut pixmap);

        // The background is opaque, so premultiplied and straight channels coincide.
        let rgb: Vec<u8> = pixmap
            .data_as_u8_slice()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        image::RgbImage::from_raw(u32::from(self.width), u32::from(self.height), rgb)
            .ok_or_else(|| ChronoError::render("pixmap size does not match frame size"))
    }
}

impl FrameSurface for CpuSurface<'_> {
    fn canvas(&self) -> Canvas {
        self.canvas
    }

    fn text_height(&mut self, text: &str, style: &TextStyle) -> ChronoResult<f32> {
        let layout = self
            .raster
            .text
            .layout_line(text, style.size_px, style.color)?;
        Ok(layout.height().max(style.size_px))
    }

    fn draw_text(&mut self, x: f32, y: f32, text: &str, style: &TextStyle) -> ChronoResult<()> {
        let layout = self
            .raster
            .text
            .layout_line(text, style.size_px, style.color)?;

        self.ctx.set_transform(vello_cpu::kurbo::Affine::translate((
            f64::from(x),
            f64::from(y),
        )));
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };

                let TextBrushRgba8 { r, g, b, a } = run.style().brush;
                self.ctx
                    .set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, a));

                let font = self.raster.font_for_run(run.run().font());
                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                self.ctx
                    .glyph_run(&font)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
        self.ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        Ok(())
    }

    fn draw_hline(&mut self, x0: f32, x1: f32, y: f32, color: Rgb8) {
        self.ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            color.r, color.g, color.b, 255,
        ));
        self.ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            f64::from(x0.min(x1)),
            f64::from(y),
            f64::from(x0.max(x1)),
            f64::from(y) + 1.0,
        ));
    }
}

fn canvas_u16(canvas: Canvas) -> ChronoResult<(u16, u16)> {
    let width = u16::try_from(canvas.width)
        .map_err(|_| ChronoError::invalid_option("frame width must fit in u16"))?;
    let height = u16::try_from(canvas.height)
        .map_err(|_| ChronoError::invalid_option("frame height must fit in u16"))?;
    if width == 0 || height == 0 {
        return Err(ChronoError::invalid_option("frame size must be non-zero"));
    }
    Ok((width, height))
}
