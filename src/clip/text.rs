use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clip::ClipSource;
use crate::foundation::error::{FramecutError, FramecutResult};
use crate::picture::Picture;

/// One run of text drawn at a fixed position of the target canvas.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextEntry {
    pub text: String,
    /// Left edge of the layout box, in target pixels.
    #[serde(default)]
    pub x: f32,
    /// Top edge of the layout box, in target pixels.
    #[serde(default)]
    pub y: f32,
    /// TrueType/OpenType file to shape with.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// 16-bit colour components.
    #[serde(default = "default_component")]
    pub r: u16,
    #[serde(default = "default_component")]
    pub g: u16,
    #[serde(default = "default_component")]
    pub b: u16,
    #[serde(default)]
    pub a: Option<f32>,
}

fn default_font_size() -> f32 {
    48.0
}

fn default_component() -> u16 {
    u16::MAX
}

impl TextEntry {
    pub fn new(text: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            font_path: None,
            font_size: default_font_size(),
            r: u16::MAX,
            g: u16::MAX,
            b: u16::MAX,
            a: None,
        }
    }

    pub fn with_font(mut self, path: impl Into<PathBuf>, size: f32) -> Self {
        self.font_path = Some(path.into());
        self.font_size = size;
        self
    }

    pub fn with_color(mut self, rgb: [u16; 3], alpha: Option<f32>) -> Self {
        [self.r, self.g, self.b] = rgb;
        self.a = alpha;
        self
    }

    fn brush(&self) -> TextBrush {
        TextBrush {
            r: to_u8(self.r),
            g: to_u8(self.g),
            b: to_u8(self.b),
            a: (self.a.unwrap_or(1.0).clamp(0.0, 1.0) * 255.0).round() as u8,
        }
    }
}

fn to_u8(v: u16) -> u8 {
    (v / 257) as u8
}

/// RGBA8 brush carried through Parley layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct TextBrush {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

/// Text entries rasterized onto a transparent canvas of the render target's size.
#[derive(Clone, Debug)]
pub struct TextSource {
    entries: Vec<TextEntry>,
    backdrop: Option<([u16; 3], f32)>,
    renderer: Arc<Mutex<TextRenderer>>,
}

impl TextSource {
    pub fn new(entries: Vec<TextEntry>) -> Self {
        Self {
            entries,
            backdrop: None,
            renderer: Arc::new(Mutex::new(TextRenderer::default())),
        }
    }

    /// Fill the canvas with a colour before drawing the text.
    pub fn with_backdrop(mut self, rgb: [u16; 3], alpha: f32) -> Self {
        self.backdrop = Some((rgb, alpha.clamp(0.0, 1.0)));
        self
    }

    pub fn entries(&self) -> &[TextEntry] {
        &self.entries
    }
}

impl ClipSource for TextSource {
    fn kind_name(&self) -> &str {
        "text"
    }

    fn frame_at(&self, _relative: u64, width: u32, height: u32) -> FramecutResult<Picture> {
        let mut renderer = self.renderer.lock();
        if let Some(p) = renderer.rendered.get(&(width, height)) {
            return Ok(p.clone());
        }
        let picture = renderer.rasterize(&self.entries, self.backdrop, width, height)?;
        renderer.rendered.insert((width, height), picture.clone());
        Ok(picture)
    }

    fn describe(&self) -> String {
        let entries = self
            .entries
            .iter()
            .map(|e| {
                format!(
                    "{}@{},{}:{:?}:{}:{},{},{}:{:?}",
                    e.text, e.x, e.y, e.font_path, e.font_size, e.r, e.g, e.b, e.a
                )
            })
            .collect::<Vec<_>>()
            .join("|");
        format!("text:{entries}:{:?}", self.backdrop)
    }

    fn reinit(&self) -> FramecutResult<()> {
        let mut renderer = self.renderer.lock();
        renderer.rendered.clear();
        renderer.fonts.clear();
        Ok(())
    }

    fn release(&self) {
        let mut renderer = self.renderer.lock();
        renderer.rendered.clear();
        renderer.fonts.clear();
    }
}

struct TextRenderer {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
    /// Loaded font bytes and the family name they registered; `None` when loading failed.
    fonts: HashMap<PathBuf, Option<(Arc<Vec<u8>>, String)>>,
    rendered: HashMap<(u32, u32), Picture>,
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            fonts: HashMap::new(),
            rendered: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for TextRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRenderer")
            .field("fonts", &self.fonts.len())
            .field("rendered", &self.rendered.len())
            .finish()
    }
}

impl TextRenderer {
    fn font(&mut self, path: &PathBuf) -> Option<(Arc<Vec<u8>>, String)> {
        if let Some(entry) = self.fonts.get(path) {
            return entry.clone();
        }
        let loaded = match std::fs::read(path) {
            Ok(bytes) => {
                let families = self
                    .font_ctx
                    .collection
                    .register_fonts(parley::fontique::Blob::from(bytes.clone()), None);
                families
                    .first()
                    .and_then(|(id, _)| self.font_ctx.collection.family_name(*id))
                    .map(|name| (Arc::new(bytes), name.to_string()))
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read font file");
                None
            }
        };
        self.fonts.insert(path.clone(), loaded.clone());
        loaded
    }

    fn layout(&mut self, entry: &TextEntry, family: &str) -> parley::Layout<TextBrush> {
        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, &entry.text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family.to_string())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(entry.font_size));
        builder.push_default(parley::style::StyleProperty::Brush(entry.brush()));
        let mut layout: parley::Layout<TextBrush> = builder.build(&entry.text);
        layout.break_all_lines(None);
        layout
    }

    fn rasterize(
        &mut self,
        entries: &[TextEntry],
        backdrop: Option<([u16; 3], f32)>,
        width: u32,
        height: u32,
    ) -> FramecutResult<Picture> {
        let w16 = u16::try_from(width)
            .map_err(|_| FramecutError::validation(format!("text canvas width {width} too large")))?;
        let h16 = u16::try_from(height).map_err(|_| {
            FramecutError::validation(format!("text canvas height {height} too large"))
        })?;

        let mut ctx = vello_cpu::RenderContext::new(w16, h16);
        if let Some((rgb, alpha)) = backdrop {
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                to_u8(rgb[0]),
                to_u8(rgb[1]),
                to_u8(rgb[2]),
                (alpha * 255.0).round() as u8,
            ));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                0.0,
                0.0,
                f64::from(width),
                f64::from(height),
            ));
        }

        for entry in entries {
            if entry.text.is_empty() {
                continue;
            }
            if !entry.font_size.is_finite() || entry.font_size <= 0.0 {
                return Err(FramecutError::validation(format!(
                    "text font_size must be finite and > 0, got {}",
                    entry.font_size
                )));
            }
            let Some(path) = entry.font_path.as_ref() else {
                tracing::warn!(text = %entry.text, "text entry has no font, skipping");
                continue;
            };
            let Some((bytes, family)) = self.font(path) else {
                tracing::warn!(path = %path.display(), "font unavailable, skipping text entry");
                continue;
            };

            let layout = self.layout(entry, &family);
            let font = vello_cpu::peniko::FontData::new(
                vello_cpu::peniko::Blob::from(bytes.as_ref().clone()),
                0,
            );
            ctx.set_transform(vello_cpu::kurbo::Affine::translate((
                f64::from(entry.x),
                f64::from(entry.y),
            )));
            for line in layout.lines() {
                for item in line.items() {
                    let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                        continue;
                    };
                    let brush = run.style().brush;
                    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                        brush.r, brush.g, brush.b, brush.a,
                    ));
                    // Positioned glyphs carry the run offset and the line baseline.
                    let glyphs = run.positioned_glyphs().map(|g| vello_cpu::Glyph {
                        id: g.id,
                        x: g.x,
                        y: g.y,
                    });
                    ctx.glyph_run(&font)
                        .font_size(run.run().font_size())
                        .fill_glyphs(glyphs);
                }
            }
        }
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);

        let mut pixmap = vello_cpu::Pixmap::new(w16, h16);
        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);

        let mut rgba = pixmap.data_as_u8_slice().to_vec();
        unpremultiply_rgba8(&mut rgba);
        let label = entries
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join(",");
        Ok(Picture::from_rgba8(width, height, &rgba)?.with_step(format!("text '{label}'")))
    }
}

fn unpremultiply_rgba8(px: &mut [u8]) {
    for p in px.chunks_exact_mut(4) {
        let a = u32::from(p[3]);
        if a == 0 {
            p[..3].fill(0);
            continue;
        }
        if a == 255 {
            continue;
        }
        for c in &mut p[..3] {
            *c = ((u32::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/clip/text.rs"]
mod tests;
