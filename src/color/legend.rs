use crate::{
    cache::key::{Fingerprint, KeyBuilder},
    foundation::core::Rgba8,
    foundation::error::AnimResult,
    render::frame::FrameRGBA,
    render::svg::{Anchor, SvgDoc, SvgRasterizer},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegendEntry {
    pub color: Rgba8,
    pub label: String,
}

/// Ordered color/label pairs describing a colorizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Legend {
    pub title: String,
    pub entries: Vec<LegendEntry>,
}

impl Legend {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, color: Rgba8, label: impl Into<String>) {
        self.entries.push(LegendEntry {
            color,
            label: label.into(),
        });
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let mut kb = KeyBuilder::new("legend");
        kb.str(&self.title).u64(self.entries.len() as u64);
        for e in &self.entries {
            kb.str(&e.color.to_hex()).str(&e.label);
        }
        kb.finish()
    }

    fn draw(&self, doc: &mut SvgDoc, x: f64, y: f64, w: f64, h: f64) {
        let rows = self.entries.len() as f64 + 1.5;
        let row_h = (h / rows).min(w / 5.0).max(4.0);
        let font = row_h * 0.6;
        let swatch = row_h * 0.75;
        let text = Rgba8::rgb(32, 32, 32);

        doc.text(x + 2.0, y + font, font * 1.1, Anchor::Start, true, text, &self.title);
        let mut cy = y + row_h * 1.5;
        for e in &self.entries {
            doc.rect(x + 2.0, cy, swatch, swatch, e.color);
            doc.outline(x + 2.0, cy, swatch, swatch, Rgba8::rgb(96, 96, 96));
            doc.text(
                x + swatch + row_h * 0.5,
                cy + swatch * 0.8,
                font,
                Anchor::Start,
                false,
                text,
                &e.label,
            );
            cy += row_h;
        }
    }

    /// Render on a transparent background at exactly `width`x`height`.
    pub fn render(&self, width: u32, height: u32, svg: &SvgRasterizer) -> AnimResult<FrameRGBA> {
        render_legends(std::slice::from_ref(self), width, height, svg)
    }
}

/// Render several legends into one image: side by side when the area is wider than tall,
/// stacked otherwise.
pub fn render_legends(
    legends: &[Legend],
    width: u32,
    height: u32,
    svg: &SvgRasterizer,
) -> AnimResult<FrameRGBA> {
    let mut doc = SvgDoc::new(width, height);
    let n = legends.len().max(1) as f64;
    let (w, h) = (f64::from(width), f64::from(height));
    let across = w > h;
    for (i, legend) in legends.iter().enumerate() {
        let i = i as f64;
        if across {
            legend.draw(&mut doc, i * w / n, 0.0, w / n, h);
        } else {
            legend.draw(&mut doc, 0.0, i * h / n, w, h / n);
        }
    }
    svg.rasterize(&doc.finish(), width, height)
}
