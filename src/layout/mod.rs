use std::collections::BTreeMap;

use crate::{
    cache::key::KeyBuilder,
    foundation::core::{Canvas, Rect, Rgba8},
    foundation::error::{AnimError, AnimResult},
    render::frame::FrameRGBA,
    render::svg::{Anchor, SvgDoc, SvgRasterizer},
};

/// Rows of percentage-sized boxes.
pub mod box_layout;
/// Four panels and a legend strip.
pub mod quadrant;

pub use box_layout::{BoxLayout, BoxSpec};
pub use quadrant::QuadrantLayout;

/// Outer margin, as a fraction of the canvas, used unless a layout overrides it.
pub const DEFAULT_MARGIN: f64 = 0.025;

const TEXT: Rgba8 = Rgba8::BLACK;

/// A named slot a layout offers for content.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SlotSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub scalebar: bool,
}

/// A slot placed on a canvas.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotGeometry {
    pub name: String,
    pub rect: Rect,
    pub title: Option<String>,
    pub scalebar: bool,
}

/// Arrangement of named slots on a frame.
pub trait Layout: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn slots(&self) -> Vec<SlotSpec>;

    /// Place the slots inside `area`, the canvas minus margins and the title band.
    fn arrange(&self, area: Rect) -> Vec<SlotGeometry>;

    fn margin(&self) -> f64 {
        DEFAULT_MARGIN
    }

    /// Slot boxes on `canvas`. A frame title takes a band at the top.
    fn geometry(&self, canvas: Canvas, titled: bool) -> Vec<SlotGeometry> {
        self.arrange(content_area(canvas, self.margin(), titled))
    }
}

fn title_band(canvas: Canvas) -> (f64, f64) {
    let h = f64::from(canvas.height);
    let font = (h * 0.05).max(6.0);
    (font, font + h * 0.01)
}

fn box_title_font(canvas: Canvas) -> f64 {
    (f64::from(canvas.height) * 0.025).max(6.0)
}

/// Canvas minus the outer margin, and minus the title band when `titled`.
pub fn content_area(canvas: Canvas, margin: f64, titled: bool) -> Rect {
    let (w, h) = (f64::from(canvas.width), f64::from(canvas.height));
    let x0 = (w * margin / 2.0).floor();
    let mut y0 = (h * margin / 2.0).floor();
    let width = (w * (1.0 - margin * 1.5)).floor();
    let mut height = (h * (1.0 - margin * 1.5)).floor();
    if titled {
        let (_, band) = title_band(canvas);
        y0 += band;
        height -= band;
    }
    Rect::new(x0, y0, x0 + width, y0 + height.max(1.0))
}

/// Hash the layout's placement on `canvas`; part of frame cache keys.
pub(crate) fn write_layout_key<L: Layout + ?Sized>(
    layout: &L,
    canvas: Canvas,
    titled: bool,
    kb: &mut KeyBuilder,
) {
    kb.str(layout.name())
        .u64(u64::from(canvas.width))
        .u64(u64::from(canvas.height))
        .f64(layout.margin())
        .bool(titled);
    for g in layout.geometry(canvas, titled) {
        kb.str(&g.name)
            .f64(g.rect.x0)
            .f64(g.rect.y0)
            .f64(g.rect.x1)
            .f64(g.rect.y1)
            .opt_str(g.title.as_deref())
            .bool(g.scalebar);
    }
}

/// Place each slot's content on a white canvas: scaled to fit its box with the aspect ratio
/// kept, centered inside the layout margin, under the box title. Scalebars use the panel's
/// metres-per-pixel scale and are skipped for panels without one.
///
/// Content for a slot the layout does not define is an error; slots without content stay
/// blank.
#[tracing::instrument(skip_all, fields(layout = %layout.name(), slots = contents.len()))]
pub fn compose<L: Layout + ?Sized>(
    layout: &L,
    contents: &BTreeMap<String, FrameRGBA>,
    title: Option<&str>,
    canvas: Canvas,
    svg: &SvgRasterizer,
) -> AnimResult<FrameRGBA> {
    let title = title.filter(|t| !t.is_empty());
    let geoms = layout.geometry(canvas, title.is_some());
    if let Some(name) = contents
        .keys()
        .find(|name| !geoms.iter().any(|g| &g.name == *name))
    {
        return Err(AnimError::layout(format!(
            "layout '{}' has no slot named '{name}'",
            layout.name()
        )));
    }

    let margin = layout.margin();
    let mut base = FrameRGBA::filled(canvas.width, canvas.height, Rgba8::WHITE);
    let mut doc = SvgDoc::new(canvas.width, canvas.height);

    if let Some(title) = title {
        let (font, _) = title_band(canvas);
        let top = (f64::from(canvas.height) * margin / 2.0).floor();
        doc.text(
            f64::from(canvas.width) / 2.0,
            top + font * 0.85,
            font,
            Anchor::Middle,
            true,
            TEXT,
            title,
        );
    }

    let font = box_title_font(canvas);
    for g in &geoms {
        let Some(frame) = contents.get(&g.name) else {
            continue;
        };
        let r = g.rect;
        let title_h = if g.title.is_some() {
            font * 1.2 + f64::from(canvas.height) * 0.01
        } else {
            0.0
        };
        let max_w = (r.width() * (1.0 - margin * 2.0)).floor().max(1.0) as u32;
        let max_h = ((r.height() - title_h) * (1.0 - margin * 2.0))
            .floor()
            .max(1.0) as u32;
        let fitted = frame.fit_within(max_w, max_h);
        let x = r.x0 + (r.width() - f64::from(fitted.width)) / 2.0;
        let y = r.y0 + title_h + (r.height() - title_h - f64::from(fitted.height)) / 2.0;
        base.draw_over(&fitted, x.floor() as i64, y.floor() as i64, 1.0);

        if let Some(t) = &g.title {
            doc.text(
                r.x0 + r.width() / 2.0,
                r.y0 + font,
                font,
                Anchor::Middle,
                false,
                TEXT,
                t,
            );
        }
        if g.scalebar
            && let Some(scale) = fitted.scale_m
        {
            scalebar(&mut doc, r, scale);
        }
    }

    if !doc.is_empty() {
        let overlay = svg.rasterize(&doc.finish(), canvas.width, canvas.height)?;
        base.draw_over(&overlay, 0, 0, 1.0);
    }
    let data = base.flatten(Rgba8::WHITE)?;
    FrameRGBA::from_premul(canvas.width, canvas.height, data)
}

/// Bar a fifth of the box wide in the bottom-right corner, labelled in kilometres.
fn scalebar(doc: &mut SvgDoc, r: Rect, scale_m: f64) {
    let length_px = (r.width() / 5.0).floor();
    let km = length_px * scale_m / 1000.0;
    let bar_h = (r.height() / 20.0).max(4.0);
    let font = bar_h * 0.6;
    let line_w = (bar_h - font).max(1.0);
    let ink = TEXT.with_alpha(128);
    let y = r.y1 - font - line_w / 2.0;
    doc.line((r.x1 - length_px, y), (r.x1, y), ink, line_w);
    doc.text(r.x1, r.y1, font, Anchor::End, false, ink, &format!("{km:.2} km"));
}

/// Layout selected by a configuration document.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayoutSpec {
    Box(BoxLayout),
    Quadrant(QuadrantLayout),
}

impl LayoutSpec {
    pub fn validate(&self) -> AnimResult<()> {
        match self {
            Self::Box(l) => l.validate(),
            Self::Quadrant(l) => l.validate(),
        }
    }
}

impl Default for LayoutSpec {
    fn default() -> Self {
        Self::Box(BoxLayout::panel_with_legend("map", "legend"))
    }
}

impl Layout for LayoutSpec {
    fn name(&self) -> &str {
        match self {
            Self::Box(l) => l.name(),
            Self::Quadrant(l) => l.name(),
        }
    }

    fn slots(&self) -> Vec<SlotSpec> {
        match self {
            Self::Box(l) => l.slots(),
            Self::Quadrant(l) => l.slots(),
        }
    }

    fn arrange(&self, area: Rect) -> Vec<SlotGeometry> {
        match self {
            Self::Box(l) => l.arrange(area),
            Self::Quadrant(l) => l.arrange(area),
        }
    }

    fn margin(&self) -> f64 {
        match self {
            Self::Box(l) => l.margin(),
            Self::Quadrant(l) => l.margin(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layout/compose.rs"]
mod tests;
