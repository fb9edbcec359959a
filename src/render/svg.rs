use std::{fmt::Write as _, path::Path, sync::Arc};

use anyhow::Context;

use crate::{
    foundation::core::Rgba8,
    foundation::error::{AnimError, AnimResult},
    render::frame::FrameRGBA,
};

const MAX_DIM: u32 = 16_384;

/// Rasterizes generated SVG (titles, legends, scalebars, charts) with a font database that is
/// built once per run.
#[derive(Clone)]
pub struct SvgRasterizer {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl std::fmt::Debug for SvgRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvgRasterizer")
            .field("faces", &self.fontdb.len())
            .finish()
    }
}

impl SvgRasterizer {
    /// System fonts plus any `.ttf`/`.otf`/`.ttc` files in `font_dir`.
    pub fn new(font_dir: Option<&Path>) -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        if let Some(dir) = font_dir {
            load_fonts_from_dir(&mut db, dir);
        }
        tracing::debug!(faces = db.len(), "font database ready");
        Self {
            fontdb: Arc::new(db),
        }
    }

    pub fn has_fonts(&self) -> bool {
        !self.fontdb.is_empty()
    }

    pub fn rasterize(&self, svg: &str, width: u32, height: u32) -> AnimResult<FrameRGBA> {
        if width == 0 || height == 0 || width > MAX_DIM || height > MAX_DIM {
            return Err(AnimError::render(format!(
                "svg raster size out of range: {width}x{height}"
            )));
        }
        let opts = usvg::Options {
            fontdb: self.fontdb.clone(),
            font_resolver: make_font_resolver(),
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(svg, &opts).context("parse generated svg")?;

        let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| AnimError::render("failed to allocate svg pixmap"))?;
        let sx = (width as f32) / tree.size().width();
        let sy = (height as f32) / tree.size().height();
        let xform = resvg::tiny_skia::Transform::from_scale(sx, sy);
        resvg::render(&tree, xform, &mut pixmap.as_mut());

        FrameRGBA::from_premul(width, height, pixmap.data().to_vec())
    }
}

fn load_fonts_from_dir(db: &mut usvg::fontdb::Database, dir: &Path) {
    let Ok(rd) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in rd.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            continue;
        };
        let ext = ext.to_ascii_lowercase();
        if ext != "ttf" && ext != "otf" && ext != "ttc" {
            continue;
        }
        let _ = db.load_font_file(&path);
    }
}

fn make_font_resolver() -> usvg::FontResolver<'static> {
    use usvg::FontResolver;

    FontResolver {
        select_font: Box::new(|font, fontdb| {
            let mut families = Vec::<usvg::fontdb::Family<'_>>::new();
            for family in font.families() {
                families.push(match family {
                    usvg::FontFamily::Serif => usvg::fontdb::Family::Serif,
                    usvg::FontFamily::SansSerif => usvg::fontdb::Family::SansSerif,
                    usvg::FontFamily::Cursive => usvg::fontdb::Family::Cursive,
                    usvg::FontFamily::Fantasy => usvg::fontdb::Family::Fantasy,
                    usvg::FontFamily::Monospace => usvg::fontdb::Family::Monospace,
                    usvg::FontFamily::Named(s) => usvg::fontdb::Family::Name(s),
                });
            }
            families.push(usvg::fontdb::Family::SansSerif);

            let query = usvg::fontdb::Query {
                families: &families,
                weight: usvg::fontdb::Weight(font.weight()),
                stretch: usvg::fontdb::Stretch::Normal,
                style: usvg::fontdb::Style::Normal,
            };
            if let Some(id) = fontdb.query(&query) {
                return Some(id);
            }
            // Fall back to any installed face.
            fontdb.faces().next().map(|f| f.id)
        }),
        select_fallback: FontResolver::default_fallback_selector(),
    }
}

/// Horizontal anchor of a text run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Middle,
    End,
}

impl Anchor {
    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Middle => "middle",
            Self::End => "end",
        }
    }
}

/// Small builder for the SVG documents drawn on frames.
#[derive(Clone, Debug)]
pub struct SvgDoc {
    width: u32,
    height: u32,
    body: String,
}

impl SvgDoc {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            body: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: Rgba8) -> &mut Self {
        let _ = write!(
            self.body,
            r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" {}/>"#,
            paint("fill", fill)
        );
        self
    }

    pub fn outline(&mut self, x: f64, y: f64, w: f64, h: f64, stroke: Rgba8) -> &mut Self {
        let _ = write!(
            self.body,
            r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" fill="none" {} stroke-width="1"/>"#,
            paint("stroke", stroke)
        );
        self
    }

    pub fn line(&mut self, from: (f64, f64), to: (f64, f64), stroke: Rgba8, width: f64) -> &mut Self {
        let _ = write!(
            self.body,
            r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" {} stroke-width="{width:.2}"/>"#,
            from.0,
            from.1,
            to.0,
            to.1,
            paint("stroke", stroke)
        );
        self
    }

    pub fn polyline(&mut self, points: &[(f64, f64)], stroke: Rgba8, width: f64) -> &mut Self {
        if points.is_empty() {
            return self;
        }
        let pts: Vec<String> = points
            .iter()
            .map(|(x, y)| format!("{x:.2},{y:.2}"))
            .collect();
        let _ = write!(
            self.body,
            r#"<polyline points="{}" fill="none" {} stroke-width="{width:.2}" stroke-linejoin="round"/>"#,
            pts.join(" "),
            paint("stroke", stroke)
        );
        self
    }

    pub fn circle(&mut self, cx: f64, cy: f64, r: f64, fill: Rgba8) -> &mut Self {
        let _ = write!(
            self.body,
            r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{r:.2}" {}/>"#,
            paint("fill", fill)
        );
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn text(
        &mut self,
        x: f64,
        y: f64,
        size: f64,
        anchor: Anchor,
        bold: bool,
        fill: Rgba8,
        text: &str,
    ) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        let _ = write!(
            self.body,
            r#"<text x="{x:.2}" y="{y:.2}" font-family="sans-serif" font-size="{size:.2}" text-anchor="{}" font-weight="{}" {}>{}</text>"#,
            anchor.as_str(),
            if bold { "bold" } else { "normal" },
            paint("fill", fill),
            escape_xml(text)
        );
        self
    }

    pub fn finish(&self) -> String {
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">{}</svg>"#,
            self.body,
            w = self.width,
            h = self.height
        )
    }
}

fn paint(attr: &str, c: Rgba8) -> String {
    let rgb = format!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b);
    if c.a == 255 {
        format!(r#"{attr}="{rgb}""#)
    } else {
        format!(
            r#"{attr}="{rgb}" {attr}-opacity="{:.3}""#,
            f64::from(c.a) / 255.0
        )
    }
}

pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
