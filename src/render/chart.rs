use crate::{
    cache::key::{Fingerprint, KeyBuilder},
    foundation::core::{Rgba8, Year},
    foundation::error::AnimResult,
    render::frame::FrameRGBA,
    render::svg::{Anchor, SvgDoc, SvgRasterizer},
};

/// A year-indexed series prepared for one frame: the points up to the frame's year, plus the
/// full axis ranges so every frame of an animation shares the same axes.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesChart {
    pub title: String,
    pub units: String,
    pub points: Vec<(Year, f64)>,
    /// Emphasized point, normally the frame's year.
    pub highlight: Option<Year>,
    pub x_range: (Year, Year),
    pub y_range: (f64, f64),
}

impl SeriesChart {
    pub fn fingerprint(&self) -> Fingerprint {
        let mut kb = KeyBuilder::new("series_chart");
        kb.str(&self.title)
            .str(&self.units)
            .i64(i64::from(self.x_range.0))
            .i64(i64::from(self.x_range.1))
            .f64(self.y_range.0)
            .f64(self.y_range.1)
            .u64(self.points.len() as u64);
        for (y, v) in &self.points {
            kb.i64(i64::from(*y)).f64(*v);
        }
        match self.highlight {
            Some(y) => kb.u8(1).i64(i64::from(y)),
            None => kb.u8(0),
        };
        kb.finish()
    }
}

/// Draws a [`SeriesChart`] into a panel image.
pub trait ChartRenderer: Send + Sync + std::fmt::Debug {
    /// Stable identity of the renderer and its styling, part of panel cache keys.
    fn identity(&self) -> String;

    fn render(
        &self,
        chart: &SeriesChart,
        width: u32,
        height: u32,
        svg: &SvgRasterizer,
    ) -> AnimResult<FrameRGBA>;
}

/// Minimal line chart: axes, a polyline through the points and a marker on the highlighted
/// year.
#[derive(Clone, Debug, PartialEq)]
pub struct SvgLineChart {
    pub line: Rgba8,
    pub highlight: Rgba8,
    pub axis: Rgba8,
    pub background: Rgba8,
}

impl Default for SvgLineChart {
    fn default() -> Self {
        Self {
            line: Rgba8::rgb(31, 119, 180),
            highlight: Rgba8::rgb(214, 39, 40),
            axis: Rgba8::rgb(64, 64, 64),
            background: Rgba8::WHITE,
        }
    }
}

impl ChartRenderer for SvgLineChart {
    fn identity(&self) -> String {
        format!(
            "svg_line:{}:{}:{}:{}",
            self.line.to_hex(),
            self.highlight.to_hex(),
            self.axis.to_hex(),
            self.background.to_hex()
        )
    }

    fn render(
        &self,
        chart: &SeriesChart,
        width: u32,
        height: u32,
        svg: &SvgRasterizer,
    ) -> AnimResult<FrameRGBA> {
        let (w, h) = (f64::from(width), f64::from(height));
        let font = (h / 16.0).clamp(8.0, 24.0);
        let left = font * 4.0;
        let right = font;
        let top = font * 2.0;
        let bottom = font * 2.5;
        let plot_w = (w - left - right).max(1.0);
        let plot_h = (h - top - bottom).max(1.0);

        let (x0, x1) = chart.x_range;
        let x_span = f64::from((x1 - x0).max(1));
        let (mut y0, mut y1) = chart.y_range;
        if !(y0.is_finite() && y1.is_finite()) {
            (y0, y1) = (0.0, 1.0);
        }
        if y1 <= y0 {
            y1 = y0 + 1.0;
        }
        let px = |year: Year| left + f64::from(year - x0) / x_span * plot_w;
        let py = |v: f64| top + (1.0 - (v - y0) / (y1 - y0)) * plot_h;

        let mut doc = SvgDoc::new(width, height);
        doc.rect(0.0, 0.0, w, h, self.background);
        doc.text(w / 2.0, font * 1.3, font * 1.1, Anchor::Middle, true, self.axis, &chart.title);
        doc.line((left, top), (left, top + plot_h), self.axis, 1.0);
        doc.line((left, top + plot_h), (left + plot_w, top + plot_h), self.axis, 1.0);
        if y0 < 0.0 && y1 > 0.0 {
            doc.line(
                (left, py(0.0)),
                (left + plot_w, py(0.0)),
                self.axis.with_alpha(96),
                1.0,
            );
        }

        let label = |v: f64| {
            if chart.units.is_empty() {
                format!("{v:.1}")
            } else {
                format!("{v:.1} {}", chart.units)
            }
        };
        doc.text(left - 4.0, top + font * 0.4, font * 0.8, Anchor::End, false, self.axis, &label(y1));
        doc.text(left - 4.0, top + plot_h, font * 0.8, Anchor::End, false, self.axis, &label(y0));
        let axis_y = top + plot_h + font * 1.2;
        doc.text(left, axis_y, font * 0.8, Anchor::Start, false, self.axis, &x0.to_string());
        doc.text(left + plot_w, axis_y, font * 0.8, Anchor::End, false, self.axis, &x1.to_string());

        let points: Vec<(f64, f64)> = chart
            .points
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(y, v)| (px(*y), py(*v)))
            .collect();
        doc.polyline(&points, self.line, (font / 6.0).max(1.5));
        if let Some(year) = chart.highlight
            && let Some((_, v)) = chart.points.iter().find(|(y, v)| *y == year && v.is_finite())
        {
            doc.circle(px(year), py(*v), font / 3.0, self.highlight);
            doc.text(
                px(year),
                axis_y,
                font * 0.8,
                Anchor::Middle,
                true,
                self.highlight,
                &year.to_string(),
            );
        }
        svg.rasterize(&doc.finish(), width, height)
    }
}
