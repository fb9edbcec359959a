use crate::{
    foundation::core::Rect,
    foundation::error::{AnimError, AnimResult},
    layout::{DEFAULT_MARGIN, Layout, SlotGeometry, SlotSpec},
};

pub const QUADRANTS: [&str; 4] = ["q1", "q2", "q3", "q4"];
pub const LEGEND_SLOT: &str = "legend";

fn default_titles() -> [Option<String>; 4] {
    Default::default()
}

fn default_scalebars() -> [bool; 4] {
    [false, true, false, false]
}

fn default_legend_pct() -> f64 {
    12.0
}

fn default_margin() -> f64 {
    DEFAULT_MARGIN
}

/// Four equal panels (`q1` top left, `q2` top right, `q3` bottom left, `q4` bottom right) above
/// a full-width legend strip.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuadrantLayout {
    #[serde(default = "default_titles")]
    pub titles: [Option<String>; 4],
    #[serde(default = "default_scalebars")]
    pub scalebars: [bool; 4],
    /// Legend strip height in percent of the content area; 0 drops the strip.
    #[serde(default = "default_legend_pct")]
    pub legend_pct: f64,
    #[serde(default = "default_margin")]
    pub margin: f64,
}

impl Default for QuadrantLayout {
    fn default() -> Self {
        Self {
            titles: default_titles(),
            scalebars: default_scalebars(),
            legend_pct: default_legend_pct(),
            margin: DEFAULT_MARGIN,
        }
    }
}

impl QuadrantLayout {
    pub fn with_titles(mut self, titles: [Option<String>; 4]) -> Self {
        self.titles = titles;
        self
    }

    pub fn validate(&self) -> AnimResult<()> {
        if !(0.0..100.0).contains(&self.legend_pct) {
            return Err(AnimError::layout(
                "quadrant legend strip must be within [0, 100) percent",
            ));
        }
        if !(0.0..0.5).contains(&self.margin) {
            return Err(AnimError::layout("quadrant margin must be within [0, 0.5)"));
        }
        Ok(())
    }
}

impl Layout for QuadrantLayout {
    fn name(&self) -> &str {
        "quadrant"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        let mut out: Vec<SlotSpec> = QUADRANTS
            .iter()
            .enumerate()
            .map(|(i, name)| SlotSpec {
                name: (*name).to_string(),
                title: self.titles[i].clone(),
                scalebar: self.scalebars[i],
            })
            .collect();
        if self.legend_pct > 0.0 {
            out.push(SlotSpec {
                name: LEGEND_SLOT.to_string(),
                title: None,
                scalebar: false,
            });
        }
        out
    }

    fn arrange(&self, area: Rect) -> Vec<SlotGeometry> {
        let legend_h = (area.height() * self.legend_pct / 100.0).floor();
        let half_w = (area.width() / 2.0).floor();
        let half_h = ((area.height() - legend_h) / 2.0).floor();
        let origins = [
            (area.x0, area.y0),
            (area.x0 + half_w, area.y0),
            (area.x0, area.y0 + half_h),
            (area.x0 + half_w, area.y0 + half_h),
        ];
        let mut out: Vec<SlotGeometry> = self
            .slots()
            .into_iter()
            .zip(origins)
            .map(|(spec, (x, y))| SlotGeometry {
                name: spec.name,
                rect: Rect::new(x, y, x + half_w, y + half_h),
                title: spec.title,
                scalebar: spec.scalebar,
            })
            .collect();
        if legend_h > 0.0 {
            let y = area.y0 + half_h * 2.0;
            out.push(SlotGeometry {
                name: LEGEND_SLOT.to_string(),
                rect: Rect::new(area.x0, y, area.x1, y + legend_h),
                title: None,
                scalebar: false,
            });
        }
        out
    }

    fn margin(&self) -> f64 {
        self.margin
    }
}
