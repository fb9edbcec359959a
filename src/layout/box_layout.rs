use std::collections::BTreeSet;

use crate::{
    foundation::core::Rect,
    foundation::error::{AnimError, AnimResult},
    layout::{DEFAULT_MARGIN, Layout, SlotGeometry, SlotSpec},
};

/// One box of a [`BoxLayout`] row, sized in percent of the content area.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoxSpec {
    pub slot: String,
    pub width_pct: f64,
    pub height_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub scalebar: bool,
}

impl BoxSpec {
    pub fn new(slot: impl Into<String>, width_pct: f64, height_pct: f64) -> Self {
        Self {
            slot: slot.into(),
            width_pct,
            height_pct,
            title: None,
            scalebar: false,
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_scalebar(mut self) -> Self {
        self.scalebar = true;
        self
    }
}

fn default_margin() -> f64 {
    DEFAULT_MARGIN
}

/// Rows of boxes laid out left to right. Each row is as tall as its tallest box.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoxLayout {
    pub rows: Vec<Vec<BoxSpec>>,
    #[serde(default = "default_margin")]
    pub margin: f64,
}

impl BoxLayout {
    pub fn new(rows: Vec<Vec<BoxSpec>>) -> AnimResult<Self> {
        let out = Self {
            rows,
            margin: DEFAULT_MARGIN,
        };
        out.validate()?;
        Ok(out)
    }

    /// One map panel taking three quarters of the width, with its legend on the right.
    pub fn panel_with_legend(panel: &str, legend: &str) -> Self {
        Self {
            rows: vec![vec![
                BoxSpec::new(panel, 75.0, 100.0).with_scalebar(),
                BoxSpec::new(legend, 25.0, 100.0),
            ]],
            margin: DEFAULT_MARGIN,
        }
    }

    /// Disturbance and indicator maps side by side above a chart flanked by their legends.
    pub fn indicator_overview(indicator_title: &str, chart_title: &str) -> Self {
        Self {
            rows: vec![
                vec![
                    BoxSpec::new("disturbances", 50.0, 60.0).titled("Disturbances"),
                    BoxSpec::new("indicator", 50.0, 60.0)
                        .titled(indicator_title)
                        .with_scalebar(),
                ],
                vec![
                    BoxSpec::new("disturbance_legend", 25.0, 40.0),
                    BoxSpec::new("chart", 50.0, 40.0).titled(chart_title),
                    BoxSpec::new("indicator_legend", 25.0, 40.0),
                ],
            ],
            margin: DEFAULT_MARGIN,
        }
    }

    pub fn with_margin(mut self, margin: f64) -> AnimResult<Self> {
        self.margin = margin;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> AnimResult<()> {
        if self.rows.iter().all(Vec::is_empty) {
            return Err(AnimError::layout("box layout has no boxes"));
        }
        if !(0.0..0.5).contains(&self.margin) {
            return Err(AnimError::layout("box layout margin must be within [0, 0.5)"));
        }
        let mut names = BTreeSet::new();
        for (i, row) in self.rows.iter().enumerate() {
            let mut width = 0.0;
            for b in row {
                let valid = |p: f64| p.is_finite() && p > 0.0 && p <= 100.0;
                if !valid(b.width_pct) || !valid(b.height_pct) {
                    return Err(AnimError::layout(format!(
                        "box '{}' size must be within (0, 100] percent",
                        b.slot
                    )));
                }
                if !names.insert(b.slot.as_str()) {
                    return Err(AnimError::layout(format!(
                        "box layout repeats slot '{}'",
                        b.slot
                    )));
                }
                width += b.width_pct;
            }
            if width > 100.0 + 1e-9 {
                return Err(AnimError::layout(format!(
                    "box layout row {i} is {width}% wide"
                )));
            }
        }
        Ok(())
    }
}

impl Layout for BoxLayout {
    fn name(&self) -> &str {
        "box"
    }

    fn slots(&self) -> Vec<SlotSpec> {
        self.rows
            .iter()
            .flatten()
            .map(|b| SlotSpec {
                name: b.slot.clone(),
                title: b.title.clone(),
                scalebar: b.scalebar,
            })
            .collect()
    }

    fn arrange(&self, area: Rect) -> Vec<SlotGeometry> {
        let mut out = Vec::new();
        let mut row_y = area.y0;
        for row in &self.rows {
            let mut x = area.x0;
            let mut row_bottom = row_y;
            for b in row {
                let w = (b.width_pct / 100.0 * area.width()).floor();
                let h = (b.height_pct / 100.0 * area.height()).floor();
                out.push(SlotGeometry {
                    name: b.slot.clone(),
                    rect: Rect::new(x, row_y, x + w, row_y + h),
                    title: b.title.clone(),
                    scalebar: b.scalebar,
                });
                x += w;
                row_bottom = row_bottom.max(row_y + h);
            }
            row_y = row_bottom;
        }
        out
    }

    fn margin(&self) -> f64 {
        self.margin
    }
}
