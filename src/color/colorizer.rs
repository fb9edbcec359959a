use crate::{
    cache::key::{Fingerprint, KeyBuilder},
    color::custom::{CustomColorizer, CustomEntry},
    color::legend::Legend,
    color::palette::Palette,
    color::quantile::{equal_interval_breaks, quantile_breaks},
    foundation::core::Rgba8,
    foundation::error::{AnimError, AnimResult},
};

/// One value class: values above the previous bin's `upper` and up to this `upper`.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueBin {
    pub upper: f64,
    pub color: Rgba8,
    pub label: String,
}

/// Ordered value classes shared by the quantile and equal-interval schemes.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeColorizer {
    title: String,
    bins: Vec<ValueBin>,
    zero_transparent: bool,
}

impl RangeColorizer {
    pub fn bins(&self) -> &[ValueBin] {
        &self.bins
    }

    fn bin_index(&self, value: f64) -> Option<usize> {
        if value.is_nan() || (self.zero_transparent && value == 0.0) || self.bins.is_empty() {
            return None;
        }
        let i = self.bins.partition_point(|b| b.upper < value);
        Some(i.min(self.bins.len() - 1))
    }

    fn legend(&self) -> Legend {
        let mut legend = Legend::new(self.title.clone());
        for b in &self.bins {
            legend.push(b.color, b.label.clone());
        }
        legend
    }

    fn write_key(&self, kb: &mut KeyBuilder) {
        kb.str(&self.title)
            .bool(self.zero_transparent)
            .u64(self.bins.len() as u64);
        for b in &self.bins {
            kb.f64(b.upper).str(&b.color.to_hex()).str(&b.label);
        }
    }
}

/// Value → color mapping with its legend. Bins are computed once at construction from the
/// full value population and never change afterwards.
#[derive(Clone, Debug, PartialEq)]
pub enum Colorizer {
    Quantile(RangeColorizer),
    EqualInterval(RangeColorizer),
    Custom(CustomColorizer),
}

impl Colorizer {
    /// Color for a valid (non-nodata) value. Zero and NaN map to transparent unless the
    /// scheme classifies them.
    pub fn classify(&self, value: f64) -> Rgba8 {
        match self {
            Self::Quantile(r) | Self::EqualInterval(r) => match r.bin_index(value) {
                Some(i) => r.bins[i].color,
                None => Rgba8::TRANSPARENT,
            },
            Self::Custom(c) => c.classify(value),
        }
    }

    pub fn bin_index(&self, value: f64) -> Option<usize> {
        match self {
            Self::Quantile(r) | Self::EqualInterval(r) => r.bin_index(value),
            Self::Custom(c) => c.bin_index(value),
        }
    }

    pub fn bin_count(&self) -> usize {
        match self {
            Self::Quantile(r) | Self::EqualInterval(r) => r.bins.len(),
            Self::Custom(c) => c.entries.len(),
        }
    }

    pub fn legend(&self) -> Legend {
        match self {
            Self::Quantile(r) | Self::EqualInterval(r) => r.legend(),
            Self::Custom(c) => c.legend(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let mut kb = KeyBuilder::new("colorizer");
        match self {
            Self::Quantile(r) => r.write_key(kb.u8(0)),
            Self::EqualInterval(r) => r.write_key(kb.u8(1)),
            Self::Custom(c) => c.write_key(kb.u8(2)),
        }
        kb.finish()
    }
}

fn default_bins() -> usize {
    6
}

fn default_palette() -> String {
    "hls".to_string()
}

fn default_true() -> bool {
    true
}

fn default_unclassified() -> Rgba8 {
    Rgba8::rgb(128, 128, 128)
}

/// Configured colorizer, turned into a [`Colorizer`] once the value population is known.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ColorizerSpec {
    Quantile {
        #[serde(default = "default_bins")]
        bins: usize,
        #[serde(default = "default_palette")]
        palette: String,
        /// Splits the range at zero: `bins / 2` negative classes from this palette.
        #[serde(default)]
        negative_palette: Option<String>,
        #[serde(default)]
        include_zero: bool,
        /// Single catch-all class used when the population is empty.
        #[serde(default)]
        empty_fallback: Option<Rgba8>,
    },
    EqualInterval {
        #[serde(default = "default_bins")]
        bins: usize,
        #[serde(default = "default_palette")]
        palette: String,
        #[serde(default = "default_true")]
        zero_transparent: bool,
        #[serde(default)]
        empty_fallback: Option<Rgba8>,
    },
    Custom {
        entries: Vec<CustomSpecEntry>,
        #[serde(default = "default_unclassified")]
        default_color: Rgba8,
    },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CustomSpecEntry {
    pub code: i64,
    pub color: Rgba8,
    pub label: String,
}

impl Default for ColorizerSpec {
    fn default() -> Self {
        Self::Quantile {
            bins: default_bins(),
            palette: default_palette(),
            negative_palette: None,
            include_zero: false,
            empty_fallback: None,
        }
    }
}

impl ColorizerSpec {
    pub fn validate(&self) -> AnimResult<()> {
        match self {
            Self::Quantile {
                bins,
                palette,
                negative_palette,
                ..
            } => {
                if *bins == 0 {
                    return Err(AnimError::validation("quantile colorizer needs bins >= 1"));
                }
                Palette::parse(palette)?;
                if let Some(neg) = negative_palette {
                    Palette::parse(neg)?;
                }
            }
            Self::EqualInterval { bins, palette, .. } => {
                if *bins == 0 {
                    return Err(AnimError::validation(
                        "equal interval colorizer needs bins >= 1",
                    ));
                }
                Palette::parse(palette)?;
            }
            Self::Custom { entries, .. } => {
                let mut codes: Vec<i64> = entries.iter().map(|e| e.code).collect();
                codes.sort_unstable();
                codes.dedup();
                if codes.len() != entries.len() {
                    return Err(AnimError::validation("custom colorizer repeats a code"));
                }
            }
        }
        Ok(())
    }

    /// Build the colorizer from every valid value the indicator will ever show.
    pub fn build(&self, title: &str, population: &[f32]) -> AnimResult<Colorizer> {
        self.validate()?;
        match self {
            Self::Quantile {
                bins,
                palette,
                negative_palette,
                include_zero,
                empty_fallback,
            } => {
                let mut values: Vec<f64> = population
                    .iter()
                    .filter(|v| v.is_finite() && (*include_zero || **v != 0.0))
                    .map(|v| f64::from(*v))
                    .collect();
                values.sort_by(f64::total_cmp);
                if values.is_empty() {
                    return fallback(title, *empty_fallback, !*include_zero)
                        .map(Colorizer::Quantile);
                }
                let palette = Palette::parse(palette)?;
                let bins = match negative_palette {
                    Some(neg) => split_bins(&values, *bins, &palette, &Palette::parse(neg)?),
                    None => simple_bins(&values, *bins, &palette),
                };
                Ok(Colorizer::Quantile(RangeColorizer {
                    title: title.to_string(),
                    bins,
                    zero_transparent: !*include_zero,
                }))
            }
            Self::EqualInterval {
                bins,
                palette,
                zero_transparent,
                empty_fallback,
            } => {
                let (min, max) = population
                    .iter()
                    .filter(|v| v.is_finite())
                    .fold(None, |acc: Option<(f64, f64)>, v| {
                        let v = f64::from(*v);
                        Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))))
                    })
                    .unwrap_or((f64::NAN, f64::NAN));
                if min.is_nan() {
                    return fallback(title, *empty_fallback, *zero_transparent)
                        .map(Colorizer::EqualInterval);
                }
                let colors = Palette::parse(palette)?.colors(*bins);
                let breaks = equal_interval_breaks(min, max, *bins);
                let size = (max - min + 1.0) / *bins as f64;
                let out = breaks
                    .iter()
                    .enumerate()
                    .map(|(i, upper)| {
                        let label = if i == 0 {
                            format!("<= {}", fmt2(*upper))
                        } else if i + 1 == breaks.len() {
                            format!("> {}", fmt2(upper - size))
                        } else {
                            format!("{} to {}", fmt2(breaks[i - 1]), fmt2(*upper))
                        };
                        ValueBin {
                            upper: *upper,
                            color: colors[i],
                            label,
                        }
                    })
                    .collect();
                Ok(Colorizer::EqualInterval(RangeColorizer {
                    title: title.to_string(),
                    bins: out,
                    zero_transparent: *zero_transparent,
                }))
            }
            Self::Custom {
                entries,
                default_color,
            } => Ok(Colorizer::Custom(CustomColorizer::new(
                title,
                entries
                    .iter()
                    .map(|e| {
                        (
                            e.code,
                            CustomEntry {
                                color: e.color,
                                label: e.label.clone(),
                            },
                        )
                    })
                    .collect(),
                *default_color,
            ))),
        }
    }
}

fn fmt2(v: f64) -> String {
    format!("{v:.2}")
}

fn fallback(
    title: &str,
    color: Option<Rgba8>,
    zero_transparent: bool,
) -> AnimResult<RangeColorizer> {
    let Some(color) = color else {
        return Err(AnimError::classification(format!(
            "'{title}' has no values to classify"
        )));
    };
    tracing::warn!(title, "empty value population; using fallback color");
    Ok(RangeColorizer {
        title: title.to_string(),
        bins: vec![ValueBin {
            upper: f64::INFINITY,
            color,
            label: "No data".to_string(),
        }],
        zero_transparent,
    })
}

fn simple_bins(sorted: &[f64], k: usize, palette: &Palette) -> Vec<ValueBin> {
    let colors = palette.colors(k);
    let breaks = quantile_breaks(sorted, k);
    breaks
        .iter()
        .enumerate()
        .map(|(i, upper)| ValueBin {
            upper: *upper,
            color: colors[i],
            label: if i == 0 {
                format!("<= {}", fmt2(*upper))
            } else {
                format!("{} to {}", fmt2(breaks[i - 1]), fmt2(*upper))
            },
        })
        .collect()
}

fn split_bins(sorted: &[f64], k: usize, positive: &Palette, negative: &Palette) -> Vec<ValueBin> {
    let half = (k / 2).max(1);
    let split = sorted.partition_point(|v| *v <= 0.0);
    let (neg, pos) = sorted.split_at(split);
    let mut out = Vec::new();

    let neg_breaks = quantile_breaks(neg, half);
    let neg_colors = negative.colors(half);
    for (i, upper) in neg_breaks.iter().enumerate() {
        let is_last = i + 1 == neg_breaks.len();
        let upper = if is_last && !pos.is_empty() { 0.0 } else { *upper };
        let label = if i == 0 {
            format!("<= {}", fmt2(upper))
        } else {
            format!("{} to {}", fmt2(neg_breaks[i - 1]), fmt2(upper))
        };
        out.push(ValueBin {
            upper,
            color: neg_colors[half - 1 - i],
            label,
        });
    }

    let pos_breaks = quantile_breaks(pos, half);
    let pos_colors = positive.colors(half);
    for (i, upper) in pos_breaks.iter().enumerate() {
        let lower = if i == 0 { 0.0 } else { pos_breaks[i - 1] };
        out.push(ValueBin {
            upper: *upper,
            color: pos_colors[i],
            label: format!("{} to {}", fmt2(lower), fmt2(*upper)),
        });
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/color/colorizer.rs"]
mod tests;
