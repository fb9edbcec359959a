use std::collections::BTreeMap;

use crate::{
    cache::key::KeyBuilder,
    color::legend::Legend,
    foundation::core::Rgba8,
};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CustomEntry {
    pub color: Rgba8,
    pub label: String,
}

/// Explicit code → color/label table. Never inspects the data; codes missing from the
/// table use `default_color`.
#[derive(Clone, Debug, PartialEq)]
pub struct CustomColorizer {
    pub(crate) title: String,
    pub(crate) entries: BTreeMap<i64, CustomEntry>,
    pub(crate) default_color: Rgba8,
}

impl CustomColorizer {
    pub fn new(
        title: impl Into<String>,
        entries: BTreeMap<i64, CustomEntry>,
        default_color: Rgba8,
    ) -> Self {
        Self {
            title: title.into(),
            entries,
            default_color,
        }
    }

    pub fn entries(&self) -> &BTreeMap<i64, CustomEntry> {
        &self.entries
    }

    pub fn default_color(&self) -> Rgba8 {
        self.default_color
    }

    fn code(value: f64) -> Option<i64> {
        (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
    }

    pub(crate) fn classify(&self, value: f64) -> Rgba8 {
        let code = Self::code(value);
        match code.and_then(|c| self.entries.get(&c)) {
            Some(entry) => entry.color,
            None if value.is_nan() => Rgba8::TRANSPARENT,
            None => self.default_color,
        }
    }

    pub(crate) fn bin_index(&self, value: f64) -> Option<usize> {
        let code = Self::code(value)?;
        self.entries.keys().position(|k| *k == code)
    }

    /// One entry per distinct label/color pair, in code order.
    pub(crate) fn legend(&self) -> Legend {
        let mut legend = Legend::new(self.title.clone());
        for entry in self.entries.values() {
            let seen = legend
                .entries
                .iter()
                .any(|e| e.label == entry.label && e.color == entry.color);
            if !seen {
                legend.push(entry.color, entry.label.clone());
            }
        }
        legend
    }

    pub(crate) fn write_key(&self, kb: &mut KeyBuilder) {
        kb.str(&self.title)
            .str(&self.default_color.to_hex())
            .u64(self.entries.len() as u64);
        for (code, e) in &self.entries {
            kb.i64(*code).str(&e.color.to_hex()).str(&e.label);
        }
    }
}
