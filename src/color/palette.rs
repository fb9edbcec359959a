use crate::{
    foundation::core::Rgba8,
    foundation::error::{AnimError, AnimResult},
};

const DEEP: &[u32] = &[
    0x4C72B0, 0xDD8452, 0x55A868, 0xC44E52, 0x8172B3, 0x937860, 0xDA8BC3, 0x8C8C8C, 0xCCB974,
    0x64B5CD,
];

const RAMPS: &[(&str, &[u32])] = &[
    (
        "greens",
        &[0xf7fcf5, 0xe5f5e0, 0xc7e9c0, 0xa1d99b, 0x74c476, 0x41ab5d, 0x238b45, 0x006d2c, 0x00441b],
    ),
    (
        "reds",
        &[0xfff5f0, 0xfee0d2, 0xfcbba1, 0xfc9272, 0xfb6a4a, 0xef3b2c, 0xcb181d, 0xa50f15, 0x67000d],
    ),
    (
        "blues",
        &[0xf7fbff, 0xdeebf7, 0xc6dbef, 0x9ecae1, 0x6baed6, 0x4292c6, 0x2171b5, 0x08519c, 0x08306b],
    ),
    (
        "oranges",
        &[0xfff5eb, 0xfee6ce, 0xfdd0a2, 0xfdae6b, 0xfd8d3c, 0xf16913, 0xd94801, 0xa63603, 0x7f2704],
    ),
    (
        "purples",
        &[0xfcfbfd, 0xefedf5, 0xdadaeb, 0xbcbddc, 0x9e9ac8, 0x807dba, 0x6a51a3, 0x54278f, 0x3f007d],
    ),
    (
        "greys",
        &[0xffffff, 0xf0f0f0, 0xd9d9d9, 0xbdbdbd, 0x969696, 0x737373, 0x525252, 0x252525, 0x000000],
    ),
    (
        "ylorrd",
        &[0xffffcc, 0xffeda0, 0xfed976, 0xfeb24c, 0xfd8d3c, 0xfc4e2a, 0xe31a1c, 0xbd0026, 0x800026],
    ),
    (
        "ylgn",
        &[0xffffe5, 0xf7fcb9, 0xd9f0a3, 0xaddd8e, 0x78c679, 0x41ab5d, 0x238443, 0x006837, 0x004529],
    ),
    (
        "rdylgn",
        &[
            0xa50026, 0xd73027, 0xf46d43, 0xfdae61, 0xfee08b, 0xffffbf, 0xd9ef8b, 0xa6d96a,
            0x66bd63, 0x1a9850, 0x006837,
        ],
    ),
    (
        "viridis",
        &[
            0x440154, 0x482878, 0x3e4989, 0x31688e, 0x26828e, 0x1f9e89, 0x35b779, 0x6ece58,
            0xb5de2b, 0xfde725,
        ],
    ),
];

/// Named color palette producing `n` deterministic colors.
///
/// `hls` spaces hues evenly, `deep` cycles a fixed qualitative set, and the sequential ramps
/// (`Greens`, `Reds`, `Blues`, `Oranges`, `Purples`, `Greys`, `YlOrRd`, `YlGn`, `RdYlGn`,
/// `viridis`) are sampled at interior points so neither end of the ramp is used. A `_r`
/// suffix reverses a ramp.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Palette {
    name: String,
    kind: PaletteKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum PaletteKind {
    Hls,
    Qualitative(&'static [u32]),
    Ramp {
        stops: &'static [u32],
        reversed: bool,
    },
}

impl Palette {
    pub fn parse(name: &str) -> AnimResult<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let (base, reversed) = match lower.strip_suffix("_r") {
            Some(base) => (base, true),
            None => (lower.as_str(), false),
        };
        let kind = match base {
            "hls" | "husl" => PaletteKind::Hls,
            "deep" => PaletteKind::Qualitative(DEEP),
            _ => {
                let Some((_, stops)) = RAMPS.iter().find(|(n, _)| *n == base) else {
                    return Err(AnimError::validation(format!("unknown palette '{name}'")));
                };
                PaletteKind::Ramp { stops, reversed }
            }
        };
        Ok(Self {
            name: name.trim().to_string(),
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn colors(&self, n: usize) -> Vec<Rgba8> {
        match &self.kind {
            PaletteKind::Hls => hls_colors(n),
            PaletteKind::Qualitative(set) => (0..n).map(|i| hex(set[i % set.len()])).collect(),
            PaletteKind::Ramp { stops, reversed } => (1..=n)
                .map(|i| {
                    let t = i as f64 / (n + 1) as f64;
                    sample_ramp(stops, if *reversed { 1.0 - t } else { t })
                })
                .collect(),
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            name: "hls".to_string(),
            kind: PaletteKind::Hls,
        }
    }
}

fn hex(v: u32) -> Rgba8 {
    Rgba8::rgb((v >> 16) as u8, (v >> 8) as u8, v as u8)
}

fn unit_to_u8(x: f64) -> u8 {
    (x.clamp(0.0, 1.0) * 255.0) as u8
}

fn sample_ramp(stops: &[u32], t: f64) -> Rgba8 {
    let last = stops.len() - 1;
    let pos = t.clamp(0.0, 1.0) * last as f64;
    let i = (pos.floor() as usize).min(last);
    let j = (i + 1).min(last);
    let f = pos - i as f64;
    let (a, b) = (hex(stops[i]), hex(stops[j]));
    let lerp = |x: u8, y: u8| {
        unit_to_u8((f64::from(x) + (f64::from(y) - f64::from(x)) * f) / 255.0 + 1e-9)
    };
    Rgba8::rgb(lerp(a.r, b.r), lerp(a.g, b.g), lerp(a.b, b.b))
}

fn hls_colors(n: usize) -> Vec<Rgba8> {
    const H: f64 = 0.01;
    const L: f64 = 0.6;
    const S: f64 = 0.65;
    (0..n)
        .map(|i| {
            let hue = (i as f64 / n as f64 + H).fract();
            let (r, g, b) = hls_to_rgb(hue, L, S);
            Rgba8::rgb(unit_to_u8(r), unit_to_u8(g), unit_to_u8(b))
        })
        .collect()
}

fn hls_to_rgb(h: f64, l: f64, s: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (l, l, l);
    }
    let m2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let m1 = 2.0 * l - m2;
    (
        hue_channel(m1, m2, h + 1.0 / 3.0),
        hue_channel(m1, m2, h),
        hue_channel(m1, m2, h - 1.0 / 3.0),
    )
}

fn hue_channel(m1: f64, m2: f64, hue: f64) -> f64 {
    let hue = hue.rem_euclid(1.0);
    if hue < 1.0 / 6.0 {
        m1 + (m2 - m1) * hue * 6.0
    } else if hue < 0.5 {
        m2
    } else if hue < 2.0 / 3.0 {
        m1 + (m2 - m1) * (2.0 / 3.0 - hue) * 6.0
    } else {
        m1
    }
}
