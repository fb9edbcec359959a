use std::{fmt, sync::Arc};

use crate::foundation::math::Fnv1a64;

/// 128-bit deterministic digest built from two independently seeded FNV-1a streams.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Fingerprint {
    pub hi: u64,
    pub lo: u64,
}

impl Fingerprint {
    pub fn to_hex(self) -> String {
        format!("{:016x}{:016x}", self.hi, self.lo)
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut kb = KeyBuilder::raw();
        kb.bytes(bytes);
        kb.finish()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Identity of one memoizable computation: the producing component plus a digest of every
/// parameter affecting its output.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    component: Arc<str>,
    id: Fingerprint,
}

impl CacheKey {
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn id(&self) -> Fingerprint {
        self.id
    }

    /// File-system safe name used by the disk store.
    pub fn file_stem(&self) -> String {
        let component: String = self
            .component
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{component}-{}", self.id.to_hex())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.component, self.id)
    }
}

/// Incremental builder for [`CacheKey`] and [`Fingerprint`] values.
///
/// Every write is length- or tag-prefixed so that adjacent fields cannot alias.
#[derive(Clone, Debug)]
pub struct KeyBuilder {
    component: Arc<str>,
    a: Fnv1a64,
    b: Fnv1a64,
}

impl KeyBuilder {
    pub fn new(component: &str) -> Self {
        let mut kb = Self {
            component: Arc::from(component),
            a: Fnv1a64::new(Fnv1a64::OFFSET_BASIS),
            b: Fnv1a64::new(Fnv1a64::ALT_BASIS),
        };
        kb.str(component);
        kb
    }

    fn raw() -> Self {
        Self {
            component: Arc::from(""),
            a: Fnv1a64::new(Fnv1a64::OFFSET_BASIS),
            b: Fnv1a64::new(Fnv1a64::ALT_BASIS),
        }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.a.write_u8(v);
        self.b.write_u8(v);
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.a.write_u64(v);
        self.b.write_u64(v);
        self
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.u64(v as u64)
    }

    pub fn f64(&mut self, v: f64) -> &mut Self {
        self.u64(v.to_bits())
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(u8::from(v))
    }

    pub fn str(&mut self, s: &str) -> &mut Self {
        self.u64(s.len() as u64);
        self.a.write_bytes(s.as_bytes());
        self.b.write_bytes(s.as_bytes());
        self
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.u64(bytes.len() as u64);
        self.a.write_bytes(bytes);
        self.b.write_bytes(bytes);
        self
    }

    /// Raw sample bits, length-prefixed.
    pub fn f32_slice(&mut self, values: &[f32]) -> &mut Self {
        self.u64(values.len() as u64);
        for v in values {
            let bytes = v.to_bits().to_le_bytes();
            self.a.write_bytes(&bytes);
            self.b.write_bytes(&bytes);
        }
        self
    }

    pub fn opt_str(&mut self, s: Option<&str>) -> &mut Self {
        match s {
            Some(s) => self.u8(1).str(s),
            None => self.u8(0),
        }
    }

    pub fn fingerprint(&mut self, fp: Fingerprint) -> &mut Self {
        self.u64(fp.hi).u64(fp.lo)
    }

    pub fn finish(&self) -> Fingerprint {
        Fingerprint {
            hi: self.a.finish(),
            lo: self.b.finish(),
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey {
            component: self.component.clone(),
            id: self.finish(),
        }
    }
}
