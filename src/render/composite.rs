use crate::{
    foundation::error::{AnimError, AnimResult},
    foundation::math::mul_div255_u8,
};

pub type PremulRgba8 = [u8; 4];

/// Source-over for one premultiplied pixel with an extra opacity factor.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255_u8(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255_u8(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255_u8(u16::from(src[i]), op);
        let dc = mul_div255_u8(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

/// Composite premultiplied RGBA8 over an opaque background and return straight RGBA8 with
/// alpha 255, ready for encoders.
pub fn flatten_to_opaque_rgba8(src_premul: &[u8], bg: PremulRgba8) -> AnimResult<Vec<u8>> {
    if !src_premul.len().is_multiple_of(4) {
        return Err(AnimError::render("rgba buffer length must be a multiple of 4"));
    }
    let bg = [bg[0], bg[1], bg[2], 255];
    let mut out = Vec::with_capacity(src_premul.len());
    for px in src_premul.chunks_exact(4) {
        let o = over(bg, [px[0], px[1], px[2], px[3]], 1.0);
        out.extend_from_slice(&[o[0], o[1], o[2], 255]);
    }
    Ok(out)
}

/// Convert premultiplied RGBA8 to straight alpha.
pub fn unpremultiply(px: PremulRgba8) -> [u8; 4] {
    let a = px[3];
    if a == 0 {
        return [0, 0, 0, 0];
    }
    if a == 255 {
        return px;
    }
    let un = |c: u8| ((u32::from(c) * 255 + u32::from(a) / 2) / u32::from(a)).min(255) as u8;
    [un(px[0]), un(px[1]), un(px[2]), a]
}
