/// Upper bounds of `k` quantile classes over an ascending-sorted population.
///
/// Bound `i` is the `i/k` quantile with linear interpolation between order statistics.
/// `k` is capped at the number of distinct values and repeated bounds are dropped, so
/// degenerate populations yield fewer than `k` classes. The last bound is always the
/// population maximum.
pub(crate) fn quantile_breaks(sorted: &[f64], k: usize) -> Vec<f64> {
    let n = sorted.len();
    if n == 0 || k == 0 {
        return Vec::new();
    }
    let distinct = 1 + sorted.windows(2).filter(|w| w[1] > w[0]).count();
    let k = k.min(distinct);
    let mut out: Vec<f64> = Vec::with_capacity(k);
    for i in 1..=k {
        let pos = (i as f64 / k as f64) * (n - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = (pos.ceil() as usize).min(n - 1);
        let v = if lo == hi {
            sorted[lo]
        } else {
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        };
        if out.last().is_none_or(|last| v > *last) {
            out.push(v);
        }
    }
    if let Some(last) = out.last_mut() {
        *last = sorted[n - 1];
    }
    out
}

/// Upper bounds of `k` equal-width classes spanning `[min - 0.5, max + 0.5]`.
pub(crate) fn equal_interval_breaks(min: f64, max: f64, k: usize) -> Vec<f64> {
    if k == 0 {
        return Vec::new();
    }
    let lo = min - 0.5;
    let hi = max + 0.5;
    let size = (hi - lo) / k as f64;
    (1..=k)
        .map(|i| if i == k { hi } else { lo + size * i as f64 })
        .collect()
}
