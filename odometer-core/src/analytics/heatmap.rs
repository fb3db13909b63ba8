//! Keyboard heatmap normalization
//!
//! Raw per-key counts span several orders of magnitude (Space and Backspace
//! dwarf everything else), so intensities are log-compressed against a
//! 95th-percentile maximum instead of the raw maximum.

use crate::keys::canonicalize_counts;
use serde::Serialize;
use std::collections::BTreeMap;

/// Percentile of positive counts used as the saturation point
pub const ROBUST_PERCENTILE: f64 = 0.95;

/// Opacity applied to every heatmap color
pub const HEATMAP_ALPHA: u8 = 180;

/// Gradient stops from cold to hot: blue, cyan, green, yellow, orange, red
const GRADIENT: [(f64, [u8; 3]); 6] = [
    (0.0, [0, 0, 255]),
    (0.2, [0, 255, 255]),
    (0.4, [0, 255, 0]),
    (0.6, [255, 255, 0]),
    (0.8, [255, 165, 0]),
    (1.0, [255, 0, 0]),
];

/// An RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// `#rrggbbaa`
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

/// One key's place on the heatmap
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapCell {
    pub key: String,
    pub count: i64,
    pub intensity: f64,
    pub color: Rgba,
}

/// Saturation point for a set of counts: the 95th percentile of the
/// positive counts, floored at 1. `None` when no count is positive.
pub fn robust_max(counts: impl IntoIterator<Item = i64>) -> Option<i64> {
    let mut positive: Vec<i64> = counts.into_iter().filter(|&c| c > 0).collect();
    if positive.is_empty() {
        return None;
    }
    positive.sort_unstable();

    let n = positive.len();
    let idx = ((n as f64 * ROBUST_PERCENTILE).floor() as usize).min(n - 1);
    Some(positive[idx].max(1))
}

/// Map already-canonical key counts to intensities in `[0, 1]`.
///
/// Non-positive counts get intensity 0. Counts at or above the robust
/// maximum saturate at 1.
pub fn normalize(counts: &BTreeMap<String, i64>) -> BTreeMap<String, f64> {
    let Some(max) = robust_max(counts.values().copied()) else {
        return counts.keys().map(|k| (k.clone(), 0.0)).collect();
    };
    let denom = (max as f64 + 1.0).ln();

    counts
        .iter()
        .map(|(key, &count)| {
            let intensity = if count <= 0 {
                0.0
            } else {
                ((count as f64 + 1.0).ln() / denom).min(1.0)
            };
            (key.clone(), intensity)
        })
        .collect()
}

/// Color for an intensity; values outside `[0, 1]` are clamped.
pub fn color_of(intensity: f64) -> Rgba {
    let t = if intensity.is_nan() {
        0.0
    } else {
        intensity.clamp(0.0, 1.0)
    };

    let upper = GRADIENT
        .iter()
        .position(|(stop, _)| t <= *stop)
        .unwrap_or(GRADIENT.len() - 1)
        .max(1);
    let (lo_stop, lo) = GRADIENT[upper - 1];
    let (hi_stop, hi) = GRADIENT[upper];
    let f = (t - lo_stop) / (hi_stop - lo_stop);

    let channel = |i: usize| {
        let v = lo[i] as f64 + (hi[i] as f64 - lo[i] as f64) * f;
        v.round().clamp(0.0, 255.0) as u8
    };

    Rgba {
        r: channel(0),
        g: channel(1),
        b: channel(2),
        a: HEATMAP_ALPHA,
    }
}

/// Canonicalize raw key counts, then normalize and color them.
///
/// Cells are ordered by count descending, ties by key.
pub fn heatmap<'a, I>(raw: I) -> Vec<HeatmapCell>
where
    I: IntoIterator<Item = (&'a String, &'a i64)>,
{
    let counts = canonicalize_counts(raw);
    let intensities = normalize(&counts);

    let mut cells: Vec<HeatmapCell> = counts
        .into_iter()
        .map(|(key, count)| {
            let intensity = intensities.get(&key).copied().unwrap_or(0.0);
            HeatmapCell {
                color: color_of(intensity),
                key,
                count,
                intensity,
            }
        })
        .collect();

    cells.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    cells
}
