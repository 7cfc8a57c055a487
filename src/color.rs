use std::collections::{BTreeMap, BTreeSet};

use eframe::egui::Color32;
use palette::{Hsl, IntoColor, LinSrgb, Mix, Srgb};

use crate::data::model::Value;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            to_color32(rgb)
        })
        .collect()
}

fn to_color32(rgb: Srgb) -> Color32 {
    let rgb: Srgb<u8> = rgb.into_format();
    Color32::from_rgb(rgb.red, rgb.green, rgb.blue)
}

/// Parse an atlas colour string such as `#FA0087`.
pub fn parse_hex(s: &str) -> Option<Color32> {
    let rgb: Srgb<u8> = s.trim().parse().ok()?;
    Some(Color32::from_rgb(rgb.red, rgb.green, rgb.blue))
}

// ---------------------------------------------------------------------------
// Categorical mapping: value → Color32
// ---------------------------------------------------------------------------

/// Maps the distinct values of a column to colours. Values that are
/// themselves hex colours keep their own colour; anything else gets a
/// generated palette entry.
#[derive(Debug, Clone)]
pub struct ColorMap {
    mapping: BTreeMap<Value, Color32>,
    default_color: Color32,
}

impl ColorMap {
    /// Build a colour map from a column's unique values.
    pub fn new(unique_values: &BTreeSet<Value>) -> Self {
        let generated: Vec<&Value> = unique_values
            .iter()
            .filter(|v| v.as_str().and_then(parse_hex).is_none())
            .collect();
        let palette = generate_palette(generated.len());

        let mut mapping: BTreeMap<Value, Color32> = generated
            .into_iter()
            .zip(palette)
            .map(|(v, c)| (v.clone(), c))
            .collect();
        for v in unique_values {
            if let Some(c) = v.as_str().and_then(parse_hex) {
                mapping.insert(v.clone(), c);
            }
        }

        ColorMap {
            mapping,
            default_color: Color32::GRAY,
        }
    }

    /// Look up the colour for a given value.
    pub fn color_for(&self, value: &Value) -> Color32 {
        if value.is_null() {
            return self.default_color;
        }
        self.mapping
            .get(value)
            .copied()
            .unwrap_or(self.default_color)
    }
}

// ---------------------------------------------------------------------------
// Continuous mapping: scalar → Color32
// ---------------------------------------------------------------------------

/// Reversed magma: pale for low values, near-black for high ones.
const MAGMA_R: [(u8, u8, u8); 6] = [
    (252, 253, 191),
    (254, 159, 109),
    (222, 73, 104),
    (140, 41, 129),
    (59, 15, 112),
    (0, 0, 4),
];

/// Linear colour ramp over `[vmin, vmax]`; values outside are clamped.
#[derive(Debug, Clone)]
pub struct ContinuousColorMap {
    stops: Vec<LinSrgb>,
    pub vmin: f64,
    pub vmax: f64,
}

impl ContinuousColorMap {
    pub fn magma_r(vmin: f64, vmax: f64) -> Self {
        let stops = MAGMA_R
            .iter()
            .map(|&(r, g, b)| Srgb::new(r, g, b).into_format::<f32>().into_linear())
            .collect();
        Self { stops, vmin, vmax }
    }

    /// Fit the range to the finite values of `values`. `vmax` overrides the
    /// upper bound when given.
    pub fn fit(values: impl IntoIterator<Item = f64>, vmax: Option<f64>) -> Self {
        let (lo, hi) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        let (lo, hi) = if lo.is_finite() { (lo, hi) } else { (0.0, 1.0) };
        Self::magma_r(lo, vmax.unwrap_or(hi))
    }

    /// Position of `v` in the range, clamped to `[0, 1]`.
    pub fn normalize(&self, v: f64) -> f32 {
        let range = self.vmax - self.vmin;
        if range.abs() < f64::EPSILON {
            return 0.0;
        }
        ((v - self.vmin) / range).clamp(0.0, 1.0) as f32
    }

    pub fn color_at(&self, t: f32) -> Color32 {
        let t = t.clamp(0.0, 1.0);
        let segments = (self.stops.len() - 1) as f32;
        let pos = t * segments;
        let i = (pos.floor() as usize).min(self.stops.len() - 2);
        let mixed = self.stops[i].mix(self.stops[i + 1], pos - i as f32);
        to_color32(Srgb::from_linear(mixed))
    }

    pub fn color_for(&self, v: f64) -> Color32 {
        if !v.is_finite() {
            return Color32::GRAY;
        }
        self.color_at(self.normalize(v))
    }
}
