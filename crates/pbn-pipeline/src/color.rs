//! Colour-space conversion for clustering.
//!
//! K-means distances are measured in the configured space, so each
//! space is scaled to comparable magnitudes: RGB channels in 0..=255,
//! HSL as degrees and percentages, CIE-Lab with `L` in 0..=100.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Rgb;

/// Colour space in which k-means measures distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClusteringColorSpace {
    /// Raw sRGB channels.
    #[default]
    Rgb,
    /// Hue (degrees), saturation and lightness (percent).
    Hsl,
    /// CIE-Lab under the D65 white point.
    Lab,
}

impl ClusteringColorSpace {
    /// All variants in display order.
    pub const ALL: [Self; 3] = [Self::Rgb, Self::Hsl, Self::Lab];

    /// Convert an RGB colour into this space.
    #[must_use]
    pub fn from_rgb(self, rgb: Rgb) -> [f64; 3] {
        match self {
            Self::Rgb => rgb.map(f64::from),
            Self::Hsl => rgb_to_hsl(rgb),
            Self::Lab => rgb_to_lab(rgb),
        }
    }

    /// Convert a point in this space back to RGB, flooring and
    /// clamping every channel to `0..=255`.
    #[must_use]
    pub fn to_rgb(self, values: [f64; 3]) -> Rgb {
        let rgb = match self {
            Self::Rgb => values,
            Self::Hsl => hsl_to_rgb(values),
            Self::Lab => lab_to_rgb(values),
        };
        rgb.map(quantize_channel)
    }
}

impl fmt::Display for ClusteringColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rgb => write!(f, "RGB"),
            Self::Hsl => write!(f, "HSL"),
            Self::Lab => write!(f, "Lab"),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantize_channel(v: f64) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.floor().clamp(0.0, 255.0) as u8
    }
}

/// RGB to `[hue°, saturation %, lightness %]`.
#[must_use]
pub fn rgb_to_hsl(rgb: Rgb) -> [f64; 3] {
    let [r, g, b] = rgb.map(|c| f64::from(c) / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    let d = max - min;
    if d <= 0.0 {
        return [0.0, 0.0, l * 100.0];
    }
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    #[allow(clippy::float_cmp)]
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    [h * 60.0, s * 100.0, l * 100.0]
}

/// `[hue°, saturation %, lightness %]` to unclamped RGB channels.
#[must_use]
pub fn hsl_to_rgb(hsl: [f64; 3]) -> [f64; 3] {
    let h = hsl[0].rem_euclid(360.0) / 360.0;
    let s = hsl[1] / 100.0;
    let l = hsl[2] / 100.0;
    if s <= 0.0 {
        return [l * 255.0; 3];
    }
    let q = if l < 0.5 {
        l * (1.0 + s)
    } else {
        l + s - l * s
    };
    let p = 2.0f64.mul_add(l, -q);
    [
        hue_to_channel(p, q, h + 1.0 / 3.0) * 255.0,
        hue_to_channel(p, q, h) * 255.0,
        hue_to_channel(p, q, h - 1.0 / 3.0) * 255.0,
    ]
}

fn hue_to_channel(p: f64, q: f64, t: f64) -> f64 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        ((q - p) * 6.0).mul_add(t, p)
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        ((q - p) * (2.0 / 3.0 - t)).mul_add(6.0, p)
    } else {
        p
    }
}

// D65 reference white.
const XN: f64 = 0.950_47;
const YN: f64 = 1.0;
const ZN: f64 = 1.088_83;

fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f64) -> f64 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055f64.mul_add(c.powf(1.0 / 2.4), -0.055)
    }
}

fn lab_f(t: f64) -> f64 {
    const DELTA: f64 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

fn lab_f_inv(t: f64) -> f64 {
    const DELTA: f64 = 6.0 / 29.0;
    if t > DELTA {
        t * t * t
    } else {
        3.0 * DELTA * DELTA * (t - 4.0 / 29.0)
    }
}

/// RGB to CIE-Lab (D65).
#[must_use]
pub fn rgb_to_lab(rgb: Rgb) -> [f64; 3] {
    let [r, g, b] = rgb.map(|c| srgb_to_linear(f64::from(c) / 255.0));
    let x = 0.180_5f64.mul_add(b, 0.412_4f64.mul_add(r, 0.357_6 * g));
    let y = 0.072_2f64.mul_add(b, 0.212_6f64.mul_add(r, 0.715_2 * g));
    let z = 0.950_5f64.mul_add(b, 0.019_3f64.mul_add(r, 0.119_2 * g));

    let fx = lab_f(x / XN);
    let fy = lab_f(y / YN);
    let fz = lab_f(z / ZN);
    [
        116.0f64.mul_add(fy, -16.0),
        500.0 * (fx - fy),
        200.0 * (fy - fz),
    ]
}

/// CIE-Lab (D65) to unclamped RGB channels in `0..=255` scale.
#[must_use]
pub fn lab_to_rgb(lab: [f64; 3]) -> [f64; 3] {
    let fy = (lab[0] + 16.0) / 116.0;
    let fx = fy + lab[1] / 500.0;
    let fz = fy - lab[2] / 200.0;
    let x = XN * lab_f_inv(fx);
    let y = YN * lab_f_inv(fy);
    let z = ZN * lab_f_inv(fz);

    let r = (-0.498_6f64).mul_add(z, 3.240_6f64.mul_add(x, -1.537_2 * y));
    let g = 0.041_5f64.mul_add(z, (-0.968_9f64).mul_add(x, 1.875_8 * y));
    let b = 1.057_0f64.mul_add(z, 0.055_7f64.mul_add(x, -0.204_0 * y));
    [r, g, b].map(|c| linear_to_srgb(c.max(0.0)) * 255.0)
}

/// Parse a `#rrggbb` colour (the leading `#` is optional).
#[must_use]
pub fn parse_hex_color(s: &str) -> Option<Rgb> {
    let hex = s.trim().strip_prefix('#').unwrap_or_else(|| s.trim());
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

/// Format a colour as lowercase `#rrggbb`.
#[must_use]
pub fn to_hex(rgb: Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f64; 3], b: [f64; 3], tol: f64) -> bool {
        a.iter().zip(&b).all(|(x, y)| (x - y).abs() < tol)
    }

    #[test]
    fn hsl_primaries() {
        assert!(close(rgb_to_hsl([255, 0, 0]), [0.0, 100.0, 50.0], 1e-9));
        assert!(close(rgb_to_hsl([0, 255, 0]), [120.0, 100.0, 50.0], 1e-9));
        assert!(close(rgb_to_hsl([0, 0, 255]), [240.0, 100.0, 50.0], 1e-9));
        assert!(close(rgb_to_hsl([128, 128, 128]), [0.0, 0.0, 50.196], 1e-3));
    }

    #[test]
    fn hsl_round_trip_floors_back() {
        for rgb in [[255, 0, 0], [12, 200, 99], [0, 0, 0], [255, 255, 255], [77, 77, 78]] {
            let back = ClusteringColorSpace::Hsl.to_rgb(rgb_to_hsl(rgb));
            for (a, b) in back.iter().zip(&rgb) {
                assert!(a.abs_diff(*b) <= 1, "{rgb:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn lab_reference_values() {
        assert!(close(rgb_to_lab([255, 255, 255]), [100.0, 0.0, 0.0], 0.05));
        assert!(close(rgb_to_lab([0, 0, 0]), [0.0, 0.0, 0.0], 1e-9));
        // sRGB red is roughly (53.2, 80.1, 67.2).
        assert!(close(rgb_to_lab([255, 0, 0]), [53.24, 80.09, 67.20], 0.1));
    }

    #[test]
    fn lab_round_trip_within_one() {
        for rgb in [[255, 0, 0], [12, 200, 99], [0, 0, 0], [250, 250, 250], [40, 90, 160]] {
            let back = ClusteringColorSpace::Lab.to_rgb(rgb_to_lab(rgb));
            for (a, b) in back.iter().zip(&rgb) {
                assert!(a.abs_diff(*b) <= 1, "{rgb:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn to_rgb_clamps() {
        assert_eq!(
            ClusteringColorSpace::Rgb.to_rgb([-4.0, 300.0, 12.9]),
            [0, 255, 12]
        );
    }

    #[test]
    fn hex_parse_and_format() {
        assert_eq!(parse_hex_color("#ff8000"), Some([255, 128, 0]));
        assert_eq!(parse_hex_color("00Ff10"), Some([0, 255, 16]));
        assert_eq!(parse_hex_color("#ff80"), None);
        assert_eq!(parse_hex_color("#gg0000"), None);
        assert_eq!(to_hex([255, 128, 0]), "#ff8000");
    }
}
