//! SIAF-style aperture definitions and science/telescope frame transforms.
//!
//! An aperture ties a named detector region to the telescope V2/V3 frame:
//!
//! ```text
//! idl_x = (x - XSciRef) · XSciScale
//! idl_y = (y - YSciRef) · YSciScale
//! V2    = V2Ref + P · idl_x · cos(θ) + idl_y · sin(θ)
//! V3    = V3Ref - P · idl_x · sin(θ) + idl_y · cos(θ)
//! ```
//!
//! where θ is `V3IdlYAngle` and P is the ideal-frame parity (-1 for all JWST
//! science instruments). All angular quantities are in arcseconds.

use serde::{Deserialize, Serialize};

/// How an aperture relates to detector pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApertureKind {
    /// Full-frame or subarray region with its own pixel geometry
    Plain,
    /// Sky-only reference position (fixed slits, NIRSpec IFU, MIRI LRS)
    Slit,
    /// Multi-region aperture with no full-frame entry (MIRI MRS channels)
    Compound,
}

/// Second-order-and-up polynomial distortion of the science frame.
///
/// Terms are (p, q) with 2 ≤ p+q ≤ order, ordered by increasing sum and then
/// decreasing p. Inputs are pixel offsets from the reference pixel divided by
/// `scale`; outputs are pixel corrections multiplied by `scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SciDistortion {
    pub order: u32,
    pub scale: f64,
    pub a_coeffs: Vec<f64>,
    pub b_coeffs: Vec<f64>,
}

impl SciDistortion {
    /// Identity model of the given order.
    pub fn zero(order: u32, scale: f64) -> Self {
        let n = num_coeffs(order);
        Self {
            order,
            scale,
            a_coeffs: vec![0.0; n],
            b_coeffs: vec![0.0; n],
        }
    }

    /// Map an undistorted offset (pixels from reference) to its distorted position.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let u = x / self.scale;
        let v = y / self.scale;
        let dx = eval_poly(&self.a_coeffs, self.order, u, v);
        let dy = eval_poly(&self.b_coeffs, self.order, u, v);
        (x + dx * self.scale, y + dy * self.scale)
    }

    /// Invert [`distort`](Self::distort) by fixed-point iteration.
    ///
    /// The corrections are a small perturbation of the identity, so a handful of
    /// iterations converges well below 1e-6 pixel for realistic coefficients.
    pub fn undistort(&self, x_d: f64, y_d: f64) -> (f64, f64) {
        let (mut x, mut y) = (x_d, y_d);
        for _ in 0..8 {
            let (fx, fy) = self.distort(x, y);
            x -= fx - x_d;
            y -= fy - y_d;
        }
        (x, y)
    }

    pub fn is_zero(&self) -> bool {
        self.a_coeffs.iter().all(|&c| c == 0.0) && self.b_coeffs.iter().all(|&c| c == 0.0)
    }
}

/// Number of polynomial terms with 2 ≤ p+q ≤ order.
pub fn num_coeffs(order: u32) -> usize {
    (2..=order).map(|s| (s + 1) as usize).sum()
}

/// Flat index of term (p, q).
pub fn coeff_index(p: u32, q: u32) -> usize {
    let s = p + q;
    let base: usize = (2..s).map(|ss| (ss + 1) as usize).sum();
    base + (s - p) as usize
}

fn eval_poly(coeffs: &[f64], order: u32, x: f64, y: f64) -> f64 {
    let mut result = 0.0;
    let mut idx = 0;
    for s in 2..=order {
        for p in (0..=s).rev() {
            let q = s - p;
            if let Some(c) = coeffs.get(idx) {
                result += c * x.powi(p as i32) * y.powi(q as i32);
            }
            idx += 1;
        }
    }
    result
}

/// One named entry of an instrument geometry table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aperture {
    /// SIAF aperture name, e.g. `NRCA1_FULL`
    pub name: String,
    pub kind: ApertureKind,
    /// Reference pixel, science frame
    pub x_sci_ref: f64,
    pub y_sci_ref: f64,
    /// Pixel scale along each science axis, arcsec/pixel
    pub x_sci_scale: f64,
    pub y_sci_scale: f64,
    /// Reference point in the telescope frame, arcsec
    pub v2_ref: f64,
    pub v3_ref: f64,
    /// Angle of the ideal Y axis from V3, degrees
    pub v3_idl_yang: f64,
    /// Ideal frame parity relative to V2/V3
    #[serde(default = "default_parity")]
    pub v_idl_parity: f64,
    /// Corner vertices in the telescope frame, arcsec
    pub corners: [(f64, f64); 4],
    #[serde(default)]
    pub distortion: Option<SciDistortion>,
}

fn default_parity() -> f64 {
    -1.0
}

impl Aperture {
    /// Mean of the two science-axis scales.
    ///
    /// Pixels are treated as square; the sub-percent departure is carried by the
    /// distortion model instead.
    pub fn pixel_scale(&self) -> f64 {
        (self.x_sci_scale + self.y_sci_scale) / 2.0
    }

    /// Reference pixel truncated to integer detector coordinates.
    pub fn reference_pixel(&self) -> (i64, i64) {
        (self.x_sci_ref.trunc() as i64, self.y_sci_ref.trunc() as i64)
    }

    /// Science frame pixel to telescope frame (V2, V3), arcsec.
    pub fn sci_to_tel(&self, x: f64, y: f64) -> (f64, f64) {
        let idl_x = (x - self.x_sci_ref) * self.x_sci_scale;
        let idl_y = (y - self.y_sci_ref) * self.y_sci_scale;
        self.idl_to_tel(idl_x, idl_y)
    }

    /// Telescope frame (V2, V3) in arcsec to science frame pixel.
    pub fn tel_to_sci(&self, v2: f64, v3: f64) -> (f64, f64) {
        let (idl_x, idl_y) = self.tel_to_idl(v2, v3);
        (
            idl_x / self.x_sci_scale + self.x_sci_ref,
            idl_y / self.y_sci_scale + self.y_sci_ref,
        )
    }

    fn idl_to_tel(&self, idl_x: f64, idl_y: f64) -> (f64, f64) {
        let (sin_a, cos_a) = self.v3_idl_yang.to_radians().sin_cos();
        let p = self.v_idl_parity;
        (
            self.v2_ref + p * idl_x * cos_a + idl_y * sin_a,
            self.v3_ref - p * idl_x * sin_a + idl_y * cos_a,
        )
    }

    fn tel_to_idl(&self, v2: f64, v3: f64) -> (f64, f64) {
        let (sin_a, cos_a) = self.v3_idl_yang.to_radians().sin_cos();
        let p = self.v_idl_parity;
        let dv2 = v2 - self.v2_ref;
        let dv3 = v3 - self.v3_ref;
        (p * (dv2 * cos_a - dv3 * sin_a), dv2 * sin_a + dv3 * cos_a)
    }

    /// Rotation of the alpha (along-row) sides of the corner polygon, degrees.
    ///
    /// Averages the angles of sides 0→1 and 3→2, measured counterclockwise from V2.
    /// Used for apertures without a meaningful `v3_idl_yang`.
    pub fn corner_rotation(&self) -> f64 {
        let c = &self.corners;
        let dx = c[0].0 - c[1].0;
        let dy = c[0].1 - c[1].1;
        let dx2 = c[3].0 - c[2].0;
        let dy2 = c[3].1 - c[2].1;
        ((dy.atan2(-dx) + dy2.atan2(-dx2)) / 2.0).to_degrees()
    }

    /// Corners of the pixel box `[0.5, x_size + 0.5] × [0.5, y_size + 0.5]`
    /// in the telescope frame.
    pub fn detector_corners(&self, x_size: f64, y_size: f64) -> [(f64, f64); 4] {
        [
            self.sci_to_tel(0.5, 0.5),
            self.sci_to_tel(x_size + 0.5, 0.5),
            self.sci_to_tel(x_size + 0.5, y_size + 0.5),
            self.sci_to_tel(0.5, y_size + 0.5),
        ]
    }
}
