//! Field-dependent instrument wavefront error from a linear Zernike field model.
//!
//! Each family describes its internal WFE with Noll-ordered Zernike coefficients
//! that vary linearly with field position:
//!
//! ```text
//! c_j(V2, V3) = base_j + dv2_j · (V2 - V2c) + dv3_j · (V3 - V3c)
//! ```
//!
//! Coefficients are in nanometers; field gradients in nm/arcsec.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::warn;
use ndarray::{s, Array2};
use serde::Serialize;

use super::pupil::{flip_y, masked_rms};
use crate::error::ValidationError;

/// Number of Noll terms carried by the field models.
pub const NUM_TERMS: usize = 11;

/// Noll-normalized Zernike polynomial `j` (1-based) at polar coordinates
/// on the unit disk.
pub fn zernike_noll(j: usize, rho: f64, theta: f64) -> f64 {
    let r2 = rho * rho;
    match j {
        1 => 1.0,
        2 => 2.0 * rho * theta.cos(),
        3 => 2.0 * rho * theta.sin(),
        4 => 3f64.sqrt() * (2.0 * r2 - 1.0),
        5 => 6f64.sqrt() * r2 * (2.0 * theta).sin(),
        6 => 6f64.sqrt() * r2 * (2.0 * theta).cos(),
        7 => 8f64.sqrt() * (3.0 * r2 - 2.0) * rho * theta.sin(),
        8 => 8f64.sqrt() * (3.0 * r2 - 2.0) * rho * theta.cos(),
        9 => 8f64.sqrt() * r2 * rho * (3.0 * theta).sin(),
        10 => 8f64.sqrt() * r2 * rho * (3.0 * theta).cos(),
        11 => 5f64.sqrt() * (6.0 * r2 * r2 - 6.0 * r2 + 1.0),
        _ => 0.0,
    }
}

/// Linear field model of Zernike coefficients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZernikeFieldModel {
    pub label: &'static str,
    /// Field center (V2, V3), arcsec
    pub center: (f64, f64),
    pub base: [f64; NUM_TERMS],
    pub dv2: [f64; NUM_TERMS],
    pub dv3: [f64; NUM_TERMS],
}

impl ZernikeFieldModel {
    /// Coefficients in nm at a field point.
    pub fn coefficients_at(&self, v2: f64, v3: f64) -> [f64; NUM_TERMS] {
        let dx = v2 - self.center.0;
        let dy = v3 - self.center.1;
        let mut out = [0.0; NUM_TERMS];
        for (j, c) in out.iter_mut().enumerate() {
            *c = self.base[j] + self.dv2[j] * dx + self.dv3[j] * dy;
        }
        out
    }

    pub fn evaluate(&self, field_point: (f64, f64), npix: usize) -> FieldAberration {
        let coefficients_nm = self.coefficients_at(field_point.0, field_point.1).to_vec();
        let opd = opd_from_zernikes(&coefficients_nm, npix);
        FieldAberration {
            label: self.label.to_string(),
            field_point,
            coefficients_nm,
            opd: Arc::new(opd),
        }
    }
}

/// Evaluate a Zernike expansion (nm) on an `npix` square grid inscribed in the
/// unit disk, returning meters. Pixels outside the disk are zero.
pub fn opd_from_zernikes(coefficients_nm: &[f64], npix: usize) -> Array2<f64> {
    let half = npix as f64 / 2.0;
    Array2::from_shape_fn((npix, npix), |(row, col)| {
        let x = (col as f64 + 0.5 - half) / half;
        let y = (row as f64 + 0.5 - half) / half;
        let rho = x.hypot(y);
        if rho > 1.0 {
            return 0.0;
        }
        let theta = y.atan2(x);
        coefficients_nm
            .iter()
            .enumerate()
            .map(|(i, c)| c * zernike_noll(i + 1, rho, theta))
            .sum::<f64>()
            * 1e-9
    })
}

/// Instrument WFE evaluated at one field point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldAberration {
    pub label: String,
    /// (V2, V3), arcsec
    pub field_point: (f64, f64),
    pub coefficients_nm: Vec<f64>,
    #[serde(skip)]
    pub opd: Arc<Array2<f64>>,
}

impl FieldAberration {
    /// RMS in nm over the exit-pupil footprint of `entrance_amplitude`.
    ///
    /// Mismatched grids are compared over their common top-left region.
    pub fn rms_nm(&self, entrance_amplitude: &Array2<f64>) -> f64 {
        let exit = flip_y(entrance_amplitude);
        if self.opd.dim() == exit.dim() {
            return masked_rms(&self.opd, &exit) * 1e9;
        }
        let rows = self.opd.nrows().min(exit.nrows());
        let cols = self.opd.ncols().min(exit.ncols());
        warn!(
            "{} OPD shape {:?} does not match pupil shape {:?}; \
             RMS uses the common {rows}x{cols} region",
            self.label,
            self.opd.dim(),
            exit.dim()
        );
        let opd = self.opd.slice(s![..rows, ..cols]).to_owned();
        let amplitude = exit.slice(s![..rows, ..cols]).to_owned();
        masked_rms(&opd, &amplitude) * 1e9
    }
}

/// Component of the wavefront error returned by
/// [`Instrument::wfe`](crate::Instrument::wfe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WfeKind {
    /// Instrument internal WFE
    Si,
    /// Telescope WFE, zero outside the pupil
    Ote,
    /// Sum of the two
    Total,
}

impl FromStr for WfeKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "si" => Ok(WfeKind::Si),
            "ote" => Ok(WfeKind::Ote),
            "total" => Ok(WfeKind::Total),
            _ => Err(ValidationError::InvalidWfeKind { value: s.to_string() }),
        }
    }
}

impl fmt::Display for WfeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WfeKind::Si => "SI",
            WfeKind::Ote => "OTE",
            WfeKind::Total => "total",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> ZernikeFieldModel {
        let mut base = [0.0; NUM_TERMS];
        base[3] = 20.0;
        let mut dv2 = [0.0; NUM_TERMS];
        dv2[3] = 0.1;
        ZernikeFieldModel {
            label: "test",
            center: (100.0, -500.0),
            base,
            dv2,
            dv3: [0.0; NUM_TERMS],
        }
    }

    #[test]
    fn test_coefficients_vary_linearly() {
        let m = model();
        assert_relative_eq!(m.coefficients_at(100.0, -500.0)[3], 20.0);
        assert_relative_eq!(m.coefficients_at(150.0, -500.0)[3], 25.0);
    }

    #[test]
    fn test_opd_is_zero_outside_disk() {
        let opd = opd_from_zernikes(&[0.0, 0.0, 0.0, 50.0], 32);
        assert_eq!(opd[[0, 0]], 0.0);
        assert!(opd[[16, 16]] < 0.0);
    }

    #[test]
    fn test_zero_coefficients_give_zero_rms() {
        let ab = ZernikeFieldModel {
            label: "flat",
            center: (0.0, 0.0),
            base: [0.0; NUM_TERMS],
            dv2: [0.0; NUM_TERMS],
            dv3: [0.0; NUM_TERMS],
        }
        .evaluate((10.0, 10.0), 32);
        let amp = Array2::ones((32, 32));
        assert_eq!(ab.rms_nm(&amp), 0.0);
    }

    #[test]
    fn test_mismatched_grid_uses_common_region() {
        let mut base = [0.0; NUM_TERMS];
        base[0] = 30.0;
        let piston = ZernikeFieldModel {
            label: "piston",
            center: (0.0, 0.0),
            base,
            dv2: [0.0; NUM_TERMS],
            dv3: [0.0; NUM_TERMS],
        }
        .evaluate((0.0, 0.0), 64);
        // After the flip the clear block covers rows and columns 16..32, well
        // inside the 64-pixel disk where piston is 30 nm.
        let mut amp = Array2::zeros((40, 40));
        amp.slice_mut(s![8..24, 16..32]).fill(1.0);
        assert_relative_eq!(piston.rms_nm(&amp), 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_wfe_kind_parsing() {
        assert_eq!("SI".parse::<WfeKind>().unwrap(), WfeKind::Si);
        assert_eq!(" total ".parse::<WfeKind>().unwrap(), WfeKind::Total);
        assert!(matches!(
            "ote_thermal_distortion".parse::<WfeKind>(),
            Err(ValidationError::InvalidWfeKind { .. })
        ));
    }

    #[test]
    fn test_defocus_rms_matches_coefficient() {
        let ab = model().evaluate((100.0, -500.0), 128);
        let half = 64.0;
        let amp = Array2::from_shape_fn((128, 128), |(r, c)| {
            let x = (c as f64 + 0.5 - half) / half;
            let y = (r as f64 + 0.5 - half) / half;
            f64::from(x.hypot(y) <= 1.0)
        });
        // Noll normalization gives unit RMS per term over the disk.
        assert_relative_eq!(ab.rms_nm(&amp), 20.0, epsilon = 0.5);
    }
}
