//! Entrance pupil amplitude and OPD sources.

use std::path::PathBuf;
use std::sync::Arc;

use log::debug;
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use super::segment::{one_segment_pupil, segment_name};
use crate::error::{OpticsError, Result};

/// Circumscribed diameter of the primary mirror, meters.
pub const PUPIL_DIAMETER: f64 = 6.603464;

/// Diameter of the secondary mirror obscuration, meters.
const SECONDARY_DIAMETER: f64 = 0.74;

/// Sampled pupil transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PupilMap {
    pub amplitude: Array2<f64>,
    /// Meters per pixel
    pub pixel_scale: f64,
}

impl PupilMap {
    pub fn npix(&self) -> usize {
        self.amplitude.ncols()
    }

    pub fn diameter(&self) -> f64 {
        self.npix() as f64 * self.pixel_scale
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PupilSource {
    /// Filled circular aperture with a central obscuration
    Analytic { npix: usize, diameter: f64 },
    /// FITS amplitude map (requires the `fits` feature)
    File(PathBuf),
    Loaded(Arc<PupilMap>),
    /// One primary mirror segment cut out of a segment-number map
    Segment {
        segment_map: Box<PupilSource>,
        /// Canonical segment name, e.g. `B3-11`
        segment: String,
    },
}

impl PupilSource {
    /// Pupil of a single segment, accepting any spelling [`segment_name`] understands.
    pub fn one_segment(segment_map: PupilSource, segment: &str) -> Result<Self> {
        Ok(PupilSource::Segment {
            segment_map: Box::new(segment_map),
            segment: segment_name(segment)?,
        })
    }
}

impl Default for PupilSource {
    fn default() -> Self {
        PupilSource::Analytic {
            npix: 256,
            diameter: PUPIL_DIAMETER,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpdSource {
    /// Perfect telescope
    #[default]
    None,
    /// FITS OPD map in meters, optionally one plane of a cube
    File { path: PathBuf, slice: Option<usize> },
    /// OPD in meters on the pupil grid
    Loaded(Arc<Array2<f64>>),
}

impl OpdSource {
    pub fn is_none(&self) -> bool {
        matches!(self, OpdSource::None)
    }
}

/// Circular pupil with a central obscuration.
///
/// Each pixel is sampled on a 2×2 sub-grid, so edge pixels take fractional
/// values and only fully interior pixels have amplitude exactly 1.
pub fn analytic_pupil(npix: usize, diameter: f64) -> PupilMap {
    let pixel_scale = diameter / npix as f64;
    let outer = diameter / 2.0;
    let inner = SECONDARY_DIAMETER / 2.0;
    let center = npix as f64 / 2.0;
    let amplitude = Array2::from_shape_fn((npix, npix), |(row, col)| {
        let mut inside = 0;
        for (dy, dx) in [(0.25, 0.25), (0.25, 0.75), (0.75, 0.25), (0.75, 0.75)] {
            let x = (col as f64 + dx - center) * pixel_scale;
            let y = (row as f64 + dy - center) * pixel_scale;
            let r = x.hypot(y);
            if r <= outer && r >= inner {
                inside += 1;
            }
        }
        inside as f64 / 4.0
    });
    PupilMap {
        amplitude,
        pixel_scale,
    }
}

pub fn load_pupil(source: &PupilSource) -> Result<Arc<PupilMap>> {
    match source {
        PupilSource::Analytic { npix, diameter } => {
            if *npix == 0 || *diameter <= 0.0 {
                return Err(OpticsError::Data(format!(
                    "analytic pupil needs positive size, got npix={npix} diameter={diameter}"
                )));
            }
            Ok(Arc::new(analytic_pupil(*npix, *diameter)))
        }
        PupilSource::Loaded(map) => Ok(Arc::clone(map)),
        PupilSource::File(path) => read_pupil_file(path),
        PupilSource::Segment { segment_map, segment } => {
            let map = load_pupil(segment_map)?;
            debug!("Masking pupil to segment {segment}");
            Ok(Arc::new(one_segment_pupil(&map, segment)?))
        }
    }
}

#[cfg(feature = "fits")]
fn read_pupil_file(path: &std::path::Path) -> Result<Arc<PupilMap>> {
    use crate::io::fits::{read_image_plane, read_primary_key};

    let amplitude = read_image_plane(path, None).map_err(|e| OpticsError::Data(e.to_string()))?;
    let npix = amplitude.ncols();
    let pixel_scale = read_primary_key(path, "PUPLSCAL")
        .map_err(|e| OpticsError::Data(e.to_string()))?
        .unwrap_or(PUPIL_DIAMETER / npix as f64);
    Ok(Arc::new(PupilMap {
        amplitude,
        pixel_scale,
    }))
}

#[cfg(not(feature = "fits"))]
fn read_pupil_file(path: &std::path::Path) -> Result<Arc<PupilMap>> {
    Err(OpticsError::Data(format!(
        "cannot read pupil {}: built without the `fits` feature",
        path.display()
    )))
}

/// Load the OPD, checking it matches the pupil grid.
pub fn load_opd(source: &OpdSource, shape: (usize, usize)) -> Result<Option<Arc<Array2<f64>>>> {
    let opd = match source {
        OpdSource::None => return Ok(None),
        OpdSource::Loaded(opd) => Arc::clone(opd),
        OpdSource::File { path, slice } => read_opd_file(path, *slice)?,
    };
    if opd.dim() != shape {
        return Err(OpticsError::Data(format!(
            "OPD shape {:?} does not match pupil shape {:?}",
            opd.dim(),
            shape
        )));
    }
    Ok(Some(opd))
}

#[cfg(feature = "fits")]
fn read_opd_file(path: &std::path::Path, slice: Option<usize>) -> Result<Arc<Array2<f64>>> {
    crate::io::fits::read_image_plane(path, slice)
        .map(Arc::new)
        .map_err(|e| OpticsError::Data(e.to_string()))
}

#[cfg(not(feature = "fits"))]
fn read_opd_file(path: &std::path::Path, _slice: Option<usize>) -> Result<Arc<Array2<f64>>> {
    Err(OpticsError::Data(format!(
        "cannot read OPD {}: built without the `fits` feature",
        path.display()
    )))
}

/// RMS of `opd` over pixels where `amplitude` is exactly 1. Zero if there are none.
pub fn masked_rms(opd: &Array2<f64>, amplitude: &Array2<f64>) -> f64 {
    let (sum, count) = opd
        .iter()
        .zip(amplitude.iter())
        .filter(|(_, a)| **a == 1.0)
        .fold((0.0, 0usize), |(s, n), (&v, _)| (s + v * v, n + 1));
    if count == 0 {
        0.0
    } else {
        (sum / count as f64).sqrt()
    }
}

/// Mirror an array top to bottom.
pub fn flip_y(a: &Array2<f64>) -> Array2<f64> {
    a.slice(s![..;-1, ..]).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use approx::assert_relative_eq;

    #[test]
    fn test_analytic_pupil_has_binary_interior() {
        let pupil = analytic_pupil(64, PUPIL_DIAMETER);
        assert_relative_eq!(pupil.diameter(), PUPIL_DIAMETER, epsilon = 1e-12);
        // Center is obscured, a point halfway out is clear, corners are dark.
        assert_eq!(pupil.amplitude[[32, 32]], 0.0);
        assert_eq!(pupil.amplitude[[32, 48]], 1.0);
        assert_eq!(pupil.amplitude[[0, 0]], 0.0);
        assert!(pupil.amplitude.iter().any(|&a| a > 0.0 && a < 1.0));
    }

    #[test]
    fn test_masked_rms_ignores_partial_pixels() {
        let amp = Array2::from_shape_vec((1, 3), vec![1.0, 0.5, 1.0]).unwrap();
        let opd = Array2::from_shape_vec((1, 3), vec![3.0, 100.0, -3.0]).unwrap();
        assert_relative_eq!(masked_rms(&opd, &amp), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_masked_rms_of_empty_mask_is_zero() {
        let amp = Array2::zeros((4, 4));
        let opd = Array2::ones((4, 4));
        assert_eq!(masked_rms(&opd, &amp), 0.0);
    }

    #[test]
    fn test_opd_shape_mismatch() {
        let opd = OpdSource::Loaded(Arc::new(Array2::zeros((8, 8))));
        assert!(matches!(load_opd(&opd, (16, 16)), Err(OpticsError::Data(_))));
        assert!(load_opd(&OpdSource::None, (16, 16)).unwrap().is_none());
    }

    #[test]
    fn test_segment_source_keeps_one_segment() {
        let mut amplitude = Array2::zeros((4, 4));
        amplitude[[0, 0]] = 7.0;
        amplitude[[1, 1]] = 7.0;
        amplitude[[2, 2]] = 8.0;
        let map = PupilSource::Loaded(Arc::new(PupilMap {
            amplitude,
            pixel_scale: 1.0,
        }));
        let source = PupilSource::one_segment(map, "7").unwrap();
        assert!(matches!(&source, PupilSource::Segment { segment, .. } if segment == "B1-7"));
        let pupil = load_pupil(&source).unwrap();
        assert_eq!(pupil.amplitude.sum(), 2.0);
        assert_eq!(pupil.amplitude[[2, 2]], 0.0);
    }

    #[test]
    fn test_segment_source_rejects_unknown_segment() {
        let map = PupilSource::default();
        assert!(matches!(
            PupilSource::one_segment(map, "D9"),
            Err(OpticsError::Validation(ValidationError::InvalidSegment { .. }))
        ));
    }

    #[cfg(not(feature = "fits"))]
    #[test]
    fn test_file_source_needs_fits_feature() {
        let src = PupilSource::File(PathBuf::from("pupil.fits"));
        assert!(matches!(load_pupil(&src), Err(OpticsError::Data(_))));
    }
}
