use super::aperture::{Aperture, ApertureKind};
use crate::error::ValidationError;

/// Offset of the XAN/YAN origin from the V3 axis, arcsec.
const YAN_OFFSET_ARCSEC: f64 = 468.0;

/// Pixel/angle conversion for the aperture currently selected on an instrument.
#[derive(Debug, Clone)]
pub struct DetectorGeometry {
    pub detector: String,
    pub aperture: Aperture,
    /// Detector size (width, height), pixels
    pub shape: (u32, u32),
}

impl DetectorGeometry {
    pub fn new(detector: impl Into<String>, aperture: Aperture, shape: (u32, u32)) -> Self {
        Self {
            detector: detector.into(),
            aperture,
            shape,
        }
    }

    /// Check that a pixel position lies on the detector.
    pub fn validate_coords(&self, x: i64, y: i64) -> Result<(), ValidationError> {
        let (w, h) = self.shape;
        if x < 0 || y < 0 || x > i64::from(w) - 1 || y > i64::from(h) - 1 {
            return Err(ValidationError::OutOfBounds {
                x,
                y,
                width: w,
                height: h,
                detector: self.detector.clone(),
            });
        }
        Ok(())
    }

    /// Science-frame pixel to telescope (V2, V3), arcmin.
    pub fn pix2angle(&self, x: f64, y: f64) -> (f64, f64) {
        let (v2, v3) = self.aperture.sci_to_tel(x, y);
        (v2 / 60.0, v3 / 60.0)
    }

    /// Telescope coordinates of the simulated field point, arcmin.
    ///
    /// Slit and compound apertures have no pixel mapping of their own and report
    /// their reference point instead of the detector position.
    pub fn tel_coords(&self, position: (u32, u32)) -> (f64, f64) {
        match self.aperture.kind {
            ApertureKind::Slit | ApertureKind::Compound => {
                (self.aperture.v2_ref / 60.0, self.aperture.v3_ref / 60.0)
            }
            ApertureKind::Plain => self.pix2angle(f64::from(position.0), f64::from(position.1)),
        }
    }

    /// ISIM test-frame (XAN, YAN) coordinates, arcmin.
    ///
    /// XAN equals V2; YAN is flipped relative to V3 and offset so the origin sits
    /// on the master chief ray.
    pub fn xan_yan(&self, position: (u32, u32)) -> (f64, f64) {
        let (v2, v3) = self.tel_coords(position);
        (v2, -v3 - YAN_OFFSET_ARCSEC / 60.0)
    }
}
