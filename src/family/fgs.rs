//! FGS: two guider detectors and no selectable optics.

use super::{
    check_wavelength_range, DetectorSpec, Family, FamilyOptics, FormatStep, SpliceContext,
    SpliceOutcome, WfeLocation,
};
use crate::catalog::masks::MaskEntry;
use crate::config::InstrumentConfig;
use crate::error::{OpticsError, Result};
use crate::formatter::header::HeaderCard;
use crate::geometry::Aperture;
use crate::optics::aberration::ZernikeFieldModel;
use crate::optics::plane::Plane;

/// Average of the X and Y scales of both detectors.
pub const PIXELSCALE: f64 = 0.068991;

static DETECTORS: [DetectorSpec; 2] = [
    DetectorSpec::new("FGS1", "FGS1_FULL", (2048, 2048)),
    DetectorSpec::new("FGS2", "FGS2_FULL", (2048, 2048)),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Fgs;

impl FamilyOptics for Fgs {
    fn family(&self) -> Family {
        Family::FGS
    }

    fn image_masks(&self) -> &'static [MaskEntry] {
        &[]
    }

    fn pupil_masks(&self) -> &'static [MaskEntry] {
        &[]
    }

    fn detectors(&self) -> &'static [DetectorSpec] {
        &DETECTORS
    }

    /// `GUIDER1`/`GUIDER2` are the pipeline names for `FGS1`/`FGS2`.
    fn detector_alias(&self, name: &str) -> Option<String> {
        let upper = name.trim().to_ascii_uppercase();
        let number = upper.strip_prefix("GUIDER")?;
        Some(format!("FGS{number}"))
    }

    fn default_filter(&self) -> &'static str {
        "FGS"
    }

    fn default_pixel_scale(&self) -> f64 {
        PIXELSCALE
    }

    fn pupil_shift_default(&self) -> (f64, f64) {
        (0.0041, -0.0023)
    }

    fn header_keywords(&self, _cfg: &InstrumentConfig) -> Vec<HeaderCard> {
        vec![HeaderCard::new("FOCUSPOS", 0_i64, "FGS focus mechanism not yet modeled.")]
    }

    fn field_model(&self, _location: WfeLocation) -> ZernikeFieldModel {
        ZernikeFieldModel {
            label: "FGS internal WFE",
            center: (207.19, -697.50),
            base: [0.0, 0.0, 0.0, 17.0, -5.0, 6.0, 2.5, -3.0, 1.0, 0.5, 3.0],
            dv2: [0.0, 0.0, 0.0, 0.02, 0.0, 0.0, 0.002, 0.0, 0.0, 0.0, 0.0],
            dv3: [0.0, 0.0, 0.0, 0.01, 0.004, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        }
    }

    fn splice(&self, _ctx: &SpliceContext<'_>, _planes: Vec<Plane>) -> Result<SpliceOutcome> {
        Err(OpticsError::NotImplementedForFamily {
            family: Family::FGS,
            operation: "user-selectable optics",
        })
    }

    fn formatter_pipeline(&self, _cfg: &InstrumentConfig, _aperture: &Aperture) -> Vec<FormatStep> {
        vec![
            FormatStep::RotateToDetector,
            FormatStep::Distortion,
            FormatStep::ChargeDiffusion,
        ]
    }

    fn charge_diffusion_sigma(&self, _cfg: &InstrumentConfig) -> f64 {
        0.0070
    }

    fn ipc_coefficients(&self, _cfg: &InstrumentConfig) -> (f64, f64) {
        (0.0061, 0.0006)
    }

    fn validate_wavelengths(&self, _cfg: &InstrumentConfig, wavelengths: &[f64]) -> Result<()> {
        check_wavelength_range(Family::FGS, wavelengths, 0.6, 5.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guider_alias() {
        assert_eq!(Fgs.detector_alias("guider2").as_deref(), Some("FGS2"));
        assert_eq!(Fgs.detector_alias("FGS1"), None);
    }

    #[test]
    fn test_no_selectable_optics() {
        assert!(Fgs.image_masks().is_empty());
        assert!(Fgs.pupil_masks().is_empty());
    }
}
