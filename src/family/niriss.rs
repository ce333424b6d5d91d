//! NIRISS: imaging, aperture masking interferometry and the SOSS grism, plus
//! the rarely used coronagraphic spots.

use log::info;

use super::{
    check_wavelength_range, filter_wavelength_code, ConfigAction, DetectorSpec, Family,
    FamilyOptics, FormatStep, SpliceContext, SpliceOutcome, WfeLocation,
};
use crate::catalog::masks::{MaskEntry, NIRISS_IMAGE_MASKS, NIRISS_PUPIL_MASKS};
use crate::config::InstrumentConfig;
use crate::error::{OpticsError, Result};
use crate::formatter::header::HeaderCard;
use crate::geometry::Aperture;
use crate::optics::aberration::ZernikeFieldModel;
use crate::optics::plane::{OcculterBox, OpticalElement, Plane};

pub const PIXELSCALE: f64 = 0.065657;

/// Boundary between the two filter wheels' ranges, microns.
const WHEEL_SPLIT_UM: f64 = 2.35;

static DETECTORS: [DetectorSpec; 1] = [DetectorSpec::new("NIS", "NIS_CEN", (2048, 2048))];

/// Occulting spot radius in arcsec, from the mask diameter in its name.
fn spot_radius(mask: &str) -> Option<f64> {
    let hundredths: f64 = mask.strip_prefix("CORON")?.parse().ok()?;
    Some(hundredths / 100.0 / 2.0)
}

/// Pupil obscuration required by a filter, given the current selection.
fn auto_pupil(filter: &str, current: Option<&str>) -> Option<String> {
    if filter == "CLEAR" {
        // Only used for GR700XD slitless spectroscopy
        return Some("GR700XD".to_string());
    }
    match filter_wavelength_code(filter) {
        Some(code) if code >= 250 => match current {
            None => Some("CLEARP".to_string()),
            Some(p) => Some(p.to_string()),
        },
        Some(_) => None,
        None => current.map(str::to_string),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Niriss;

impl FamilyOptics for Niriss {
    fn family(&self) -> Family {
        Family::NIRISS
    }

    fn image_masks(&self) -> &'static [MaskEntry] {
        NIRISS_IMAGE_MASKS
    }

    fn pupil_masks(&self) -> &'static [MaskEntry] {
        NIRISS_PUPIL_MASKS
    }

    fn detectors(&self) -> &'static [DetectorSpec] {
        &DETECTORS
    }

    fn default_filter(&self) -> &'static str {
        "F090W"
    }

    fn default_pixel_scale(&self) -> f64 {
        PIXELSCALE
    }

    fn pupil_shift_default(&self) -> (f64, f64) {
        (0.0243, -0.0141)
    }

    fn on_filter_changed(&self, cfg: &mut InstrumentConfig) -> Vec<ConfigAction> {
        let mut actions = Vec::new();
        if cfg.auto_pupil {
            let target = auto_pupil(&cfg.filter, cfg.pupil_mask.as_deref());
            if target != cfg.pupil_mask {
                info!(
                    "NIRISS pupil obscuration updated to {} to match the requested filter",
                    target.as_deref().unwrap_or("None")
                );
                actions.push(ConfigAction::SetPupilMask(target));
            }
        }
        actions.push(ConfigAction::Resync);
        actions
    }

    fn header_keywords(&self, cfg: &InstrumentConfig) -> Vec<HeaderCard> {
        let mut cards = Vec::new();
        if let Some(mask) = cfg.image_mask.as_deref() {
            cards.push(HeaderCard::new("CORONPOS", mask, "NIRISS coronagraph spot location"));
        }
        cards.push(HeaderCard::new("FOCUSPOS", 0_i64, "NIRISS focus mechanism not yet modeled."));
        cards
    }

    fn field_model(&self, _location: WfeLocation) -> ZernikeFieldModel {
        ZernikeFieldModel {
            label: "NIRISS internal WFE",
            center: (-290.10, -697.50),
            base: [0.0, 0.0, 0.0, 21.0, 7.5, -9.0, 4.0, 3.0, -1.5, 2.0, 5.5],
            dv2: [0.0, 0.0, 0.0, 0.05, 0.0, 0.015, 0.0, 0.004, 0.0, 0.0, 0.0],
            dv3: [0.0, 0.0, 0.0, -0.03, 0.012, 0.0, 0.003, 0.0, 0.0, 0.0, 0.002],
        }
    }

    fn splice(&self, ctx: &SpliceContext<'_>, mut planes: Vec<Plane>) -> Result<SpliceOutcome> {
        let cfg = ctx.config;

        let radius = cfg.image_mask.as_deref().and_then(spot_radius);
        if let (Some(mask), Some(radius)) = (cfg.image_mask.as_deref(), radius) {
            let spot = Plane::image(mask, OpticalElement::CircularOcculter { radius, shift: None });
            super::insert_at(&mut planes, 2, spot);
        }

        let shift = ctx.pupil_shift(self);
        let rotation = ctx.pupil_rotation(self);
        match cfg.pupil_mask.as_deref() {
            Some(p @ "MASK_NRM") => planes.push(
                Plane::pupil(
                    p,
                    OpticalElement::TransmissionFile {
                        file: "MASK_NRM.fits.gz".to_string(),
                    },
                )
                .flipped(true, true)
                .with_geometry(shift, rotation)
                .with_hint("intensity"),
            ),
            Some("CLEARP") => planes.push(
                Plane::pupil("CLEARP", OpticalElement::ClearpPupil)
                    .with_geometry(shift, rotation)
                    .with_hint("intensity"),
            ),
            Some("GR700XD") => {
                planes.push(
                    Plane::pupil("GR700XD", OpticalElement::GrismPupil)
                        .with_geometry(shift, rotation),
                )
            }
            None if cfg.image_mask.is_some() => planes.push(Plane::pupil(
                "No Lyot Mask Selected!",
                OpticalElement::ScalarTransmission { transmission: 1.0 },
            )),
            _ => {}
        }

        let mut outcome = SpliceOutcome::new(planes);
        outcome.try_sam = radius.is_some();
        outcome.sam_box = radius.map(|r| OcculterBox::Square(r + 0.05));
        Ok(outcome)
    }

    fn formatter_pipeline(&self, _cfg: &InstrumentConfig, _aperture: &Aperture) -> Vec<FormatStep> {
        vec![
            FormatStep::RotateToDetector,
            FormatStep::Distortion,
            FormatStep::ChargeDiffusion,
        ]
    }

    fn charge_diffusion_sigma(&self, _cfg: &InstrumentConfig) -> f64 {
        0.0020
    }

    fn ipc_coefficients(&self, _cfg: &InstrumentConfig) -> (f64, f64) {
        (0.0056, 0.0004)
    }

    fn ppc_coefficient(&self, _cfg: &InstrumentConfig) -> Option<f64> {
        Some(0.0028)
    }

    fn validate_wavelengths(&self, cfg: &InstrumentConfig, wavelengths: &[f64]) -> Result<()> {
        check_wavelength_range(Family::NIRISS, wavelengths, 0.6, 5.3)?;
        let max_um = wavelengths.iter().copied().fold(f64::NEG_INFINITY, f64::max) * 1e6;
        if cfg.pupil_mask_is("MASK_NRM") && max_um <= WHEEL_SPLIT_UM {
            return Err(OpticsError::ConfigurationConflict(
                "NRM pupil can only be used with long wavelength filters (F277W and longer)"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_pupil() {
        assert_eq!(auto_pupil("CLEAR", None).as_deref(), Some("GR700XD"));
        assert_eq!(auto_pupil("F430M", None).as_deref(), Some("CLEARP"));
        assert_eq!(auto_pupil("F430M", Some("MASK_NRM")).as_deref(), Some("MASK_NRM"));
        assert_eq!(auto_pupil("F150W", Some("CLEARP")), None);
    }

    #[test]
    fn test_filter_hook_only_reports_changes() {
        let mut cfg = InstrumentConfig::new("F480M", "NIS", PIXELSCALE);
        cfg.pupil_mask = Some("CLEARP".to_string());
        assert_eq!(Niriss.on_filter_changed(&mut cfg), vec![ConfigAction::Resync]);
        cfg.filter = "F115W".to_string();
        assert_eq!(
            Niriss.on_filter_changed(&mut cfg),
            vec![ConfigAction::SetPupilMask(None), ConfigAction::Resync]
        );
    }

    #[test]
    fn test_spot_radius() {
        assert_eq!(spot_radius("CORON058"), Some(0.29));
        assert_eq!(spot_radius("CORON200"), Some(1.0));
        assert_eq!(spot_radius("MASK_NRM"), None);
    }

    #[test]
    fn test_nrm_needs_long_wavelengths() {
        let mut cfg = InstrumentConfig::new("F380M", "NIS", PIXELSCALE);
        cfg.pupil_mask = Some("MASK_NRM".to_string());
        assert!(Niriss.validate_wavelengths(&cfg, &[3.8e-6]).is_ok());
        assert!(Niriss.validate_wavelengths(&cfg, &[1.5e-6]).is_err());
        assert!(Niriss.validate_wavelengths(&cfg, &[6.0e-6]).is_err());
    }
}
