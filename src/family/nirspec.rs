//! NIRSpec in imaging and IFU configurations: fixed slits, MSA shutters and the
//! IFU entrance aperture, followed by the grating-wheel pupil stop.

use log::{debug, info};

use super::{
    check_wavelength_range, ConfigAction, DetectorSpec, Family, FamilyOptics, FormatStep, IfuBand,
    IfuBroadening, SpliceContext, SpliceOutcome, WfeLocation,
};
use crate::catalog::masks::{MaskEntry, NIRSPEC_IMAGE_MASKS, NIRSPEC_PUPIL_MASKS};
use crate::config::{InstrumentConfig, ObservingMode};
use crate::error::Result;
use crate::formatter::header::HeaderCard;
use crate::geometry::{Aperture, GeometryTable};
use crate::optics::aberration::ZernikeFieldModel;
use crate::optics::plane::{OpticalElement, Plane};

/// Average over both detectors.
pub const PIXELSCALE: f64 = 0.10435;

const SIZE: (u32, u32) = (2048, 2048);

static DETECTORS: [DetectorSpec; 2] = [
    DetectorSpec::new("NRS1", "NRS1_FULL", SIZE),
    DetectorSpec::new("NRS2", "NRS2_FULL", SIZE),
];

static MODES: [(ObservingMode, &str); 2] = [
    (ObservingMode::Imaging, "NRS1_FULL"),
    (ObservingMode::Ifu, "NRS_FULL_IFU"),
];

pub static DISPERSERS: [&str; 7] = ["PRISM", "G140M", "G140H", "G235M", "G235H", "G395M", "G395H"];

static IFU_BANDS: [IfuBand; 9] = [
    IfuBand::new("PRISM/CLEAR", 0.10, 0.0050, 0.60, 5.30),
    IfuBand::new("G140M/F070LP", 0.10, 0.0006, 0.70, 1.27),
    IfuBand::new("G140M/F100LP", 0.10, 0.0006, 0.97, 1.89),
    IfuBand::new("G140H/F070LP", 0.10, 0.0002, 0.70, 1.27),
    IfuBand::new("G140H/F100LP", 0.10, 0.0002, 0.97, 1.89),
    IfuBand::new("G235M/F170LP", 0.10, 0.0011, 1.66, 3.17),
    IfuBand::new("G235H/F170LP", 0.10, 0.0004, 1.66, 3.17),
    IfuBand::new("G395M/F290LP", 0.10, 0.0018, 2.87, 5.27),
    IfuBand::new("G395H/F290LP", 0.10, 0.0007, 2.87, 5.27),
];

/// Element applied at the slit plane for each image mask.
fn slit_plane(mask: &str) -> Option<Plane> {
    let stop = |width: f64, height: f64, name: String| {
        Plane::image(
            name,
            OpticalElement::RectangularFieldStop {
                width,
                height,
                angle: 0.0,
                shift: None,
            },
        )
    };
    let plane = match mask {
        "S200A1" | "S200A2" | "S200B1" => stop(0.2, 3.2, format!("{mask} slit")),
        "S400A1" => stop(0.4, 3.65, format!("{mask} slit")),
        "S1600A1" => stop(1.6, 1.6, format!("{mask} square aperture")),
        "IFU" => stop(3.193, 3.097, "IFU entrance".to_string()),
        "MSA all open" => Plane::image(mask, OpticalElement::MsaOpenGrid),
        "Single MSA open shutter" => stop(0.2, 0.45, mask.to_string()),
        "Three adjacent MSA open shutters" => Plane::image(mask, OpticalElement::MsaThreeShutters),
        _ => return None,
    };
    Some(plane)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NirSpec;

impl FamilyOptics for NirSpec {
    fn family(&self) -> Family {
        Family::NIRSpec
    }

    fn image_masks(&self) -> &'static [MaskEntry] {
        NIRSPEC_IMAGE_MASKS
    }

    fn pupil_masks(&self) -> &'static [MaskEntry] {
        NIRSPEC_PUPIL_MASKS
    }

    fn detectors(&self) -> &'static [DetectorSpec] {
        &DETECTORS
    }

    fn default_filter(&self) -> &'static str {
        "F110W"
    }

    fn default_pixel_scale(&self) -> f64 {
        PIXELSCALE
    }

    /// Near the S1600A1 square aperture.
    fn default_position(&self) -> (u32, u32) {
        (1380, 1024)
    }

    fn default_image_mask(&self) -> Option<&'static str> {
        Some("MSA all open")
    }

    fn default_pupil_mask(&self) -> Option<&'static str> {
        Some("NIRSpec grating")
    }

    fn pupil_shift_default(&self) -> (f64, f64) {
        (0.0115, -0.0157)
    }

    fn default_rotation(&self) -> Option<f64> {
        Some(138.5)
    }

    fn modes(&self) -> &'static [(ObservingMode, &'static str)] {
        &MODES
    }

    fn ifu_bands(&self) -> &'static [IfuBand] {
        &IFU_BANDS
    }

    fn dispersers(&self) -> &'static [&'static str] {
        &DISPERSERS
    }

    fn aperture_rule(&self, cfg: &InstrumentConfig) -> Option<String> {
        if cfg.is_ifu() {
            return None;
        }
        self.detector(&cfg.detector).map(|d| d.default_aperture.to_string())
    }

    fn pixel_scale_rule(&self, aperture: &str, table: &GeometryTable) -> Option<f64> {
        if aperture.contains("IFU") {
            return table.pixel_scale("NRS1_FULL").ok();
        }
        None
    }

    fn detector_for_aperture(&self, aperture: &str) -> Option<String> {
        match aperture.get(0..4) {
            Some(det @ ("NRS1" | "NRS2")) => Some(det.to_string()),
            _ => None,
        }
    }

    fn on_aperture_changed(
        &self,
        cfg: &mut InstrumentConfig,
        aperture: &Aperture,
        _table: &GeometryTable,
    ) -> Result<()> {
        if aperture.name.contains("IFU") {
            cfg.mode = ObservingMode::Ifu;
            if cfg.disperser.is_none() {
                cfg.disperser = Some("PRISM".to_string());
                cfg.filter = "CLEAR".to_string();
            }
            if !matches!(cfg.image_mask.as_deref(), None | Some("IFU")) {
                info!(
                    "The currently-selected image mask (slit) is not compatible with IFU mode. \
                     Setting image_mask=None"
                );
                cfg.image_mask = None;
            }
            cfg.band = cfg.disperser.as_ref().map(|d| format!("{d}/{}", cfg.filter));
        } else {
            cfg.mode = ObservingMode::Imaging;
            cfg.band = None;
        }
        cfg.rotation = Some(aperture.v3_idl_yang);
        Ok(())
    }

    fn apply_band(&self, cfg: &mut InstrumentConfig, band: &IfuBand) -> Vec<ConfigAction> {
        if let Some((disperser, filter)) = band.name.split_once('/') {
            cfg.disperser = Some(disperser.to_string());
            cfg.filter = filter.to_string();
            debug!("NIRSpec IFU band set to {disperser} + {filter}");
        }
        cfg.band = Some(band.name.to_string());
        Vec::new()
    }

    fn header_keywords(&self, cfg: &InstrumentConfig) -> Vec<HeaderCard> {
        let mut cards = vec![
            HeaderCard::new("GRATING", "None", "NIRSpec grating element name"),
            HeaderCard::new(
                "APERTURE",
                cfg.image_mask.as_deref().unwrap_or("None"),
                "NIRSpec slit aperture name",
            ),
        ];
        if cfg.is_ifu() {
            cards.push(HeaderCard::new("MODE", "IFU", "This is a NIRSpec IFU mode simulation"));
            cards.push(HeaderCard::new(
                "GRATING",
                cfg.disperser.as_deref().unwrap_or("None"),
                "Name of the grating (or prism) element simulated.",
            ));
        }
        cards
    }

    fn field_model(&self, location: WfeLocation) -> ZernikeFieldModel {
        match location {
            WfeLocation::Instrument => ZernikeFieldModel {
                label: "NIRSpec fore optics WFE",
                center: (378.42, -428.40),
                base: [0.0, 0.0, 0.0, 14.0, -6.5, 8.0, 3.5, -2.0, 1.5, 1.0, 4.0],
                dv2: [0.0, 0.0, 0.0, 0.03, 0.01, 0.0, 0.004, 0.0, 0.0, 0.0, 0.0],
                dv3: [0.0, 0.0, 0.0, 0.02, 0.0, 0.01, 0.0, 0.003, 0.0, 0.0, 0.0],
            },
            WfeLocation::Spectrograph => ZernikeFieldModel {
                label: "NIRSpec spectrograph WFE",
                center: (378.42, -428.40),
                base: [0.0, 0.0, 0.0, 9.5, 4.0, -3.5, -2.0, 2.5, 1.0, -0.5, 2.5],
                dv2: [0.0, 0.0, 0.0, -0.02, 0.0, 0.01, 0.0, 0.0, 0.002, 0.0, 0.0],
                dv3: [0.0, 0.0, 0.0, 0.01, 0.005, 0.0, 0.0, 0.0, 0.0, 0.001, 0.0],
            },
        }
    }

    // The fore optics carry a third of the instrument WFE, the spectrograph the rest.
    fn si_wfe_scale(&self) -> f64 {
        3.0
    }

    fn splice(&self, ctx: &SpliceContext<'_>, mut planes: Vec<Plane>) -> Result<SpliceOutcome> {
        let cfg = ctx.config;

        if let Some(plane) = cfg.image_mask.as_deref().and_then(slit_plane) {
            planes.push(plane);
        }

        if cfg.pupil_mask.as_deref().is_some_and(|p| p.to_lowercase().contains("grating")) {
            planes.push(
                Plane::pupil(
                    "Pupil stop at grating wheel",
                    OpticalElement::RectangleAperture {
                        width: 7.91,
                        height: 8.41,
                    },
                )
                .with_hint("intensity"),
            );
        }

        // Collimator and camera
        if cfg.include_si_wfe {
            let aberration = self
                .field_model(WfeLocation::Spectrograph)
                .evaluate(ctx.field_point, ctx.pupil_npix);
            planes.push(Plane::pupil(
                aberration.label.clone(),
                OpticalElement::FieldAberration(aberration),
            ));
        }

        if cfg.is_ifu() && cfg.options.ifualign_rotation {
            planes.push(Plane::rotation_plane(90.0));
        }

        Ok(SpliceOutcome::new(planes))
    }

    fn formatter_pipeline(&self, cfg: &InstrumentConfig, _aperture: &Aperture) -> Vec<FormatStep> {
        if cfg.is_ifu() {
            vec![FormatStep::IfuBroadening]
        } else {
            vec![FormatStep::Distortion, FormatStep::ChargeDiffusion]
        }
    }

    fn charge_diffusion_sigma(&self, _cfg: &InstrumentConfig) -> f64 {
        0.036
    }

    fn ipc_coefficients(&self, _cfg: &InstrumentConfig) -> (f64, f64) {
        (0.0051, 0.0004)
    }

    fn ifu_broadening(&self, _cfg: &InstrumentConfig) -> Option<IfuBroadening> {
        Some(IfuBroadening::Gaussian {
            sigma_x: 0.040,
            sigma_y: 0.025,
        })
    }

    fn validate_wavelengths(&self, _cfg: &InstrumentConfig, wavelengths: &[f64]) -> Result<()> {
        check_wavelength_range(Family::NIRSpec, wavelengths, 0.6, 5.3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::builtin::builtin_table;

    fn config() -> InstrumentConfig {
        let mut cfg = InstrumentConfig::new("F110W", "NRS1", PIXELSCALE);
        cfg.image_mask = Some("S200A1".to_string());
        cfg.pupil_mask = Some("NIRSpec grating".to_string());
        cfg
    }

    #[test]
    fn test_ifu_aperture_selects_default_disperser() {
        let table = builtin_table("nirspec").unwrap();
        let mut cfg = config();
        let ap = table.lookup("NRS_FULL_IFU").unwrap();
        NirSpec.on_aperture_changed(&mut cfg, ap, &table).unwrap();
        assert!(cfg.is_ifu());
        assert_eq!(cfg.disperser.as_deref(), Some("PRISM"));
        assert_eq!(cfg.filter, "CLEAR");
        assert_eq!(cfg.image_mask, None);
        assert_eq!(cfg.band.as_deref(), Some("PRISM/CLEAR"));
        assert_eq!(cfg.rotation, Some(ap.v3_idl_yang));
    }

    #[test]
    fn test_band_sets_disperser_and_filter() {
        let mut cfg = config();
        let band = IFU_BANDS.iter().find(|b| b.name == "G235H/F170LP").unwrap();
        assert!(NirSpec.apply_band(&mut cfg, band).is_empty());
        assert_eq!(cfg.disperser.as_deref(), Some("G235H"));
        assert_eq!(cfg.filter, "F170LP");
    }

    #[test]
    fn test_slit_planes() {
        assert_eq!(slit_plane("S1600A1").unwrap().name, "S1600A1 square aperture");
        assert_eq!(slit_plane("IFU").unwrap().name, "IFU entrance");
        assert_eq!(
            slit_plane("MSA all open").unwrap().element,
            OpticalElement::MsaOpenGrid
        );
        assert!(slit_plane("S9000").is_none());
    }

    #[test]
    fn test_ifu_scale_uses_nrs1() {
        let table = builtin_table("nirspec").unwrap();
        let nrs1 = table.pixel_scale("NRS1_FULL").unwrap();
        assert_eq!(NirSpec.pixel_scale_rule("NRS_FULL_IFU", &table), Some(nrs1));
        assert_eq!(NirSpec.pixel_scale_rule("NRS_S200A1_SLIT", &table), None);
    }
}
