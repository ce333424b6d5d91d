//! MIRI: the imager with its four-quadrant phase masks, Lyot coronagraph and
//! LRS slit, plus the MRS integral field unit.

use log::{debug, info};

use super::{
    check_wavelength_range, ConfigAction, DetectorSpec, Family, FamilyOptics, FormatStep, IfuBand,
    IfuBroadening, SpliceContext, SpliceOutcome, WfeLocation,
};
use crate::catalog::masks::{resolve_mask, MaskEntry, MIRI_IMAGE_MASKS, MIRI_PUPIL_MASKS};
use crate::config::{InstrumentConfig, ObservingMode};
use crate::error::Result;
use crate::formatter::header::HeaderCard;
use crate::geometry::{Aperture, ApertureKind, GeometryTable};
use crate::optics::aberration::ZernikeFieldModel;
use crate::optics::plane::{
    AlignDirection, OcculterBox, OpticalElement, Plane, PlaneKind, PropagationMode,
};

pub const PIXELSCALE: f64 = (0.11083 + 0.11087) / 2.0;

/// Detectors are 1024 columns by 1032 rows.
const SIZE: (u32, u32) = (1024, 1032);

static DETECTORS: [DetectorSpec; 3] = [
    DetectorSpec::new("MIRIM", "MIRIM_FULL", SIZE),
    DetectorSpec::new("MIRIFUSHORT", "MIRIFU_CHANNEL1A", SIZE),
    DetectorSpec::new("MIRIFULONG", "MIRIFU_CHANNEL3A", SIZE),
];

static MODES: [(ObservingMode, &str); 2] = [
    (ObservingMode::Imaging, "MIRIM_FULL"),
    (ObservingMode::Ifu, "MIRIFU_CHANNEL1A"),
];

/// MRS cube-build parameters per sub-band.
static IFU_BANDS: [IfuBand; 12] = [
    IfuBand::new("1A", 0.13, 0.0008, 4.90, 5.74),
    IfuBand::new("1B", 0.13, 0.0008, 5.66, 6.63),
    IfuBand::new("1C", 0.13, 0.0008, 6.53, 7.65),
    IfuBand::new("2A", 0.17, 0.0013, 7.51, 8.77),
    IfuBand::new("2B", 0.17, 0.0013, 8.67, 10.13),
    IfuBand::new("2C", 0.17, 0.0013, 10.01, 11.70),
    IfuBand::new("3A", 0.20, 0.0025, 11.55, 13.47),
    IfuBand::new("3B", 0.20, 0.0025, 13.34, 15.57),
    IfuBand::new("3C", 0.20, 0.0025, 15.41, 17.98),
    IfuBand::new("4A", 0.35, 0.0060, 17.70, 20.95),
    IfuBand::new("4B", 0.35, 0.0060, 20.69, 24.48),
    IfuBand::new("4C", 0.35, 0.0060, 24.40, 28.70),
];

/// Slice width of an MRS channel, arcsec.
pub fn slice_width(band: &str) -> Option<f64> {
    match band.chars().next()? {
        '1' => Some(0.177),
        '2' => Some(0.280),
        '3' => Some(0.390),
        '4' => Some(0.656),
        _ => None,
    }
}

fn band_of(aperture: &str) -> Option<&str> {
    aperture.strip_prefix("MIRIFU_CHANNEL").filter(|b| b.len() == 2)
}

fn ifu_detector(band: &str) -> &'static str {
    if band.starts_with('3') || band.starts_with('4') {
        "MIRIFULONG"
    } else {
        "MIRIFUSHORT"
    }
}

/// Lyot pupil selected by a coronagraphic filter.
fn auto_pupil(filter: &str) -> Option<&'static str> {
    if !filter.ends_with('C') {
        return None;
    }
    if filter.chars().nth(1) == Some('1') {
        Some("MASKFQPM")
    } else {
        Some("MASKLYOT")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Miri;

impl FamilyOptics for Miri {
    fn family(&self) -> Family {
        Family::MIRI
    }

    fn image_masks(&self) -> &'static [MaskEntry] {
        MIRI_IMAGE_MASKS
    }

    fn pupil_masks(&self) -> &'static [MaskEntry] {
        MIRI_PUPIL_MASKS
    }

    fn detectors(&self) -> &'static [DetectorSpec] {
        &DETECTORS
    }

    fn default_filter(&self) -> &'static str {
        "F560W"
    }

    fn default_pixel_scale(&self) -> f64 {
        PIXELSCALE
    }

    fn default_position(&self) -> (u32, u32) {
        (512, 512)
    }

    fn default_fov_arcsec(&self) -> f64 {
        12.0
    }

    fn pupil_shift_default(&self) -> (f64, f64) {
        (-0.0068, -0.0110)
    }

    fn modes(&self) -> &'static [(ObservingMode, &'static str)] {
        &MODES
    }

    fn ifu_bands(&self) -> &'static [IfuBand] {
        &IFU_BANDS
    }

    fn aperture_rule(&self, cfg: &InstrumentConfig) -> Option<String> {
        if let Some(mask) = cfg.image_mask.as_deref() {
            if mask.contains("LRS") {
                return Some("MIRIM_FULL".to_string());
            }
            if let Some(ap) = resolve_mask(MIRI_IMAGE_MASKS, mask).and_then(|m| m.aperture) {
                return Some(ap.to_string());
            }
        }
        let detector_default = self.detector(&cfg.detector).map(|d| d.default_aperture.to_string());
        match cfg.mode {
            ObservingMode::Imaging if cfg.detector.starts_with("MIRIFU") => detector_default,
            ObservingMode::Imaging => Some("MIRIM_FULL".to_string()),
            ObservingMode::Ifu => {
                let current = cfg.aperture_name.as_deref();
                let keeps = current
                    .and_then(|ap| self.detector_for_aperture(ap))
                    .is_some_and(|det| det == cfg.detector);
                if keeps {
                    None
                } else {
                    detector_default
                }
            }
        }
    }

    fn pixel_scale_rule(&self, aperture: &str, _table: &GeometryTable) -> Option<f64> {
        let band = band_of(aperture)?;
        IFU_BANDS.iter().find(|b| b.name == band).map(|b| b.spaxel)
    }

    fn detector_for_aperture(&self, aperture: &str) -> Option<String> {
        if aperture.starts_with("MIRIM") {
            return Some("MIRIM".to_string());
        }
        band_of(aperture).map(|band| ifu_detector(band).to_string())
    }

    fn on_filter_changed(&self, cfg: &mut InstrumentConfig) -> Vec<ConfigAction> {
        let mut actions = Vec::new();
        if cfg.auto_pupil {
            actions.push(ConfigAction::SetPupilMask(auto_pupil(&cfg.filter).map(str::to_string)));
        }
        actions.push(ConfigAction::Resync);
        actions
    }

    fn on_image_mask_changed(&self, cfg: &InstrumentConfig) -> Vec<ConfigAction> {
        let mapped = cfg
            .image_mask
            .as_deref()
            .and_then(|m| resolve_mask(MIRI_IMAGE_MASKS, m))
            .and_then(|m| m.aperture);
        match mapped {
            Some(ap) => vec![ConfigAction::PositionFrom(ap.to_string())],
            None => vec![ConfigAction::Resync],
        }
    }

    fn on_aperture_changed(
        &self,
        cfg: &mut InstrumentConfig,
        aperture: &Aperture,
        table: &GeometryTable,
    ) -> Result<()> {
        let name = aperture.name.as_str();
        if name.starts_with("MIRIM") {
            cfg.rotation = Some(table.lookup("MIRIM_FULL")?.v3_idl_yang);
        } else if name.starts_with("MIRIFU") {
            cfg.rotation = Some(aperture.corner_rotation());
        }

        cfg.mode = if name.starts_with("MIRIFU") {
            ObservingMode::Ifu
        } else {
            ObservingMode::Imaging
        };
        if cfg.is_ifu() {
            let band = &name[name.len().saturating_sub(2)..];
            cfg.band = Some(band.to_string());
            cfg.detector = ifu_detector(band).to_string();
            debug!("MIRI IFU band {band} on {}", cfg.detector);
        } else {
            cfg.band = None;
        }
        Ok(())
    }

    fn apply_band(&self, _cfg: &mut InstrumentConfig, band: &IfuBand) -> Vec<ConfigAction> {
        vec![ConfigAction::SetAperture(format!("MIRIFU_CHANNEL{}", band.name))]
    }

    fn header_keywords(&self, cfg: &InstrumentConfig) -> Vec<HeaderCard> {
        let mut cards = vec![
            HeaderCard::new("GRATNG14", "None", "MRS Grating for channels 1 and 4"),
            HeaderCard::new("GRATNG23", "None", "MRS Grating for channels 2 and 3"),
            HeaderCard::new("FLATTYPE", "?", "Type of flat field to be used: all, one, principal"),
            HeaderCard::new(
                "CCCSTATE",
                "open",
                "Contamination Control Cover state: open, closed, locked",
            ),
        ];
        if cfg.image_mask.is_some() {
            cards.push(HeaderCard::new("TACQNAME", "None", "Target acquisition file name"));
        }
        if let (true, Some(band)) = (cfg.is_ifu(), cfg.band.as_deref()) {
            cards.push(HeaderCard::new("MODE", "IFU", "This is a MIRI MRS IFU mode simulation"));
            cards.push(HeaderCard::new(
                "FILTER",
                format!("MIRIFU_CHANNEL{band}"),
                "MIRI IFU sub-band simulated",
            ));
            cards.push(HeaderCard::new("BAND", band, "MIRI IFU sub-band simulated"));
        }
        cards
    }

    fn field_model(&self, _location: WfeLocation) -> ZernikeFieldModel {
        ZernikeFieldModel {
            label: "MIRI internal WFE",
            center: (-453.56, -373.81),
            base: [0.0, 0.0, 0.0, 42.0, 18.0, -14.5, 9.0, 6.5, -4.0, 3.2, 11.0],
            dv2: [0.0, 0.0, 0.0, 0.06, 0.02, -0.01, 0.005, 0.0, 0.0, 0.0, 0.01],
            dv3: [0.0, 0.0, 0.0, -0.04, 0.0, 0.02, 0.0, 0.006, 0.003, 0.0, 0.0],
        }
    }

    fn splice(&self, ctx: &SpliceContext<'_>, mut planes: Vec<Plane>) -> Result<SpliceOutcome> {
        let cfg = ctx.config;
        let opts = &cfg.options;
        let rotation = cfg.rotation.unwrap_or(0.0);
        let image_mask = cfg.image_mask.as_deref();

        if let Some(i) = planes.iter().position(|p| p.kind == PlaneKind::Rotation) {
            planes.remove(i);
        }
        let aberration = planes
            .iter()
            .position(Plane::is_field_aberration)
            .map(|i| planes.remove(i));

        let fqpm = image_mask.is_some_and(|m| m.contains("FQPM")) || opts.force_fqpm_shift;
        if fqpm {
            planes.push(Plane::pupil(
                "FQPM FFT aligner",
                OpticalElement::FqpmAligner {
                    direction: AlignDirection::Forward,
                },
            ));
        }

        let shift = ctx.coron_shift();
        let mut sam_box = None;
        let lrs = image_mask == Some("LRS slit");
        let fqpm_element = |label: &str, wavelength: f64| {
            Plane::image(
                label,
                OpticalElement::Compound { parts: vec![
                    OpticalElement::IdealFqpm { wavelength, shift },
                    OpticalElement::SquareFieldStop {
                        size: 24.0,
                        angle: rotation,
                        shift,
                    },
                ] },
            )
        };
        let image_plane = match image_mask {
            Some("FQPM1065") => fqpm_element("MIRI FQPM 1065", 10.65e-6),
            Some("FQPM1140") => fqpm_element("MIRI FQPM 1140", 11.40e-6),
            Some("FQPM1550") => fqpm_element("MIRI FQPM 1550", 15.50e-6),
            Some("LYOT2300") => {
                sam_box = Some(OcculterBox::Rect(5.0, 20.0));
                Plane::image(
                    "MIRI Lyot Occulter",
                    OpticalElement::Compound { parts: vec![
                        OpticalElement::CircularOcculter {
                            radius: 4.25 / 2.0,
                            shift,
                        },
                        OpticalElement::BarOcculter {
                            width: 0.722,
                            height: 31.0,
                            shift,
                        },
                        OpticalElement::SquareFieldStop {
                            size: 30.0,
                            angle: rotation,
                            shift,
                        },
                    ] },
                )
            }
            Some(mask) if lrs => {
                let lrs_shift = match (opts.lrs_slit_offset_x, opts.lrs_slit_offset_y) {
                    (None, None) => None,
                    (x, y) => Some((x.unwrap_or(0.0), y.unwrap_or(0.0))),
                };
                let slit = OpticalElement::RectangularFieldStop {
                    width: 4.72345,
                    height: 0.51525,
                    angle: rotation,
                    shift: lrs_shift,
                };
                let element = if opts.lrs_use_mft {
                    let pixelscale = 0.02;
                    OpticalElement::FixedSampling {
                        inner: Box::new(slit),
                        npix: (5.5_f64 / pixelscale) as u32,
                        pixelscale,
                        oversample: 8,
                    }
                } else {
                    slit
                };
                Plane::image(mask, element)
            }
            _ => Plane::image(
                "Image plane",
                OpticalElement::ScalarTransmission { transmission: 1.0 },
            ),
        };
        planes.push(image_plane);

        if fqpm {
            planes.push(Plane::pupil(
                "FQPM FFT aligner",
                OpticalElement::FqpmAligner {
                    direction: AlignDirection::Backward,
                },
            ));
        }

        let pupil = cfg.pupil_mask.as_deref();
        if opts.coron_include_pre_lyot_plane && pupil.is_some_and(|p| p.starts_with("MASK")) {
            planes.push(
                Plane::pupil(
                    "Pre Lyot Stop",
                    OpticalElement::ScalarTransmission { transmission: 1.0 },
                )
                .with_hint("intensity"),
            );
        }

        let pupil_shift = ctx.pupil_shift(self);
        let pupil_rotation = ctx.pupil_rotation(self);
        let stop = |file: &str, name: &str| {
            Plane::pupil(name, OpticalElement::TransmissionFile { file: file.to_string() })
                .flipped(false, true)
                .with_geometry(pupil_shift, pupil_rotation)
                .with_hint("intensity")
        };
        let pupil_plane = match pupil {
            Some(p @ "MASKFQPM") => stop("MIRI_FQPMLyotStop.fits.gz", p),
            Some(p @ "MASKLYOT") => stop("MIRI_LyotLyotStop.fits.gz", p),
            Some("P750L") => stop("MIRI_LRS_Pupil_Stop.fits.gz", "P750L"),
            _ if lrs => stop(
                "MIRI_LRS_Pupil_Stop.fits.gz",
                pupil.unwrap_or("MIRI internal pupil stop"),
            ),
            _ => Plane::pupil(
                "filter cold stop",
                OpticalElement::TransmissionFile {
                    file: "tricontagon.fits.gz".to_string(),
                },
            )
            .with_geometry(pupil_shift, pupil_rotation),
        };
        planes.push(pupil_plane);

        planes.push(Plane::rotation_plane(-rotation));
        if let Some(aberration) = aberration {
            planes.push(aberration);
        }

        let mut outcome = SpliceOutcome::new(planes);
        outcome.sam_box = sam_box;
        if lrs && opts.lrs_use_mft {
            info!("Setting up matrix Fourier propagation around the MIRI LRS slit");
            outcome.propagation = Some(PropagationMode::MatrixFourier);
            outcome.sam_box = Some(OcculterBox::Rect(1.0, 3.0));
        }
        Ok(outcome)
    }

    fn formatter_pipeline(&self, cfg: &InstrumentConfig, aperture: &Aperture) -> Vec<FormatStep> {
        if cfg.is_ifu() {
            vec![FormatStep::IfuBroadening]
        } else if aperture.kind == ApertureKind::Slit {
            // No distortion model for slit apertures
            vec![FormatStep::Cruciform, FormatStep::ChargeDiffusion]
        } else {
            vec![FormatStep::Distortion, FormatStep::Cruciform, FormatStep::ChargeDiffusion]
        }
    }

    fn charge_diffusion_sigma(&self, _cfg: &InstrumentConfig) -> f64 {
        0.070
    }

    fn ipc_coefficients(&self, _cfg: &InstrumentConfig) -> (f64, f64) {
        (0.0026, 0.0003)
    }

    fn ifu_broadening(&self, cfg: &InstrumentConfig) -> Option<IfuBroadening> {
        let width = slice_width(cfg.band.as_deref()?)?;
        Some(IfuBroadening::SliceBox { width })
    }

    fn validate_wavelengths(&self, _cfg: &InstrumentConfig, wavelengths: &[f64]) -> Result<()> {
        check_wavelength_range(Family::MIRI, wavelengths, 4.5, 29.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::builtin::builtin_table;

    fn config() -> InstrumentConfig {
        let mut cfg = InstrumentConfig::new("F560W", "MIRIM", PIXELSCALE);
        cfg.aperture_name = Some("MIRIM_FULL".to_string());
        cfg
    }

    #[test]
    fn test_auto_pupil_for_coronagraph_filters() {
        assert_eq!(auto_pupil("F1065C"), Some("MASKFQPM"));
        assert_eq!(auto_pupil("F1550C"), Some("MASKFQPM"));
        assert_eq!(auto_pupil("F2300C"), Some("MASKLYOT"));
        assert_eq!(auto_pupil("F1000W"), None);
    }

    #[test]
    fn test_aperture_rule() {
        let mut cfg = config();
        assert_eq!(Miri.aperture_rule(&cfg).as_deref(), Some("MIRIM_FULL"));
        cfg.image_mask = Some("FQPM1140".to_string());
        assert_eq!(Miri.aperture_rule(&cfg).as_deref(), Some("MIRIM_CORON1140"));
        cfg.image_mask = Some("LRS slit".to_string());
        assert_eq!(Miri.aperture_rule(&cfg).as_deref(), Some("MIRIM_FULL"));
    }

    #[test]
    fn test_ifu_rule_keeps_selected_band() {
        let mut cfg = config();
        cfg.mode = ObservingMode::Ifu;
        cfg.detector = "MIRIFUSHORT".to_string();
        cfg.aperture_name = Some("MIRIFU_CHANNEL2B".to_string());
        assert_eq!(Miri.aperture_rule(&cfg), None);
        cfg.detector = "MIRIFULONG".to_string();
        assert_eq!(Miri.aperture_rule(&cfg).as_deref(), Some("MIRIFU_CHANNEL3A"));
    }

    #[test]
    fn test_aperture_hook_sets_ifu_state() {
        let table = builtin_table("miri").unwrap();
        let mut cfg = config();
        let ap = table.lookup("MIRIFU_CHANNEL4B").unwrap();
        Miri.on_aperture_changed(&mut cfg, ap, &table).unwrap();
        assert!(cfg.is_ifu());
        assert_eq!(cfg.band.as_deref(), Some("4B"));
        assert_eq!(cfg.detector, "MIRIFULONG");
        assert_eq!(cfg.rotation, Some(ap.corner_rotation()));

        let ap = table.lookup("MIRIM_CORON1065").unwrap();
        Miri.on_aperture_changed(&mut cfg, ap, &table).unwrap();
        assert!(!cfg.is_ifu());
        assert_eq!(cfg.rotation, Some(4.83544897));
    }

    #[test]
    fn test_distortion_follows_aperture_kind() {
        let table = builtin_table("miri").unwrap();
        let mut cfg = config();
        cfg.image_mask = Some("LRS slit".to_string());
        let full = table.lookup("MIRIM_FULL").unwrap();
        assert_eq!(
            Miri.formatter_pipeline(&cfg, full),
            vec![FormatStep::Distortion, FormatStep::Cruciform, FormatStep::ChargeDiffusion]
        );
        let slit = table.lookup("MIRIM_SLIT").unwrap();
        assert_eq!(
            Miri.formatter_pipeline(&cfg, slit),
            vec![FormatStep::Cruciform, FormatStep::ChargeDiffusion]
        );
    }

    #[test]
    fn test_spaxel_scale_for_ifu_apertures() {
        let table = builtin_table("miri").unwrap();
        assert_eq!(Miri.pixel_scale_rule("MIRIFU_CHANNEL3C", &table), Some(0.20));
        assert_eq!(Miri.pixel_scale_rule("MIRIM_FULL", &table), None);
        assert_eq!(slice_width("2A"), Some(0.280));
    }
}
