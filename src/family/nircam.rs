//! NIRCam: two modules of four short-wave and one long-wave SCA, with
//! band-limited coronagraph masks, Lyot stops, weak lenses and the dispersed
//! Hartmann sensor in the pupil wheel.

use log::{debug, info};

use super::{
    check_wavelength_range, filter_wavelength_code, insert_at, ConfigAction, DetectorSpec, Family,
    FamilyOptics, FormatStep, SpliceContext, SpliceOutcome, WfeLocation,
};
use crate::catalog::masks::{MaskEntry, NIRCAM_IMAGE_MASKS, NIRCAM_PUPIL_MASKS};
use crate::config::{BarOffset, InstrumentConfig};
use crate::error::{OpticsError, Result};
use crate::formatter::header::HeaderCard;
use crate::geometry::Aperture;
use crate::optics::aberration::ZernikeFieldModel;
use crate::optics::plane::{OcculterBox, OpticalElement, Plane};

/// Default short-wave scale, NRCA1_FULL.
pub const PIXELSCALE_SHORT: f64 = (0.03108 + 0.03130) / 2.0;
/// Default long-wave scale, NRCA5_FULL.
pub const PIXELSCALE_LONG: f64 = (0.06292 + 0.06326) / 2.0;

/// Wavelength separating the two channels, microns.
const CHANNEL_SPLIT_UM: f64 = 2.35;

/// Weak lens powers are quoted in waves at this wavelength, meters.
const WEAK_LENS_REFERENCE_WAVELENGTH: f64 = 2.12e-6;

const SIZE: (u32, u32) = (2048, 2048);

static DETECTORS: [DetectorSpec; 10] = [
    DetectorSpec::new("NRCA1", "NRCA1_FULL", SIZE),
    DetectorSpec::new("NRCA2", "NRCA2_FULL", SIZE),
    DetectorSpec::new("NRCA3", "NRCA3_FULL", SIZE),
    DetectorSpec::new("NRCA4", "NRCA4_FULL", SIZE),
    DetectorSpec::new("NRCA5", "NRCA5_FULL", SIZE),
    DetectorSpec::new("NRCB1", "NRCB1_FULL", SIZE),
    DetectorSpec::new("NRCB2", "NRCB2_FULL", SIZE),
    DetectorSpec::new("NRCB3", "NRCB3_FULL", SIZE),
    DetectorSpec::new("NRCB4", "NRCB4_FULL", SIZE),
    DetectorSpec::new("NRCB5", "NRCB5_FULL", SIZE),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Short,
    Long,
}

impl Channel {
    pub fn of_detector(detector: &str) -> Self {
        if detector.ends_with('5') {
            Channel::Long
        } else {
            Channel::Short
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Channel::Short => "Short",
            Channel::Long => "Long",
        }
    }
}

/// Module letter of the active detector.
pub fn module(cfg: &InstrumentConfig) -> char {
    cfg.detector.chars().nth(3).unwrap_or('A')
}

pub fn channel(cfg: &InstrumentConfig) -> Channel {
    Channel::of_detector(&cfg.detector)
}

/// Move to the other channel, swapping the stored scale when it is the channel
/// default. Returns whether anything changed.
pub fn switch_channel(cfg: &mut InstrumentConfig, target: Channel) -> bool {
    if channel(cfg) == target {
        return false;
    }
    debug!("Automatically changing NIRCam channel to {}", target.label());
    let prefix: String = cfg.detector.chars().take(4).collect();
    match target {
        Channel::Long => {
            cfg.detector = format!("{prefix}5");
            if cfg.pixel_scale == PIXELSCALE_SHORT {
                cfg.pixel_scale = PIXELSCALE_LONG;
                info!(
                    "NIRCam pixel scale switched to {PIXELSCALE_LONG} arcsec/pixel \
                     for the long wave channel"
                );
            }
        }
        Channel::Short => {
            if cfg.detector.ends_with('5') {
                cfg.detector = format!("{prefix}1");
            }
            if cfg.pixel_scale == PIXELSCALE_LONG {
                cfg.pixel_scale = PIXELSCALE_SHORT;
                info!(
                    "NIRCam pixel scale switched to {PIXELSCALE_SHORT} arcsec/pixel \
                     for the short wave channel"
                );
            }
        }
    }
    true
}

fn image_mask_aperture(mask: &str, module: char) -> Option<&'static str> {
    let (a, b) = match mask {
        "MASKLWB" => ("NRCA5_FULL_MASKLWB", "NRCB5_MASKLWB"),
        "MASKSWB" => ("NRCA4_FULL_MASKSWB", "NRCB3_MASKSWB"),
        "MASK210R" => ("NRCA2_FULL_MASK210R", "NRCB1_MASK210R"),
        "MASK335R" => ("NRCA5_FULL_MASK335R", "NRCB5_MASK335R"),
        "MASK430R" => ("NRCA5_FULL_MASK430R", "NRCB5_MASK430R"),
        _ => return None,
    };
    Some(if module == 'A' { a } else { b })
}

/// Coronagraphic full-frame aperture for a Lyot stop with no occulter.
fn lyot_aperture(pupil: &str, channel: Channel, module: char) -> &'static str {
    let a = module == 'A';
    match channel {
        Channel::Long if pupil.contains("WEDGE") || pupil.contains("LWB") => {
            if a { "NRCA5_FULL_WEDGE_BAR" } else { "NRCB5_MASKLWB" }
        }
        Channel::Long => {
            if a { "NRCA5_FULL_WEDGE_RND" } else { "NRCB5_MASK335R" }
        }
        Channel::Short if pupil.contains("WEDGE") || pupil.contains("SWB") => {
            if a { "NRCA4_FULL_WEDGE_BAR" } else { "NRCB3_MASKSWB" }
        }
        Channel::Short => {
            if a { "NRCA2_FULL_WEDGE_RND" } else { "NRCB1_MASK210R" }
        }
    }
}

/// Weak lens in the beam, accounting for WLP4 sitting in the filter wheel.
fn weak_lens(pupil: Option<&str>, filter: &str) -> Option<(&'static str, f64)> {
    let wlp4_filter = filter == "WLP4";
    match pupil {
        Some("WEAK LENS +4") | Some("WLP4") => Some(("WLP4", 4.0)),
        None if wlp4_filter => Some(("WLP4", 4.0)),
        Some("WEAK LENS +8") => Some(("WLP8", 8.0)),
        Some("WLP8") if !wlp4_filter => Some(("WLP8", 8.0)),
        Some("WEAK LENS -8") => Some(("WLM8", -8.0)),
        Some("WLM8") if !wlp4_filter => Some(("WLM8", -8.0)),
        Some("WEAK LENS +12 (=4+8)") | Some("WLP12") | Some("WLP8") => Some(("WLP12", 12.0)),
        Some("WEAK LENS -4 (=4-8)") | Some("WLM4") | Some("WLM8") => Some(("WLM4", -4.0)),
        _ => None,
    }
}

/// Reference point along a bar occulter when no explicit offset is given.
fn auto_bar_offset(cfg: &InstrumentConfig) -> String {
    let aperture = cfg.aperture();
    if aperture.contains("MASK") {
        let last = aperture.rsplit('_').next().unwrap_or("");
        if last == "NARROW" {
            info!("Set bar offset to narrow based on current aperture name {aperture}");
            return "narrow".to_string();
        }
        if last.starts_with('F') {
            info!("Set bar offset to {last} based on current aperture name {aperture}");
            return last.to_string();
        }
    }
    info!("Set bar offset to {} based on current filter", cfg.filter);
    cfg.filter.clone()
}

fn bar_offsets(cfg: &InstrumentConfig) -> (Option<f64>, Option<String>) {
    match &cfg.options.bar_offset {
        Some(BarOffset::Arcsec(v)) => (Some(*v), None),
        Some(BarOffset::Named(name)) => match name.trim().parse::<f64>() {
            Ok(v) => (Some(v), None),
            Err(_) => (None, Some(name.clone())),
        },
        None => (None, Some(auto_bar_offset(cfg))),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NirCam;

impl FamilyOptics for NirCam {
    fn family(&self) -> Family {
        Family::NIRCam
    }

    fn image_masks(&self) -> &'static [MaskEntry] {
        NIRCAM_IMAGE_MASKS
    }

    fn pupil_masks(&self) -> &'static [MaskEntry] {
        NIRCAM_PUPIL_MASKS
    }

    fn detectors(&self) -> &'static [DetectorSpec] {
        &DETECTORS
    }

    fn detector_alias(&self, name: &str) -> Option<String> {
        let upper = name.trim().to_ascii_uppercase();
        upper.strip_suffix("LONG").map(|stem| format!("{stem}5"))
    }

    fn default_filter(&self) -> &'static str {
        "F200W"
    }

    fn default_pixel_scale(&self) -> f64 {
        PIXELSCALE_SHORT
    }

    fn pupil_shift_default(&self) -> (f64, f64) {
        (0.0, 0.0)
    }

    fn aperture_rule(&self, cfg: &InstrumentConfig) -> Option<String> {
        let module = module(cfg);
        if let Some(mask) = cfg.image_mask.as_deref() {
            if let Some(ap) = image_mask_aperture(mask, module) {
                debug!("Inferred {ap} from coronagraph focal plane mask {mask}");
                return Some(ap.to_string());
            }
        }
        if let Some(pupil) = cfg.pupil_mask.as_deref() {
            if cfg.image_mask.is_none() && (pupil.contains("LYOT") || pupil.contains("MASK")) {
                let ap = lyot_aperture(pupil, channel(cfg), module);
                debug!("Inferred {ap} from Lyot stop {pupil} with no occulter");
                return Some(ap.to_string());
            }
        }
        self.detector(&cfg.detector).map(|d| d.default_aperture.to_string())
    }

    fn detector_for_aperture(&self, aperture: &str) -> Option<String> {
        aperture
            .get(0..5)
            .filter(|d| d.starts_with("NRC"))
            .map(str::to_string)
    }

    fn assign_detector(&self, cfg: &mut InstrumentConfig, detector: &str) {
        switch_channel(cfg, Channel::of_detector(detector));
        cfg.detector = detector.to_string();
    }

    fn on_filter_changed(&self, cfg: &mut InstrumentConfig) -> Vec<ConfigAction> {
        if !cfg.auto_channel {
            return Vec::new();
        }
        let Some(wl) = filter_wavelength_code(&cfg.filter) else {
            return Vec::new();
        };
        let target = if wl >= 250 { Channel::Long } else { Channel::Short };
        if switch_channel(cfg, target) {
            vec![ConfigAction::Resync]
        } else {
            Vec::new()
        }
    }

    fn on_image_mask_changed(&self, _cfg: &InstrumentConfig) -> Vec<ConfigAction> {
        vec![ConfigAction::Resync, ConfigAction::PositionFromCurrent]
    }

    fn on_pupil_mask_changed(&self, _cfg: &InstrumentConfig) -> Vec<ConfigAction> {
        vec![ConfigAction::Resync, ConfigAction::PositionFromCurrent]
    }

    fn filter_needs_internal_optics(&self, filter: &str) -> bool {
        filter.contains("WL")
    }

    fn header_keywords(&self, cfg: &InstrumentConfig) -> Vec<HeaderCard> {
        vec![
            HeaderCard::new("MODULE", module(cfg).to_string(), "NIRCam module: A or B"),
            HeaderCard::new("CHANNEL", channel(cfg).label(), "NIRCam channel: long or short"),
            HeaderCard::new("PILIN", "False", "Pupil imaging lens in optical path: T/F"),
        ]
    }

    fn field_model(&self, _location: WfeLocation) -> ZernikeFieldModel {
        ZernikeFieldModel {
            label: "NIRCam internal WFE",
            center: (0.0, -493.0),
            base: [0.0, 0.0, 0.0, 18.0, 9.5, -6.2, 4.1, -3.3, 2.2, 1.4, 6.0],
            dv2: [0.0, 0.0, 0.0, 0.035, -0.012, 0.018, 0.004, 0.0, 0.002, 0.0, 0.006],
            dv3: [0.0, 0.0, 0.0, -0.028, 0.010, 0.015, 0.0, 0.005, 0.0, 0.002, -0.004],
        }
    }

    fn splice(&self, ctx: &SpliceContext<'_>, mut planes: Vec<Plane>) -> Result<SpliceOutcome> {
        let cfg = ctx.config;
        let opts = &cfg.options;
        let pupil = cfg.pupil_mask.as_deref();
        let mut sam_box = None;

        match cfg.image_mask.as_deref() {
            Some(mask) if mask.ends_with('R') => {
                let element = OpticalElement::BandLimitedCoron {
                    mask: mask.to_string(),
                    module: module(cfg),
                    nd_squares: opts.nd_squares,
                    bar_offset: None,
                    auto_offset: None,
                    shift: ctx.coron_shift(),
                };
                insert_at(&mut planes, 2, Plane::image(mask, element));
                sam_box = Some(OcculterBox::Square(5.0));
            }
            Some(mask) if mask.ends_with("WB") => {
                let (bar_offset, auto_offset) = bar_offsets(cfg);
                let element = OpticalElement::BandLimitedCoron {
                    mask: mask.to_string(),
                    module: module(cfg),
                    nd_squares: opts.nd_squares,
                    bar_offset,
                    auto_offset,
                    shift: ctx.coron_shift(),
                };
                insert_at(&mut planes, 2, Plane::image(mask, element));
                sam_box = Some(OcculterBox::Rect(5.0, 20.0));
            }
            Some(_) => {}
            None => {
                if let Some(p) = pupil {
                    let upper = p.to_ascii_uppercase();
                    if !upper.contains("LENS") && !upper.contains("WL") && !upper.contains("DHS") {
                        let plane = Plane::image(
                            "No Image Mask Selected!",
                            OpticalElement::ScalarTransmission { transmission: 1.0 },
                        );
                        insert_at(&mut planes, 2, plane);
                    }
                }
            }
        }

        let shift = ctx.pupil_shift(self);
        let rotation = ctx.pupil_rotation(self);
        let lyot = |file: &str, name: &str| {
            Plane::pupil(name, OpticalElement::TransmissionFile { file: file.to_string() })
                .flipped(false, true)
                .with_geometry(shift, rotation)
                .with_hint("intensity")
        };

        match pupil {
            Some(p @ ("CIRCLYOT" | "MASKRND")) => {
                insert_at(&mut planes, 3, lyot("NIRCam_Lyot_Somb.fits.gz", p))
            }
            Some(p @ ("WEDGELYOT" | "MASKSWB" | "MASKLWB")) => {
                insert_at(&mut planes, 3, lyot("NIRCam_Lyot_Sinc.fits.gz", p))
            }
            _ => {
                if let Some((lens, nwaves)) = weak_lens(pupil, &cfg.filter) {
                    let element = OpticalElement::WeakLens {
                        lens: lens.to_string(),
                        nwaves,
                        reference_wavelength: WEAK_LENS_REFERENCE_WAVELENGTH,
                    };
                    let plane = Plane::pupil(lens, element).with_geometry(shift, rotation);
                    insert_at(&mut planes, 3, plane);
                } else if pupil.is_none() && cfg.image_mask.is_some() {
                    let plane = Plane::pupil(
                        "No Lyot Mask Selected!",
                        OpticalElement::ScalarTransmission { transmission: 1.0 },
                    );
                    insert_at(&mut planes, 3, plane);
                } else if let Some(p) = pupil.filter(|p| p.starts_with("DHS")) {
                    insert_at(&mut planes, 3, lyot(&format!("NIRCam_{p}_npix1024.fits.gz"), p));
                } else {
                    let plane = Plane::pupil(
                        "filter stop",
                        OpticalElement::TransmissionFile {
                            file: "tricontagon_oversized_4pct.fits.gz".to_string(),
                        },
                    )
                    .with_geometry(shift, rotation);
                    planes.push(plane);
                }
            }
        }

        if opts.coron_include_pre_lyot_plane && pupil.is_some_and(|p| p.starts_with("MASK")) {
            let plane = Plane::pupil(
                "Pre Lyot Stop",
                OpticalElement::ScalarTransmission { transmission: 1.0 },
            )
            .with_hint("intensity");
            insert_at(&mut planes, 3, plane);
        }

        let mut outcome = SpliceOutcome::new(planes);
        outcome.sam_box = sam_box;
        Ok(outcome)
    }

    fn formatter_pipeline(&self, _cfg: &InstrumentConfig, _aperture: &Aperture) -> Vec<FormatStep> {
        vec![FormatStep::RotateToDetector, FormatStep::Distortion, FormatStep::ChargeDiffusion]
    }

    fn charge_diffusion_sigma(&self, cfg: &InstrumentConfig) -> f64 {
        match channel(cfg) {
            Channel::Short => 0.0062,
            Channel::Long => 0.0065,
        }
    }

    fn ipc_coefficients(&self, cfg: &InstrumentConfig) -> (f64, f64) {
        match channel(cfg) {
            Channel::Short => (0.0060, 0.0005),
            Channel::Long => (0.0049, 0.0004),
        }
    }

    fn ppc_coefficient(&self, cfg: &InstrumentConfig) -> Option<f64> {
        Some(match channel(cfg) {
            Channel::Short => 0.0033,
            Channel::Long => 0.0024,
        })
    }

    fn validate_wavelengths(&self, cfg: &InstrumentConfig, wavelengths: &[f64]) -> Result<()> {
        check_wavelength_range(Family::NIRCam, wavelengths, 0.6, 5.3)?;
        let split = CHANNEL_SPLIT_UM * 1e-6;
        let ch = channel(cfg);
        let mismatch = match ch {
            Channel::Short => wavelengths.iter().any(|&w| w > split),
            Channel::Long => wavelengths.iter().any(|&w| w < split),
        };
        if mismatch {
            return Err(OpticsError::ConfigurationConflict(format!(
                "NIRCam {} channel cannot simulate wavelengths on the other side of \
                 {CHANNEL_SPLIT_UM} µm; select the matching detector or filter first",
                ch.label()
            )));
        }
        Ok(())
    }
}
