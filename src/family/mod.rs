//! Instrument-family optics providers.
//!
//! Each family is a zero-sized strategy implementing [`FamilyOptics`]. The
//! provider owns the family's reference data (catalogs, detectors, defaults)
//! and the rule functions the configuration state consults when it changes.
//! Rules that only touch plain fields mutate the [`InstrumentConfig`] directly;
//! rules that must go back through a validated setter return
//! [`ConfigAction`]s for the instrument to execute.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::catalog::{filter_catalog, FilterCatalog, MaskEntry};
use crate::config::{InstrumentConfig, ObservingMode};
use crate::error::{OpticsError, Result};
use crate::formatter::header::HeaderCard;
use crate::geometry::{Aperture, GeometryTable};
use crate::optics::aberration::ZernikeFieldModel;
use crate::optics::plane::{OcculterBox, Plane, PropagationMode};
use crate::optics::pupil::PUPIL_DIAMETER;

pub mod fgs;
pub mod miri;
pub mod nircam;
pub mod niriss;
pub mod nirspec;

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Family {
    NIRCam,
    MIRI,
    NIRSpec,
    NIRISS,
    FGS,
}

impl Family {
    pub const ALL: [Family; 5] = [
        Family::NIRCam,
        Family::MIRI,
        Family::NIRSpec,
        Family::NIRISS,
        Family::FGS,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Family::NIRCam => "NIRCam",
            Family::MIRI => "MIRI",
            Family::NIRSpec => "NIRSpec",
            Family::NIRISS => "NIRISS",
            Family::FGS => "FGS",
        }
    }

    /// Shared provider for this family.
    pub fn provider(self) -> &'static dyn FamilyOptics {
        match self {
            Family::NIRCam => &nircam::NirCam,
            Family::MIRI => &miri::Miri,
            Family::NIRSpec => &nirspec::NirSpec,
            Family::NIRISS => &niriss::Niriss,
            Family::FGS => &fgs::Fgs,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Family {
    type Err = OpticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nircam" | "nrc" => Ok(Family::NIRCam),
            "miri" | "mir" => Ok(Family::MIRI),
            "nirspec" | "nrs" => Ok(Family::NIRSpec),
            "niriss" | "nis" => Ok(Family::NIRISS),
            "fgs" => Ok(Family::FGS),
            other => Err(OpticsError::Data(format!("unknown instrument '{other}'"))),
        }
    }
}

/// One detector of a family and the aperture selected when it becomes active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorSpec {
    pub name: &'static str,
    pub default_aperture: &'static str,
    /// (width, height), pixels
    pub size: (u32, u32),
}

impl DetectorSpec {
    pub const fn new(name: &'static str, default_aperture: &'static str, size: (u32, u32)) -> Self {
        Self {
            name,
            default_aperture,
            size,
        }
    }
}

/// Pipeline data-cube parameters of one IFU band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IfuBand {
    pub name: &'static str,
    /// Spaxel size, arcsec
    pub spaxel: f64,
    /// Spectral step, microns
    pub wave_step: f64,
    pub wave_min: f64,
    pub wave_max: f64,
}

impl IfuBand {
    pub const fn new(
        name: &'static str,
        spaxel: f64,
        wave_step: f64,
        wave_min: f64,
        wave_max: f64,
    ) -> Self {
        Self {
            name,
            spaxel,
            wave_step,
            wave_min,
            wave_max,
        }
    }

    /// Wavelengths spanning the band in microns: `n` evenly spaced values, or the
    /// pipeline spectral sampling when `n` is `None`.
    pub fn wavelengths(&self, n: Option<usize>) -> Vec<f64> {
        match n {
            Some(0) => Vec::new(),
            Some(1) => vec![self.wave_min],
            Some(n) => {
                let step = (self.wave_max - self.wave_min) / (n - 1) as f64;
                (0..n).map(|i| self.wave_min + step * i as f64).collect()
            }
            None => {
                let n = (self.wave_max - self.wave_min) / self.wave_step;
                // Half-open range; an exact multiple excludes the endpoint.
                let count = if (n - n.round()).abs() < 1e-6 {
                    n.round()
                } else {
                    n.ceil()
                } as usize;
                (0..count).map(|i| self.wave_min + self.wave_step * i as f64).collect()
            }
        }
    }
}

/// A state change that must go back through the validated setters.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigAction {
    /// Rerun the aperture rule
    Resync,
    /// Move the field point to the current aperture
    PositionFromCurrent,
    /// Move the field point to a named aperture
    PositionFrom(String),
    SetAperture(String),
    SetPupilMask(Option<String>),
}

/// Post-propagation processing steps applied to the distorted extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FormatStep {
    /// Rotate into the detector frame and crop to the original size
    RotateToDetector,
    Distortion,
    ChargeDiffusion,
    /// MIRI Si:As cross-shaped internal scattering
    Cruciform,
    IfuBroadening,
}

/// Empirical IFU broadening model, arcsec.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum IfuBroadening {
    /// Box of one slice width across the slices
    SliceBox { width: f64 },
    Gaussian { sigma_x: f64, sigma_y: f64 },
}

/// Where a field-dependent WFE model applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WfeLocation {
    Instrument,
    /// NIRSpec collimator and camera
    Spectrograph,
}

/// Inputs to [`FamilyOptics::splice`].
#[derive(Debug, Clone, Copy)]
pub struct SpliceContext<'a> {
    pub config: &'a InstrumentConfig,
    pub table: &'a GeometryTable,
    pub oversample: u32,
    /// Entrance pupil diameter, meters
    pub pupil_diameter: f64,
    pub pupil_npix: usize,
    /// Telescope (V2, V3) of the field point, arcsec
    pub field_point: (f64, f64),
}

impl SpliceContext<'_> {
    /// Pupil-mask shear in meters, `None` when both components are zero.
    pub fn pupil_shift(&self, provider: &dyn FamilyOptics) -> Option<(f64, f64)> {
        let (dx, dy) = provider.pupil_shift_default();
        let sx = self.config.options.pupil_shift_x.unwrap_or(dx);
        let sy = self.config.options.pupil_shift_y.unwrap_or(dy);
        if sx == 0.0 && sy == 0.0 {
            return None;
        }
        Some((sx * PUPIL_DIAMETER, sy * PUPIL_DIAMETER))
    }

    pub fn pupil_rotation(&self, provider: &dyn FamilyOptics) -> Option<f64> {
        self.config.options.pupil_rotation.or(provider.pupil_rotation_default())
    }

    /// Coronagraph mask shift from the options, arcsec.
    pub fn coron_shift(&self) -> Option<(f64, f64)> {
        let opts = &self.config.options;
        match (opts.coron_shift_x, opts.coron_shift_y) {
            (None, None) => None,
            (x, y) => Some((x.unwrap_or(0.0), y.unwrap_or(0.0))),
        }
    }
}

/// Result of a family splice.
#[derive(Debug, Clone, PartialEq)]
pub struct SpliceOutcome {
    pub planes: Vec<Plane>,
    pub try_sam: bool,
    pub sam_box: Option<OcculterBox>,
    /// Forces a propagation mode regardless of `try_sam`
    pub propagation: Option<PropagationMode>,
}

impl SpliceOutcome {
    pub fn new(planes: Vec<Plane>) -> Self {
        Self {
            planes,
            try_sam: false,
            sam_box: None,
            propagation: None,
        }
    }
}

/// Family strategy consulted by the configuration state, the assembler and the
/// output formatter.
pub trait FamilyOptics: Send + Sync {
    fn family(&self) -> Family;

    fn filters(&self) -> Result<&'static FilterCatalog> {
        filter_catalog(self.family())
    }

    fn image_masks(&self) -> &'static [MaskEntry];
    fn pupil_masks(&self) -> &'static [MaskEntry];
    fn detectors(&self) -> &'static [DetectorSpec];

    fn detector(&self, name: &str) -> Option<&'static DetectorSpec> {
        self.detectors().iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }

    fn detector_dims(&self, detector: &str) -> Option<(u32, u32)> {
        self.detector(detector).map(|d| d.size)
    }

    /// Map legacy detector names onto table entries.
    fn detector_alias(&self, name: &str) -> Option<String> {
        let _ = name;
        None
    }

    fn default_filter(&self) -> &'static str;
    fn default_detector(&self) -> &'static str {
        self.detectors()[0].name
    }
    fn default_pixel_scale(&self) -> f64;
    fn default_position(&self) -> (u32, u32) {
        (1024, 1024)
    }
    fn default_fov_arcsec(&self) -> f64 {
        5.0
    }
    fn default_pupil_mask(&self) -> Option<&'static str> {
        None
    }
    fn default_image_mask(&self) -> Option<&'static str> {
        None
    }
    /// Pupil shear as a fraction of the pupil diameter.
    fn pupil_shift_default(&self) -> (f64, f64);
    fn pupil_rotation_default(&self) -> Option<f64> {
        None
    }
    /// Detector rotation before any aperture is selected, degrees.
    fn default_rotation(&self) -> Option<f64> {
        None
    }

    /// Observing modes and the aperture each selects.
    fn modes(&self) -> &'static [(ObservingMode, &'static str)] {
        &[]
    }
    fn ifu_bands(&self) -> &'static [IfuBand] {
        &[]
    }
    fn dispersers(&self) -> &'static [&'static str] {
        &[]
    }

    /// Aperture the configuration should use, or `None` to keep the current one.
    fn aperture_rule(&self, cfg: &InstrumentConfig) -> Option<String> {
        self.detector(&cfg.detector).map(|d| d.default_aperture.to_string())
    }

    /// Scale for apertures without their own pixel geometry.
    fn pixel_scale_rule(&self, aperture: &str, table: &GeometryTable) -> Option<f64> {
        let _ = (aperture, table);
        None
    }

    /// Detector implied by an aperture name, for families whose apertures
    /// carry it.
    fn detector_for_aperture(&self, aperture: &str) -> Option<String> {
        let _ = aperture;
        None
    }

    /// Make `detector` the active detector, with any coupled state changes.
    fn assign_detector(&self, cfg: &mut InstrumentConfig, detector: &str) {
        cfg.detector = detector.to_string();
    }

    fn on_filter_changed(&self, cfg: &mut InstrumentConfig) -> Vec<ConfigAction> {
        let _ = cfg;
        vec![ConfigAction::Resync]
    }

    fn on_image_mask_changed(&self, cfg: &InstrumentConfig) -> Vec<ConfigAction> {
        let _ = cfg;
        vec![ConfigAction::Resync]
    }

    fn on_pupil_mask_changed(&self, cfg: &InstrumentConfig) -> Vec<ConfigAction> {
        let _ = cfg;
        vec![ConfigAction::Resync]
    }

    /// Runs after a new aperture name is stored.
    fn on_aperture_changed(
        &self,
        cfg: &mut InstrumentConfig,
        aperture: &Aperture,
        table: &GeometryTable,
    ) -> Result<()> {
        let _ = (cfg, aperture, table);
        Ok(())
    }

    /// Store an IFU band selection.
    fn apply_band(&self, cfg: &mut InstrumentConfig, band: &IfuBand) -> Vec<ConfigAction> {
        cfg.band = Some(band.name.to_string());
        Vec::new()
    }

    /// Whether the filter itself puts internal optics in the beam.
    fn filter_needs_internal_optics(&self, filter: &str) -> bool {
        let _ = filter;
        false
    }

    fn header_keywords(&self, cfg: &InstrumentConfig) -> Vec<HeaderCard>;

    fn field_model(&self, location: WfeLocation) -> ZernikeFieldModel;

    /// Factor from the [`WfeLocation::Instrument`] model to the whole
    /// instrument WFE.
    fn si_wfe_scale(&self) -> f64 {
        1.0
    }

    fn splice(&self, ctx: &SpliceContext<'_>, planes: Vec<Plane>) -> Result<SpliceOutcome>;

    /// Detector-effect steps for the active aperture.
    fn formatter_pipeline(&self, cfg: &InstrumentConfig, aperture: &Aperture) -> Vec<FormatStep>;

    /// Charge diffusion Gaussian sigma for the active detector, arcsec.
    fn charge_diffusion_sigma(&self, cfg: &InstrumentConfig) -> f64;

    /// Nearest-neighbour IPC coupling and diagonal coupling.
    fn ipc_coefficients(&self, cfg: &InstrumentConfig) -> (f64, f64);

    /// IFU spatial broadening applied by the formatter.
    fn ifu_broadening(&self, cfg: &InstrumentConfig) -> Option<IfuBroadening> {
        let _ = cfg;
        None
    }

    /// One-sided post-pixel coupling, for detectors that show it.
    fn ppc_coefficient(&self, cfg: &InstrumentConfig) -> Option<f64> {
        let _ = cfg;
        None
    }

    /// Check that wavelengths (meters) are usable with the configuration.
    fn validate_wavelengths(&self, cfg: &InstrumentConfig, wavelengths: &[f64]) -> Result<()>;
}

/// Insert at `index`, appending when the list is shorter.
pub(crate) fn insert_at(planes: &mut Vec<Plane>, index: usize, plane: Plane) {
    let index = index.min(planes.len());
    planes.insert(index, plane);
}

/// Shared range check used by the family wavelength validators.
pub(crate) fn check_wavelength_range(
    family: Family,
    wavelengths: &[f64],
    min_um: f64,
    max_um: f64,
) -> Result<()> {
    for &wl in wavelengths {
        let um = wl * 1e6;
        if !(min_um..=max_um).contains(&um) {
            return Err(OpticsError::ConfigurationConflict(format!(
                "wavelength {um:.3} µm is outside the {family} range {min_um}-{max_um} µm"
            )));
        }
    }
    Ok(())
}

/// Filter wavelength code in units of 10 nm, e.g. 200 for F200W.
pub(crate) fn filter_wavelength_code(filter: &str) -> Option<u32> {
    if filter == "WLP4" {
        return Some(212);
    }
    filter.get(1..4).and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_aliases() {
        assert_eq!("nrc".parse::<Family>().unwrap(), Family::NIRCam);
        assert_eq!("MIRI".parse::<Family>().unwrap(), Family::MIRI);
        assert_eq!(" NIS ".parse::<Family>().unwrap(), Family::NIRISS);
        assert!("WFI".parse::<Family>().is_err());
    }

    #[test]
    fn test_every_family_has_consistent_defaults() {
        for family in Family::ALL {
            let p = family.provider();
            assert_eq!(p.family(), family);
            let filters = p.filters().unwrap();
            assert!(filters.resolve(p.default_filter()).is_some(), "{family}");
            assert!(p.detector(p.default_detector()).is_some(), "{family}");
        }
    }

    #[test]
    fn test_filter_wavelength_code() {
        assert_eq!(filter_wavelength_code("F200W"), Some(200));
        assert_eq!(filter_wavelength_code("F444W"), Some(444));
        assert_eq!(filter_wavelength_code("WLP4"), Some(212));
        assert_eq!(filter_wavelength_code("CLEAR"), None);
    }

    #[test]
    fn test_ifu_band_wavelengths() {
        let band = IfuBand::new("1A", 0.13, 0.0008, 4.90, 5.74);
        let w = band.wavelengths(Some(3));
        assert_eq!(w.len(), 3);
        assert!((w[2] - 5.74).abs() < 1e-12);
        let native = band.wavelengths(None);
        assert_eq!(native.len(), 1050);
    }
}
