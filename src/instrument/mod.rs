//! Configurable instrument: one [`InstrumentConfig`] plus its family strategy.
//!
//! All mutation goes through the validated setters here. Family rules run
//! after each change and may request further setter calls, which are executed
//! in order by [`Instrument::run_actions`].

pub mod sync;

use std::fmt;
use std::sync::Arc;

use log::{debug, info};

use ndarray::Array2;

use crate::catalog::{is_clear, mask_names, resolve_mask};
use crate::config::{CalcOptions, InstrumentConfig, ObservingMode};
use crate::error::{OpticsError, Result, ValidationError};
use crate::family::nircam;
use crate::family::{ConfigAction, Family, FamilyOptics, WfeLocation};
use crate::geometry::{ApertureKind, DetectorGeometry, GeometryCache, GeometryTable};
use crate::optics::pupil::{flip_y, load_opd, load_pupil, OpdSource, PupilSource};
use crate::optics::WfeKind;

pub struct Instrument {
    provider: &'static dyn FamilyOptics,
    config: InstrumentConfig,
    cache: Arc<GeometryCache>,
    table: Arc<GeometryTable>,
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("family", &self.family())
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish()
    }
}

impl Instrument {
    /// Instrument with family defaults, using the process-wide geometry cache.
    pub fn new(family: Family) -> Result<Self> {
        Self::with_cache(family, GeometryCache::global())
    }

    pub fn with_cache(family: Family, cache: Arc<GeometryCache>) -> Result<Self> {
        let provider = family.provider();
        let table = cache.get(family.name())?;

        let mut config = InstrumentConfig::new(
            provider.default_filter(),
            provider.default_detector(),
            provider.default_pixel_scale(),
        );
        config.rotation = provider.default_rotation();
        config.image_mask = provider.default_image_mask().map(str::to_string);
        config.pupil_mask = provider.default_pupil_mask().map(str::to_string);

        let mut instrument = Self {
            provider,
            config,
            cache,
            table,
        };
        sync::resync(&mut instrument)?;
        let (x, y) = provider.default_position();
        instrument.set_detector_position(x, y)?;
        debug!(
            "Initialized {family} on {} at {:?}",
            instrument.config.detector, instrument.config.detector_position
        );
        Ok(instrument)
    }

    pub fn nircam() -> Result<Self> {
        Self::new(Family::NIRCam)
    }

    pub fn miri() -> Result<Self> {
        Self::new(Family::MIRI)
    }

    pub fn nirspec() -> Result<Self> {
        Self::new(Family::NIRSpec)
    }

    pub fn niriss() -> Result<Self> {
        Self::new(Family::NIRISS)
    }

    pub fn fgs() -> Result<Self> {
        Self::new(Family::FGS)
    }

    /// Instrument by family name or short alias (`"nrc"`, `"mir"`, ...).
    pub fn by_name(name: &str) -> Result<Self> {
        Self::new(name.parse()?)
    }

    pub fn family(&self) -> Family {
        self.provider.family()
    }

    pub fn provider(&self) -> &'static dyn FamilyOptics {
        self.provider
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub fn table(&self) -> &GeometryTable {
        &self.table
    }

    pub fn cache(&self) -> &Arc<GeometryCache> {
        &self.cache
    }

    pub fn options(&self) -> &CalcOptions {
        &self.config.options
    }

    pub fn options_mut(&mut self) -> &mut CalcOptions {
        &mut self.config.options
    }

    pub fn set_options(&mut self, options: CalcOptions) {
        self.config.options = options;
    }

    /// Geometry of the active aperture on the active detector.
    pub fn detector_geometry(&self) -> Result<DetectorGeometry> {
        let name = self
            .config
            .aperture_name
            .as_deref()
            .ok_or_else(|| OpticsError::ConfigurationConflict("no aperture selected".to_string()))?;
        let aperture = self.table.lookup(name)?.clone();
        let shape = self.detector_shape()?;
        Ok(DetectorGeometry::new(self.config.detector.clone(), aperture, shape))
    }

    /// Field point (V2, V3) of the current detector position, arcsec.
    pub fn field_point(&self) -> Result<(f64, f64)> {
        let (v2, v3) = self.detector_geometry()?.tel_coords(self.config.detector_position);
        Ok((v2 * 60.0, v3 * 60.0))
    }

    /// One wavefront error component in meters, on the pupil grid and in
    /// entrance pupil orientation.
    pub fn wfe(&self, kind: WfeKind) -> Result<Array2<f64>> {
        let pupil = load_pupil(&self.config.pupil)?;
        match kind {
            WfeKind::Si => {
                let aberration = self
                    .provider
                    .field_model(WfeLocation::Instrument)
                    .evaluate(self.field_point()?, pupil.npix());
                let opd = &*aberration.opd * self.provider.si_wfe_scale();
                Ok(flip_y(&opd))
            }
            WfeKind::Ote => {
                let mut opd = match load_opd(&self.config.opd, pupil.amplitude.dim())? {
                    Some(opd) => (*opd).clone(),
                    None => Array2::zeros(pupil.amplitude.dim()),
                };
                opd.zip_mut_with(&pupil.amplitude, |v, &a| {
                    if a == 0.0 {
                        *v = 0.0;
                    }
                });
                Ok(opd)
            }
            WfeKind::Total => Ok(self.wfe(WfeKind::Ote)? + self.wfe(WfeKind::Si)?),
        }
    }

    fn detector_shape(&self) -> Result<(u32, u32)> {
        self.provider
            .detector_dims(&self.config.detector)
            .ok_or_else(|| self.invalid_detector(&self.config.detector).into())
    }

    fn invalid_detector(&self, value: &str) -> ValidationError {
        ValidationError::InvalidDetector {
            value: value.to_string(),
            valid: self.provider.detectors().iter().map(|d| d.name.to_string()).collect(),
        }
    }

    pub fn set_filter(&mut self, name: &str) -> Result<()> {
        let catalog = self.provider.filters()?;
        let entry = catalog.resolve(name).ok_or_else(|| ValidationError::InvalidFilter {
            family: self.family(),
            value: name.to_string(),
            valid: catalog.names(),
        })?;
        debug!("Filter {} -> {}", self.config.filter, entry.name);
        self.config.filter = entry.name.clone();
        let actions = self.provider.on_filter_changed(&mut self.config);
        self.run_actions(actions)
    }

    pub fn set_image_mask(&mut self, name: &str) -> Result<()> {
        let value = self.resolve_mask_name(name, "image")?;
        debug!("Image mask {:?} -> {:?}", self.config.image_mask, value);
        self.config.image_mask = value;
        let actions = self.provider.on_image_mask_changed(&self.config);
        self.run_actions(actions)
    }

    /// Select a pupil mask. Unchanged values are a no-op.
    pub fn set_pupil_mask(&mut self, name: &str) -> Result<()> {
        let value = self.resolve_mask_name(name, "pupil")?;
        if value == self.config.pupil_mask {
            return Ok(());
        }
        debug!("Pupil mask {:?} -> {:?}", self.config.pupil_mask, value);
        self.config.pupil_mask = value;
        let actions = self.provider.on_pupil_mask_changed(&self.config);
        self.run_actions(actions)
    }

    fn resolve_mask_name(&self, name: &str, plane: &'static str) -> Result<Option<String>> {
        if is_clear(name) {
            return Ok(None);
        }
        let masks = match plane {
            "image" => self.provider.image_masks(),
            _ => self.provider.pupil_masks(),
        };
        match resolve_mask(masks, name) {
            Some(entry) => Ok(Some(entry.name.to_string())),
            None => Err(ValidationError::InvalidMask {
                family: self.family(),
                plane,
                value: name.to_string(),
                valid: mask_names(masks),
            }
            .into()),
        }
    }

    pub fn set_detector(&mut self, name: &str) -> Result<()> {
        let lookup = self.provider.detector_alias(name).unwrap_or_else(|| name.trim().to_string());
        let spec = self.provider.detector(&lookup).ok_or_else(|| self.invalid_detector(name))?;
        debug!("Detector {} -> {}", self.config.detector, spec.name);
        self.config.detector = spec.name.to_string();
        sync::resync(self)
    }

    pub fn set_detector_position(&mut self, x: u32, y: u32) -> Result<()> {
        self.set_detector_position_signed(i64::from(x), i64::from(y))
    }

    /// Signed variant for callers whose input may be negative.
    pub fn set_detector_position_signed(&mut self, x: i64, y: i64) -> Result<()> {
        self.detector_geometry()?.validate_coords(x, y)?;
        // Bounds checked above, so both fit in u32.
        self.config.detector_position = (x as u32, y as u32);
        debug!("Detector position set to ({x}, {y})");
        Ok(())
    }

    /// Select an aperture, updating the pixel scale, detector and position
    /// as its kind requires.
    pub fn set_aperture_name(&mut self, name: &str) -> Result<()> {
        let table = Arc::clone(&self.table);
        let aperture = table.lookup(name).map_err(|_| ValidationError::InvalidAperture {
            family: self.family(),
            value: name.to_string(),
        })?;
        if self.config.aperture_name.as_deref() == Some(name) {
            return Ok(());
        }

        let previous = match self.config.aperture_name.as_deref() {
            Some(prev) => Some(table.lookup(prev)?),
            None => None,
        };
        let stored = self.config.pixel_scale;

        match aperture.kind {
            ApertureKind::Slit => {
                let full = table.lookup(&format!("{}_FULL", self.config.detector))?;
                let full_scale = self.derived_scale(full, &table);
                let has_custom = previous.is_some() && stored != full_scale;
                info!("Aperture {name} is a slit; using {} for detector geometry", full.name);
                if !has_custom {
                    self.config.pixel_scale = full_scale;
                }
            }
            ApertureKind::Compound => {
                self.config.pixel_scale = self.derived_scale(aperture, &table);
            }
            ApertureKind::Plain => {
                let has_custom = previous.is_some_and(|prev| {
                    prev.kind != ApertureKind::Slit && stored != self.derived_scale(prev, &table)
                });
                let target = self.provider.detector_for_aperture(name);
                if target.is_none() && !name.contains(self.config.detector.as_str()) {
                    return Err(ValidationError::ApertureDetectorMismatch {
                        aperture: name.to_string(),
                        detector: self.config.detector.clone(),
                    }
                    .into());
                }

                // Reject an off-detector reference pixel before touching any state.
                let (x, y) = aperture.reference_pixel();
                let detector = target.as_deref().unwrap_or(self.config.detector.as_str());
                let shape = self
                    .provider
                    .detector_dims(detector)
                    .ok_or_else(|| self.invalid_detector(detector))?;
                DetectorGeometry::new(detector, aperture.clone(), shape).validate_coords(x, y)?;

                if let Some(detector) = target {
                    self.provider.assign_detector(&mut self.config, &detector);
                }
                // Bounds checked above, so both fit in u32.
                self.config.detector_position = (x as u32, y as u32);
                if has_custom {
                    info!("Keeping custom pixel scale {} for {name}", self.config.pixel_scale);
                } else {
                    self.config.pixel_scale = self.derived_scale(aperture, &table);
                }
            }
        }

        debug!("Aperture {:?} -> {name}", self.config.aperture_name);
        self.config.aperture_name = Some(name.to_string());
        self.provider.on_aperture_changed(&mut self.config, aperture, &table)
    }

    /// Scale an aperture implies: the family rule where one applies, else its
    /// mean science-axis scale.
    fn derived_scale(&self, aperture: &crate::geometry::Aperture, table: &GeometryTable) -> f64 {
        self.provider
            .pixel_scale_rule(&aperture.name, table)
            .unwrap_or_else(|| aperture.pixel_scale())
    }

    /// Set the field point from a named aperture, choosing the detector and mode it implies.
    pub fn set_position_from_aperture_name(&mut self, name: &str) -> Result<()> {
        sync::set_position_from_aperture_name(self, name)
    }

    /// Switch observing mode and move to the mode's default aperture.
    pub fn set_mode(&mut self, mode: &str) -> Result<()> {
        let modes = self.provider.modes();
        if modes.is_empty() {
            return Err(OpticsError::ConfigurationConflict(format!(
                "{} has no selectable observing modes",
                self.family()
            )));
        }
        let invalid = || ValidationError::InvalidMode {
            family: self.family(),
            value: mode.to_string(),
        };
        let parsed = ObservingMode::parse(mode).ok_or_else(invalid)?;
        let (_, aperture) = modes.iter().find(|(m, _)| *m == parsed).ok_or_else(invalid)?;
        info!("{} mode set to {parsed}", self.family());
        self.config.mode = parsed;
        sync::set_position_from_aperture_name(self, aperture)
    }

    pub fn set_band(&mut self, band: &str) -> Result<()> {
        if !self.config.is_ifu() {
            return Err(OpticsError::ConfigurationConflict(format!(
                "cannot set an IFU band when {} is in {} mode",
                self.family(),
                self.config.mode
            )));
        }
        let bands = self.provider.ifu_bands();
        let entry = bands
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(band.trim()))
            .ok_or_else(|| ValidationError::InvalidBand {
                value: band.to_string(),
                valid: bands.iter().map(|b| b.name.to_string()).collect(),
            })?;
        let actions = self.provider.apply_band(&mut self.config, entry);
        self.run_actions(actions)
    }

    /// NIRSpec grating or prism; `""` or `"none"` clears it.
    pub fn set_disperser(&mut self, name: &str) -> Result<()> {
        let dispersers = self.provider.dispersers();
        if dispersers.is_empty() {
            return Err(OpticsError::NotImplementedForFamily {
                family: self.family(),
                operation: "disperser selection",
            });
        }
        if is_clear(name) {
            self.config.disperser = None;
            return Ok(());
        }
        let found = dispersers
            .iter()
            .find(|d| d.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ValidationError::InvalidDisperser {
                value: name.to_string(),
                valid: dispersers.iter().map(|d| d.to_string()).collect(),
            })?;
        self.config.disperser = Some(found.to_string());
        Ok(())
    }

    /// Pin the pixel scale to a custom value, arcsec/pixel.
    pub fn set_pixel_scale(&mut self, scale: f64) -> Result<()> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(OpticsError::ConfigurationConflict(format!(
                "pixel scale must be positive, got {scale}"
            )));
        }
        self.config.pixel_scale = scale;
        Ok(())
    }

    pub fn set_rotation(&mut self, rotation: Option<f64>) {
        self.config.rotation = rotation;
    }

    pub fn set_include_si_wfe(&mut self, include: bool) {
        self.config.include_si_wfe = include;
    }

    pub fn set_auto_pupil(&mut self, auto: bool) {
        self.config.auto_pupil = auto;
    }

    pub fn set_auto_channel(&mut self, auto: bool) {
        self.config.auto_channel = auto;
    }

    pub fn set_pupil(&mut self, pupil: PupilSource) {
        self.config.pupil = pupil;
    }

    pub fn set_opd(&mut self, opd: OpdSource) {
        self.config.opd = opd;
    }

    pub fn validate_wavelengths(&self, wavelengths: &[f64]) -> Result<()> {
        self.provider.validate_wavelengths(&self.config, wavelengths)
    }

    /// NIRCam module letter.
    pub fn module(&self) -> Result<char> {
        self.require_nircam("module selection")?;
        Ok(nircam::module(&self.config))
    }

    /// NIRCam channel of the active detector.
    pub fn channel(&self) -> Result<nircam::Channel> {
        self.require_nircam("channel selection")?;
        Ok(nircam::channel(&self.config))
    }

    /// Swap NIRCam modules while keeping the SCA number.
    pub fn set_module(&mut self, module: char) -> Result<()> {
        self.require_nircam("module selection")?;
        let module = module.to_ascii_uppercase();
        if module != 'A' && module != 'B' {
            return Err(self.invalid_detector(&format!("NRC{module}")).into());
        }
        let sca: String = self.config.detector.chars().skip(4).collect();
        self.set_detector(&format!("NRC{module}{sca}"))
    }

    /// Move to the other NIRCam channel on the same module.
    pub fn set_channel(&mut self, target: nircam::Channel) -> Result<()> {
        self.require_nircam("channel selection")?;
        if nircam::switch_channel(&mut self.config, target) {
            sync::resync(self)?;
        }
        Ok(())
    }

    fn require_nircam(&self, operation: &'static str) -> Result<()> {
        if self.family() == Family::NIRCam {
            Ok(())
        } else {
            Err(OpticsError::NotImplementedForFamily {
                family: self.family(),
                operation,
            })
        }
    }

    /// Execute family-requested state changes in order.
    pub(crate) fn run_actions(&mut self, actions: Vec<ConfigAction>) -> Result<()> {
        for action in actions {
            debug!("Running {action:?}");
            match action {
                ConfigAction::Resync => sync::resync(self)?,
                ConfigAction::PositionFromCurrent => {
                    if let Some(name) = self.config.aperture_name.clone() {
                        sync::set_position_from_aperture_name(self, &name)?;
                    }
                }
                ConfigAction::PositionFrom(name) => {
                    sync::set_position_from_aperture_name(self, &name)?
                }
                ConfigAction::SetAperture(name) => self.set_aperture_name(&name)?,
                ConfigAction::SetPupilMask(mask) => {
                    self.set_pupil_mask(mask.as_deref().unwrap_or(""))?
                }
            }
        }
        Ok(())
    }

    pub(crate) fn config_mut(&mut self) -> &mut InstrumentConfig {
        &mut self.config
    }
}
