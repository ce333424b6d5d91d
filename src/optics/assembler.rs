//! Turns a configuration snapshot into an ordered plane stack.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use super::plane::{
    Axis, OcculterBox, OpticalElement, Plane, PlaneKind, PlaneStack, PropagationMode, SourceOffset,
};
use super::pupil::{load_opd, load_pupil, masked_rms};
use crate::config::Parity;
use crate::error::{AcceleratedModeUnavailable, OpticsError, Result};
use crate::family::{SpliceContext, WfeLocation};
use crate::instrument::Instrument;

/// Defocus reference wavelength when none is given, meters.
pub const DEFAULT_DEFOCUS_WAVELENGTH: f64 = 2.0e-6;

/// Sampling and field of view of one calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AssemblyRequest {
    /// Oversampling of intermediate planes
    pub fft_oversample: u32,
    /// Oversampling of the detector plane; defaults to `fft_oversample`
    pub detector_oversample: Option<u32>,
    /// Field of view, arcsec; the family default when neither FOV is given
    pub fov_arcsec: Option<f64>,
    /// Field of view in detector pixels; overrides `fov_arcsec`
    pub fov_pixels: Option<u32>,
}

impl Default for AssemblyRequest {
    fn default() -> Self {
        Self {
            fft_oversample: 2,
            detector_oversample: None,
            fov_arcsec: None,
            fov_pixels: None,
        }
    }
}

/// One line of the wavefront error budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WfeEntry {
    pub label: String,
    pub rms_nm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Defocus {
    pub waves: f64,
    /// meters
    pub reference_wavelength: f64,
}

/// Everything an assembly records besides the planes themselves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblyMetadata {
    pub source_offset: SourceOffset,
    /// meters
    pub pupil_radius: f64,
    pub wfe_budget: Vec<WfeEntry>,
    pub defocus: Option<Defocus>,
    pub internal_optics: bool,
    pub propagation: PropagationMode,
    pub sam_box: Option<OcculterBox>,
    pub fov_pixels: u32,
    pub fft_oversample: u32,
    pub detector_oversample: u32,
    /// Field point (V2, V3), arcsec
    pub field_point: (f64, f64),
}

impl AssemblyMetadata {
    pub fn wfe(&self, label: &str) -> Option<f64> {
        self.wfe_budget.iter().find(|e| e.label == label).map(|e| e.rms_nm)
    }
}

/// Source offset from the options, polar values taking precedence over
/// Cartesian ones.
pub fn source_offset(instrument: &Instrument) -> SourceOffset {
    let opts = instrument.options();
    let mut offset = SourceOffset::default();
    if opts.source_offset_x.is_some() || opts.source_offset_y.is_some() {
        let x = opts.source_offset_x.unwrap_or(0.0);
        let y = opts.source_offset_y.unwrap_or(0.0);
        offset.r = x.hypot(y);
        offset.theta = (-x).atan2(y).to_degrees();
        debug!(
            "Source offset from X,Y = ({x}, {y}) is (r, theta) = {}, {}",
            offset.r, offset.theta
        );
    }
    if let Some(r) = opts.source_offset_r {
        offset.r = r;
    }
    if let Some(theta) = opts.source_offset_theta {
        offset.theta = theta;
    }
    offset
}

/// Detector field of view in pixels.
pub fn fov_pixel_count(fov_arcsec: f64, pixel_scale: f64, parity: Option<Parity>) -> u32 {
    let mut n = (fov_arcsec / pixel_scale).round_ties_even().max(1.0) as u32;
    match parity {
        Some(Parity::Odd) if n % 2 == 0 => n += 1,
        Some(Parity::Even) if n % 2 == 1 => n += 1,
        _ => {}
    }
    n
}

/// Build the plane stack for the current configuration.
pub fn assemble(
    instrument: &Instrument,
    request: &AssemblyRequest,
) -> Result<(PlaneStack, AssemblyMetadata)> {
    let cfg = instrument.config();
    let opts = &cfg.options;
    let provider = instrument.provider();
    let fft_oversample = request.fft_oversample.max(1);
    let detector_oversample = request.detector_oversample.unwrap_or(fft_oversample).max(1);
    info!("Creating optical system model for {}", instrument.family());
    debug!("Oversample: {fft_oversample} {detector_oversample}");

    let offset = source_offset(instrument);
    let mut wfe_budget = Vec::new();

    let pupil = load_pupil(&cfg.pupil)?;
    let opd = load_opd(&cfg.opd, pupil.amplitude.dim())?;
    let tel_wfe = opd.as_ref().map_or(0.0, |opd| masked_rms(opd, &pupil.amplitude) * 1e9);
    info!("Telescope pupil RMS wavefront error {tel_wfe:.2} nm");
    wfe_budget.push(WfeEntry {
        label: "TEL_WFE".to_string(),
        rms_nm: tel_wfe,
    });
    let pupil_diameter = pupil.diameter();
    let pupil_radius = pupil_diameter / 2.0;

    let mut entrance = Plane::pupil(
        "JWST Entrance Pupil",
        OpticalElement::EntrancePupil {
            pupil: Arc::clone(&pupil),
            diameter: pupil_diameter,
        },
    );
    if !cfg.opd.is_none() {
        entrance.opd = Some(cfg.opd.clone());
    }
    let mut planes = vec![
        entrance,
        Plane::new(
            PlaneKind::Inversion,
            "OTE exit pupil",
            OpticalElement::Inversion { axis: Axis::Y },
        ),
    ];

    // The wavefront is rotated, so the sign is opposite the detector rotation.
    if let Some(rotation) = cfg.rotation {
        planes.push(Plane::rotation_plane(-rotation));
    }

    let field_point = instrument.field_point()?;

    let si_wfe = if cfg.include_si_wfe {
        let aberration = provider
            .field_model(WfeLocation::Instrument)
            .evaluate(field_point, pupil.npix());
        let rms = aberration.rms_nm(&pupil.amplitude);
        planes.push(Plane::pupil(
            aberration.label.clone(),
            OpticalElement::FieldAberration(aberration),
        ));
        rms
    } else {
        0.0
    };
    info!("Instrument pupil RMS wavefront error {si_wfe:.2} nm");
    wfe_budget.push(WfeEntry {
        label: "SI_WFE".to_string(),
        rms_nm: si_wfe,
    });

    let defocus = opts.defocus_waves.map(|waves| Defocus {
        waves,
        reference_wavelength: opts.defocus_wavelength.unwrap_or(DEFAULT_DEFOCUS_WAVELENGTH),
    });
    if let Some(d) = defocus {
        info!(
            "Adding defocus of {:.3} waves at {:.3} microns",
            d.waves,
            d.reference_wavelength * 1e6
        );
        planes.push(Plane::pupil(
            "Defocus",
            OpticalElement::ThinLens {
                nwaves: d.waves,
                reference_wavelength: d.reference_wavelength,
                radius: pupil_radius,
            },
        ));
    }

    let internal_optics = cfg.image_mask.is_some()
        || cfg.pupil_mask.is_some()
        || provider.filter_needs_internal_optics(&cfg.filter)
        || opts.force_coron;
    let mut try_sam = false;
    let mut sam_box = None;
    let mut forced = None;
    if internal_optics {
        debug!("Adding coronagraph/spectrograph optics...");
        let ctx = SpliceContext {
            config: cfg,
            table: instrument.table(),
            oversample: fft_oversample,
            pupil_diameter,
            pupil_npix: pupil.npix(),
            field_point,
        };
        let outcome = provider.splice(&ctx, planes)?;
        planes = outcome.planes;
        try_sam = outcome.try_sam;
        sam_box = outcome.sam_box;
        forced = outcome.propagation;
    }

    let fov_pixels = match request.fov_pixels {
        Some(n) => n,
        None => fov_pixel_count(
            request.fov_arcsec.unwrap_or_else(|| provider.default_fov_arcsec()),
            cfg.pixel_scale,
            opts.parity,
        ),
    };
    planes.push(Plane::new(
        PlaneKind::Detector,
        format!("{} detector", instrument.family()),
        OpticalElement::Detector {
            pixelscale: cfg.pixel_scale,
            fov_pixels,
            oversample: detector_oversample,
        },
    ));

    let stack = PlaneStack::new(planes);
    stack
        .validate()
        .map_err(|v| OpticsError::Data(format!("assembled plane stack is invalid: {v}")))?;

    let mut propagation = PropagationMode::Fourier;
    if try_sam && !opts.no_sam {
        info!("Trying to invoke switch to Semi-Analytic Coronagraphy algorithm");
        match check_semi_analytic(&stack) {
            Ok(()) => propagation = PropagationMode::SemiAnalytic,
            Err(err) => {
                warn!(
                    "Could not switch to Semi-Analytic Coronagraphy mode; \
                     using default propagation instead"
                );
                warn!("{err}");
            }
        }
    }
    if let Some(mode) = forced {
        propagation = mode;
    }

    info!("Assembled {} planes, propagation {propagation:?}, FOV {fov_pixels} pixels", stack.len());
    let metadata = AssemblyMetadata {
        source_offset: offset,
        pupil_radius,
        wfe_budget,
        defocus,
        internal_optics,
        propagation,
        sam_box,
        fov_pixels,
        fft_oversample,
        detector_oversample,
        field_point,
    };
    Ok((stack, metadata))
}

/// The semi-analytic method needs a compact occulter in an image plane with
/// pupil planes on both sides of it.
fn check_semi_analytic(stack: &PlaneStack) -> std::result::Result<(), AcceleratedModeUnavailable> {
    let occulter = stack
        .planes
        .iter()
        .position(|p| p.kind == PlaneKind::Image && p.element.is_compact_occulter())
        .ok_or_else(|| AcceleratedModeUnavailable("no compact image-plane occulter".to_string()))?;
    let pupil_before = stack.planes[..occulter].iter().any(|p| p.kind == PlaneKind::Pupil);
    let pupil_after = stack.planes[occulter + 1..].iter().any(|p| p.kind == PlaneKind::Pupil);
    if pupil_before && pupil_after {
        Ok(())
    } else {
        Err(AcceleratedModeUnavailable(format!(
            "occulter '{}' is not between two pupil planes",
            stack.planes[occulter].name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use crate::optics::pupil::OpdSource;

    #[test]
    fn test_fov_parity() {
        assert_eq!(fov_pixel_count(5.0, 0.0311, None), 161);
        assert_eq!(fov_pixel_count(5.0, 0.0311, Some(Parity::Odd)), 161);
        assert_eq!(fov_pixel_count(5.0, 0.0311, Some(Parity::Even)), 162);
        // halves round to the even neighbour
        assert_eq!(fov_pixel_count(2.5, 1.0, None), 2);
        assert_eq!(fov_pixel_count(3.5, 1.0, None), 4);
    }

    #[test]
    fn test_cartesian_offset_to_polar() {
        let mut nrc = Instrument::nircam().unwrap();
        nrc.options_mut().source_offset_x = Some(1.0);
        let offset = source_offset(&nrc);
        assert!((offset.r - 1.0).abs() < 1e-12);
        assert!((offset.theta + 90.0).abs() < 1e-12);
        nrc.options_mut().source_offset_theta = Some(45.0);
        assert_eq!(source_offset(&nrc).theta, 45.0);
    }

    #[test]
    fn test_plain_imaging_stack() {
        let nrc = Instrument::nircam().unwrap();
        let (stack, meta) = assemble(&nrc, &AssemblyRequest::default()).unwrap();
        assert_eq!(
            stack.names(),
            vec!["JWST Entrance Pupil", "OTE exit pupil", "NIRCam internal WFE", "NIRCam detector"]
        );
        assert_eq!(meta.wfe("TEL_WFE"), Some(0.0));
        assert!(meta.wfe("SI_WFE").unwrap() > 0.0);
        assert!(!meta.internal_optics);
        assert_eq!(meta.propagation, PropagationMode::Fourier);
    }

    #[test]
    fn test_defocus_plane_and_metadata() {
        let mut nrc = Instrument::nircam().unwrap();
        nrc.options_mut().defocus_waves = Some(0.5);
        let (stack, meta) = assemble(&nrc, &AssemblyRequest::default()).unwrap();
        assert!(stack.names().contains(&"Defocus"));
        assert_eq!(
            meta.defocus,
            Some(Defocus {
                waves: 0.5,
                reference_wavelength: DEFAULT_DEFOCUS_WAVELENGTH
            })
        );
    }

    #[test]
    fn test_flat_opd_has_zero_telescope_wfe() {
        let mut nrc = Instrument::nircam().unwrap();
        nrc.set_opd(OpdSource::Loaded(Arc::new(Array2::zeros((256, 256)))));
        nrc.set_include_si_wfe(false);
        let (_, meta) = assemble(&nrc, &AssemblyRequest::default()).unwrap();
        assert_eq!(meta.wfe("TEL_WFE"), Some(0.0));
        assert_eq!(meta.wfe("SI_WFE"), Some(0.0));
    }

    #[test]
    fn test_sam_requires_occulter_between_pupils() {
        let nrc = Instrument::nircam().unwrap();
        let (stack, _) = assemble(&nrc, &AssemblyRequest::default()).unwrap();
        assert!(check_semi_analytic(&stack).is_err());
    }
}
