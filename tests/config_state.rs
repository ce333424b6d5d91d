//! Validated setters and the aperture/detector coupling across families

use std::sync::Arc;

use approx::assert_relative_eq;
use optical_train::error::{GeometryError, ValidationError};
use optical_train::family::nircam::{PIXELSCALE_LONG, PIXELSCALE_SHORT};
use optical_train::geometry::builtin::builtin_table;
use optical_train::geometry::{GeometrySource, GeometryTable};
use optical_train::{Family, GeometryCache, Instrument, ObservingMode, OpticsError};

/// Built-in NIRCam table plus one subarray whose reference pixel is off the detector.
struct OffEdgeGeometry;

impl GeometrySource for OffEdgeGeometry {
    fn load(&self, instrument: &str) -> Result<GeometryTable, GeometryError> {
        let base = builtin_table(instrument)
            .ok_or_else(|| GeometryError::UnknownInstrument(instrument.to_string()))?;
        let mut apertures: Vec<_> = base
            .names()
            .map(|name| base.lookup(name).cloned())
            .collect::<Result<_, _>>()?;
        let mut off_edge = base.lookup("NRCA1_SUB400P")?.clone();
        off_edge.name = "NRCA1_OFFEDGE".to_string();
        off_edge.x_sci_ref = 5000.0;
        off_edge.y_sci_ref = -40.0;
        apertures.push(off_edge);
        Ok(GeometryTable::new(base.instrument.clone(), base.data_version.clone(), apertures))
    }
}

#[test]
fn test_long_wave_filter_moves_nircam_to_long_channel() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut nrc = Instrument::nircam().unwrap();
    assert_eq!(nrc.config().detector, "NRCA1");
    assert_relative_eq!(nrc.config().pixel_scale, PIXELSCALE_SHORT);

    nrc.set_filter("F444W").unwrap();
    assert_eq!(nrc.config().detector, "NRCA5");
    assert_eq!(nrc.config().aperture(), "NRCA5_FULL");
    assert_relative_eq!(nrc.config().pixel_scale, PIXELSCALE_LONG);

    nrc.set_filter("F150W").unwrap();
    assert_eq!(nrc.config().detector, "NRCA1");
    assert_relative_eq!(nrc.config().pixel_scale, PIXELSCALE_SHORT);
}

#[test]
fn test_auto_channel_off_keeps_detector() {
    let mut nrc = Instrument::nircam().unwrap();
    nrc.set_auto_channel(false);
    nrc.set_filter("F444W").unwrap();
    assert_eq!(nrc.config().detector, "NRCA1");
}

#[test]
fn test_coronagraph_mask_selects_its_aperture() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut nrc = Instrument::nircam().unwrap();
    nrc.set_filter("F444W").unwrap();
    nrc.set_image_mask("mask335r").unwrap();
    assert_eq!(nrc.config().image_mask.as_deref(), Some("MASK335R"));
    assert_eq!(nrc.config().aperture(), "NRCA5_FULL_MASK335R");
    assert_eq!(nrc.config().detector, "NRCA5");

    nrc.set_image_mask("none").unwrap();
    assert_eq!(nrc.config().image_mask, None);
}

#[test]
fn test_invalid_filter_is_rejected_and_state_kept() {
    let mut nrc = Instrument::nircam().unwrap();
    let before = nrc.config().clone();
    match nrc.set_filter("F999Z") {
        Err(OpticsError::Validation(ValidationError::InvalidFilter { value, valid, .. })) => {
            assert_eq!(value, "F999Z");
            assert!(valid.iter().any(|f| f == "F200W"));
        }
        other => panic!("expected InvalidFilter, got {other:?}"),
    }
    assert_eq!(nrc.config(), &before);
}

#[test]
fn test_position_outside_detector() {
    let mut nrc = Instrument::nircam().unwrap();
    let err = nrc.set_detector_position(2048, 10).unwrap_err();
    assert!(matches!(
        err,
        OpticsError::Validation(ValidationError::OutOfBounds { x: 2048, .. })
    ));
    nrc.set_detector_position(2047, 0).unwrap();
    assert_eq!(nrc.config().detector_position, (2047, 0));
}

#[test]
fn test_miri_ifu_round_trip_restores_imager_scale() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut miri = Instrument::miri().unwrap();
    let imager_scale = miri.table().pixel_scale("MIRIM_FULL").unwrap();

    miri.set_position_from_aperture_name("MIRIFU_CHANNEL2B").unwrap();
    assert_eq!(miri.config().mode, ObservingMode::Ifu);
    assert_eq!(miri.config().detector, "MIRIFUSHORT");
    assert_eq!(miri.config().band.as_deref(), Some("2B"));

    miri.set_position_from_aperture_name("MIRIM_FULL").unwrap();
    assert_eq!(miri.config().mode, ObservingMode::Imaging);
    assert_eq!(miri.config().detector, "MIRIM");
    assert_relative_eq!(miri.config().pixel_scale, imager_scale);
}

#[test]
fn test_nirspec_default_field_point() {
    let nrs = Instrument::nirspec().unwrap();
    assert_eq!(nrs.config().detector, "NRS1");
    assert_eq!(nrs.config().image_mask.as_deref(), Some("MSA all open"));
    assert_eq!(nrs.config().pupil_mask.as_deref(), Some("NIRSpec grating"));
    assert_eq!(nrs.config().detector_position, (1380, 1024));
}

#[test]
fn test_fgs_has_no_masks() {
    let mut fgs = Instrument::fgs().unwrap();
    assert!(fgs.set_image_mask("MASK335R").is_err());
    fgs.set_image_mask("").unwrap();
    assert_eq!(fgs.config().image_mask, None);
}

#[test]
fn test_detector_bounds_per_family() {
    let mut nrc = Instrument::nircam().unwrap();
    assert!(nrc.set_detector_position(2048, 2048).is_err());
    nrc.set_detector_position(2047, 2047).unwrap();

    let mut miri = Instrument::miri().unwrap();
    miri.set_detector_position(1023, 1031).unwrap();
    assert!(miri.set_detector_position(1024, 0).is_err());
    assert!(miri.set_detector_position(0, 1032).is_err());
    assert!(miri.set_detector_position_signed(-1, 10).is_err());
}

#[test]
fn test_aperture_selection_is_idempotent() {
    let mut nrc = Instrument::nircam().unwrap();
    nrc.set_aperture_name("NRCA1_SUB400P").unwrap();
    let first = nrc.config().clone();
    nrc.set_aperture_name("NRCA1_SUB400P").unwrap();
    assert_eq!(nrc.config(), &first);
    assert_relative_eq!(
        nrc.config().pixel_scale,
        nrc.table().pixel_scale("NRCA1_SUB400P").unwrap()
    );
}

#[test]
fn test_detector_change_keeps_aperture_valid() {
    let mut nrc = Instrument::nircam().unwrap();
    for det in ["NRCB3", "nrcalong", "NRCB5"] {
        nrc.set_detector(det).unwrap();
        let cfg = nrc.config();
        assert!(
            cfg.aperture().starts_with(cfg.detector.as_str()),
            "{} vs {}",
            cfg.aperture(),
            cfg.detector
        );
    }
    assert_eq!(nrc.config().detector, "NRCB5");
}

#[test]
fn test_miri_coronagraph_filter_selects_lyot_stop() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut miri = Instrument::miri().unwrap();
    miri.set_filter("F2300C").unwrap();
    assert_eq!(miri.config().pupil_mask.as_deref(), Some("MASKLYOT"));
    miri.set_filter("F1140C").unwrap();
    assert_eq!(miri.config().pupil_mask.as_deref(), Some("MASKFQPM"));
    miri.set_filter("F560W").unwrap();
    assert_eq!(miri.config().pupil_mask, None);
}

#[test]
fn test_off_detector_aperture_is_rejected_and_state_kept() {
    let _ = env_logger::builder().is_test(true).try_init();

    let cache = Arc::new(GeometryCache::new(Box::new(OffEdgeGeometry)));
    let mut nrc = Instrument::with_cache(Family::NIRCam, cache).unwrap();
    nrc.set_aperture_name("NRCA1_SUB400P").unwrap();
    let before = nrc.config().clone();

    match nrc.set_aperture_name("NRCA1_OFFEDGE") {
        Err(OpticsError::Validation(ValidationError::OutOfBounds { x, y, width, .. })) => {
            assert_eq!((x, y), (5000, -40));
            assert_eq!(width, 2048);
        }
        other => panic!("expected OutOfBounds, got {other:?}"),
    }
    assert_eq!(nrc.config(), &before);
    assert_eq!(nrc.config().detector_position, (200, 200));
}
