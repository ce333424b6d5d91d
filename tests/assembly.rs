//! Plane stacks assembled for representative observing configurations

use optical_train::optics::plane::{OcculterBox, OpticalElement, PlaneKind};
use optical_train::{assemble, AssemblyRequest, Instrument, OpticsError, PlaneStack};
use optical_train::optics::PropagationMode;

fn request() -> AssemblyRequest {
    AssemblyRequest {
        fft_oversample: 2,
        ..AssemblyRequest::default()
    }
}

fn index_of(stack: &PlaneStack, name: &str) -> usize {
    stack
        .names()
        .iter()
        .position(|n| *n == name)
        .unwrap_or_else(|| panic!("no plane named {name} in {:?}", stack.names()))
}

#[test]
fn test_every_family_default_stack_is_valid() {
    let _ = env_logger::builder().is_test(true).try_init();

    for instrument in [
        Instrument::nircam().unwrap(),
        Instrument::miri().unwrap(),
        Instrument::nirspec().unwrap(),
        Instrument::niriss().unwrap(),
        Instrument::fgs().unwrap(),
    ] {
        let (stack, meta) = assemble(&instrument, &request()).unwrap();
        stack.validate().unwrap();
        assert_eq!(stack.planes[0].name, "JWST Entrance Pupil");
        assert_eq!(stack.planes[1].kind, PlaneKind::Inversion);
        let last = stack.planes.last().unwrap();
        assert_eq!(last.name, format!("{} detector", instrument.family()));
        assert_eq!(meta.detector_oversample, 2);
    }
}

#[test]
fn test_nircam_round_mask_and_lyot_order() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut nrc = Instrument::nircam().unwrap();
    nrc.set_filter("F444W").unwrap();
    nrc.set_image_mask("MASK335R").unwrap();
    nrc.set_pupil_mask("MASKRND").unwrap();
    let (stack, meta) = assemble(&nrc, &request()).unwrap();

    assert!(meta.internal_optics);
    assert_eq!(index_of(&stack, "MASK335R"), 2);
    assert_eq!(index_of(&stack, "MASKRND"), 3);
    assert_eq!(stack.planes[2].kind, PlaneKind::Image);
    assert_eq!(meta.sam_box, Some(OcculterBox::Square(5.0)));
    // 5 arcsec at the long wave scale
    assert_eq!(meta.fov_pixels, 79);
}

#[test]
fn test_nircam_bar_offset_from_filter() {
    let mut nrc = Instrument::nircam().unwrap();
    nrc.set_filter("F460M").unwrap();
    nrc.set_image_mask("MASKLWB").unwrap();
    let (stack, meta) = assemble(&nrc, &request()).unwrap();
    let mask = &stack.planes[index_of(&stack, "MASKLWB")];
    match &mask.element {
        OpticalElement::BandLimitedCoron {
            bar_offset, auto_offset, ..
        } => {
            assert_eq!(*bar_offset, None);
            assert!(auto_offset.is_some());
        }
        other => panic!("unexpected element {other:?}"),
    }
    assert_eq!(meta.sam_box, Some(OcculterBox::Rect(5.0, 20.0)));
    assert!(stack.names().contains(&"No Lyot Mask Selected!"));
}

#[test]
fn test_nircam_weak_lens_from_filter_wheel() {
    let mut nrc = Instrument::nircam().unwrap();
    nrc.set_filter("WLP4").unwrap();
    let (stack, meta) = assemble(&nrc, &request()).unwrap();
    assert!(meta.internal_optics);
    let lens = &stack.planes[index_of(&stack, "WLP4")];
    assert!(matches!(lens.element, OpticalElement::WeakLens { nwaves, .. } if nwaves == 4.0));
}

#[test]
fn test_niriss_spot_uses_semi_analytic_propagation() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut nis = Instrument::niriss().unwrap();
    nis.set_image_mask("CORON058").unwrap();
    let (stack, meta) = assemble(&nis, &request()).unwrap();
    assert_eq!(index_of(&stack, "CORON058"), 2);
    assert_eq!(meta.propagation, PropagationMode::SemiAnalytic);

    nis.options_mut().no_sam = true;
    let (_, meta) = assemble(&nis, &request()).unwrap();
    assert_eq!(meta.propagation, PropagationMode::Fourier);
}

#[test]
fn test_niriss_nrm_is_flipped() {
    let mut nis = Instrument::niriss().unwrap();
    nis.set_filter("F480M").unwrap();
    nis.set_pupil_mask("MASK_NRM").unwrap();
    let (stack, _) = assemble(&nis, &request()).unwrap();
    let nrm = &stack.planes[index_of(&stack, "MASK_NRM")];
    assert!(nrm.flip_x && nrm.flip_y);
    assert!(nrm.shift.is_some());
}

#[test]
fn test_miri_lrs_uses_matrix_fourier() {
    let mut miri = Instrument::miri().unwrap();
    miri.set_image_mask("LRS slit").unwrap();
    miri.set_pupil_mask("P750L").unwrap();
    let (stack, meta) = assemble(&miri, &request()).unwrap();
    assert_eq!(meta.propagation, PropagationMode::MatrixFourier);
    stack.validate().unwrap();
    // rotation and instrument WFE follow the pupil stop
    let stop = index_of(&stack, "P750L");
    assert_eq!(stack.planes[stop + 1].kind, PlaneKind::Rotation);
    assert!(stack.planes[stop + 2].is_field_aberration());
}

#[test]
fn test_nirspec_grating_and_spectrograph_wfe() {
    let nrs = Instrument::nirspec().unwrap();
    let (stack, meta) = assemble(&nrs, &request()).unwrap();
    assert!(meta.internal_optics);
    assert!(stack.names().contains(&"Pupil stop at grating wheel"));
    let aberrations = stack.planes.iter().filter(|p| p.is_field_aberration()).count();
    assert_eq!(aberrations, 2);
}

#[test]
fn test_fgs_rejects_internal_optics() {
    let mut fgs = Instrument::fgs().unwrap();
    fgs.options_mut().force_coron = true;
    let err = assemble(&fgs, &request()).unwrap_err();
    assert!(matches!(err, OpticsError::NotImplementedForFamily { .. }));
}

#[test]
fn test_explicit_fov_pixels() {
    let nrc = Instrument::nircam().unwrap();
    let req = AssemblyRequest {
        fov_pixels: Some(64),
        detector_oversample: Some(4),
        ..request()
    };
    let (stack, meta) = assemble(&nrc, &req).unwrap();
    assert_eq!(meta.fov_pixels, 64);
    match stack.planes.last().unwrap().element {
        OpticalElement::Detector { fov_pixels, oversample, .. } => {
            assert_eq!(fov_pixels, 64);
            assert_eq!(oversample, 4);
        }
        ref other => panic!("unexpected element {other:?}"),
    }
}

#[test]
fn test_stack_serializes_without_arrays() {
    let nrc = Instrument::nircam().unwrap();
    let (stack, meta) = assemble(&nrc, &request()).unwrap();
    let json = serde_json::to_value(&stack).unwrap();
    assert_eq!(json["planes"][0]["element"]["element"], "entrance_pupil");
    let meta_json = serde_json::to_value(&meta).unwrap();
    assert_eq!(meta_json["propagation"], "fourier");
}

#[test]
fn test_assembly_is_repeatable() {
    let mut miri = Instrument::miri().unwrap();
    miri.set_image_mask("FQPM1140").unwrap();
    let (a, meta_a) = assemble(&miri, &request()).unwrap();
    let (b, meta_b) = assemble(&miri, &request()).unwrap();
    assert_eq!(a, b);
    assert_eq!(meta_a, meta_b);
    assert!(meta_a.wfe_budget.iter().all(|e| e.rms_nm >= 0.0));
    assert_eq!(a.names().iter().filter(|n| **n == "FQPM FFT aligner").count(), 2);
}
