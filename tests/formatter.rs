//! Post-propagation formatting of computed PSFs

use approx::assert_relative_eq;
use ndarray::Array2;
use optical_train::config::OutputMode;
use optical_train::formatter::header::{result_header, Header, HeaderValue};
use optical_train::{assemble, format_output, AssemblyRequest, Instrument, PsfResult};

fn gaussian_psf(n: usize, sigma: f64) -> Array2<f64> {
    let c = (n as f64 - 1.0) / 2.0;
    let mut psf = Array2::from_shape_fn((n, n), |(i, j)| {
        let r2 = (i as f64 - c).powi(2) + (j as f64 - c).powi(2);
        (-r2 / (2.0 * sigma * sigma)).exp()
    });
    let total = psf.sum();
    psf.mapv_inplace(|v| v / total);
    psf
}

fn header_f64(header: &Header, key: &str) -> f64 {
    header
        .get(key)
        .and_then(HeaderValue::as_f64)
        .unwrap_or_else(|| panic!("missing numeric card {key}"))
}

#[test]
fn test_nircam_full_pipeline_extensions() {
    let _ = env_logger::builder().is_test(true).try_init();

    let nrc = Instrument::nircam().unwrap();
    let mut result = PsfResult::new(gaussian_psf(64, 4.0), Header::new(), 4);
    format_output(&nrc, &mut result).unwrap();

    assert_eq!(result.names(), vec!["OVERSAMP", "OVERDIST", "DET_SAMP", "DET_DIST"]);
    let primary = result.get("OVERSAMP").unwrap();
    assert_eq!(
        primary.header.get("JITRTYPE").and_then(HeaderValue::as_str),
        Some("Gaussian convolution")
    );

    let overdist = result.get("OVERDIST").unwrap();
    assert!(overdist.header.contains("ROTATION"));
    assert!(overdist.header.contains("CHDFSIGM"));

    let det = result.get("DET_SAMP").unwrap();
    assert_eq!(det.data.dim(), (16, 16));
    assert_relative_eq!(header_f64(&det.header, "OVERSAMP"), 1.0);

    let det_dist = result.get("DET_DIST").unwrap();
    assert_relative_eq!(header_f64(&det_dist.header, "IPCA"), 0.0060);
    assert!(det_dist.header.contains("PPC"));
}

#[test]
fn test_distortion_disabled_keeps_only_ideal_extensions() {
    let mut nrc = Instrument::nircam().unwrap();
    nrc.options_mut().add_distortion = false;
    let mut result = PsfResult::new(gaussian_psf(32, 3.0), Header::new(), 2);
    format_output(&nrc, &mut result).unwrap();
    assert_eq!(result.names(), vec!["OVERSAMP", "DET_SAMP"]);
}

#[test]
fn test_detector_only_output() {
    let mut nrc = Instrument::nircam().unwrap();
    nrc.options_mut().output_mode = OutputMode::Detector;
    nrc.options_mut().jitter = None;
    let mut result = PsfResult::new(gaussian_psf(32, 3.0), Header::new(), 2);
    format_output(&nrc, &mut result).unwrap();
    assert_eq!(result.names(), vec!["DET_SAMP", "DET_DIST"]);
}

#[test]
fn test_miri_cruciform_needs_wavelength() {
    let _ = env_logger::builder().is_test(true).try_init();

    let miri = Instrument::miri().unwrap();
    let mut without = PsfResult::new(gaussian_psf(48, 3.0), Header::new(), 2);
    format_output(&miri, &mut without).unwrap();
    assert!(!without.get("OVERDIST").unwrap().header.contains("MIR_DIST"));

    let mut with = PsfResult::new(gaussian_psf(48, 3.0), Header::new(), 2).with_wavelength(7.7e-6);
    format_output(&miri, &mut with).unwrap();
    assert!(with.get("OVERDIST").unwrap().header.contains("MIR_DIST"));
}

#[test]
fn test_result_header_records_budget_and_position() {
    let mut nrc = Instrument::nircam().unwrap();
    nrc.options_mut().defocus_waves = Some(1.0);
    let (_, meta) = assemble(&nrc, &AssemblyRequest::default()).unwrap();
    let header = result_header(&nrc, &meta, 64).unwrap();

    assert_eq!(header.get("APERNAME").and_then(HeaderValue::as_str), Some("NRCA1_FULL"));
    assert!(header.contains("TEL_WFE"));
    assert!(header.contains("SI_WFE"));
    assert_relative_eq!(header_f64(&header, "DEFOCUS"), 1.0);
    // 32 detector pixels is even, so the center sits on a pixel corner
    let (x, _) = nrc.config().detector_position;
    assert_relative_eq!(header_f64(&header, "DET_X"), f64::from(x) + 0.5);
    assert_eq!(header.get("MODULE").and_then(HeaderValue::as_str), Some("A"));
}
