//! Post-propagation formatting of computed PSFs: jitter, distortion, detector
//! effects and output sampling.

pub mod convolve;
pub mod detector;
pub mod distortion;
pub mod header;
pub mod rotation;

use log::{debug, info, warn};
use ndarray::Array2;

use self::convolve::{convolve2d, gaussian_kernel, line_kernel, ConvolveOptions};
use self::header::Header;
use crate::config::{JitterSpec, OutputMode};
use crate::error::{OpticsError, Result};
use crate::family::FormatStep;
use crate::instrument::Instrument;

/// Name of the oversampled primary extension.
pub const PRIMARY: &str = "OVERSAMP";

/// Linear smear length, arcsec.
const LINEAR_SMEAR: f64 = 0.12;
/// Coarse-point sigma and smear, arcsec.
const COARSE_SIGMA: f64 = 0.2;
const COARSE_SMEAR: f64 = 0.4;

/// One named image with its header.
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    pub name: String,
    pub data: Array2<f64>,
    pub header: Header,
}

impl Extension {
    pub fn new(name: impl Into<String>, data: Array2<f64>, header: Header) -> Self {
        let mut ext = Self {
            name: name.into(),
            data,
            header,
        };
        let name = ext.name.clone();
        ext.header.set("EXTNAME", name, "This extension");
        ext
    }

    /// A copy renamed to the `DIST` counterpart of this extension.
    pub fn dist_copy(&self) -> Self {
        let prefix: String = self.name.chars().take(4).collect();
        Self::new(format!("{prefix}DIST"), self.data.clone(), self.header.clone())
    }

    pub fn is_distorted(&self) -> bool {
        self.name.ends_with("DIST")
    }

    pub fn is_oversampled(&self) -> bool {
        self.name.starts_with("OVER")
    }
}

/// Ordered output extensions of one PSF calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct PsfResult {
    pub extensions: Vec<Extension>,
    /// Oversampling of the primary relative to detector pixels
    pub oversample: u32,
    /// Flux-weighted mean wavelength, meters
    pub wavelength: Option<f64>,
}

impl PsfResult {
    pub fn new(primary: Array2<f64>, header: Header, oversample: u32) -> Self {
        Self {
            extensions: vec![Extension::new(PRIMARY, primary, header)],
            oversample: oversample.max(1),
            wavelength: None,
        }
    }

    pub fn with_wavelength(mut self, wavelength: f64) -> Self {
        self.wavelength = Some(wavelength);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Extension> {
        self.extensions.iter().find(|e| e.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Extension> {
        self.extensions.iter_mut().find(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name.as_str()).collect()
    }

    fn sampling(&self, ext: &Extension) -> u32 {
        if ext.is_oversampled() {
            self.oversample
        } else {
            1
        }
    }
}

/// Apply the configured jitter, the family distortion and detector-effect
/// pipeline, output sampling and IPC to a computed PSF.
pub fn format_output(instrument: &Instrument, result: &mut PsfResult) -> Result<()> {
    let cfg = instrument.config();
    let opts = &cfg.options;
    let provider = instrument.provider();
    if result.extensions.is_empty() {
        return Err(OpticsError::Data("PSF result has no extensions".to_string()));
    }

    let over_scale = cfg.pixel_scale / f64::from(result.oversample);
    apply_jitter(&mut result.extensions[0], opts.jitter.as_ref(), opts.jitter_sigma, over_scale);

    if opts.add_distortion {
        info!("Adding PSF distortion(s) and detector effects");
        let copies: Vec<Extension> = result.extensions.iter().map(Extension::dist_copy).collect();
        for copy in &copies {
            debug!("Appending new extension {}", copy.name);
        }
        result.extensions.extend(copies);

        let geometry = instrument.detector_geometry()?;
        for step in provider.formatter_pipeline(cfg, &geometry.aperture) {
            apply_step(instrument, result, step)?;
        }
    }

    info!("Formatting output extensions including for sampling.");
    apply_output_mode(result, opts.output_mode, cfg.pixel_scale);

    if opts.add_ipc && opts.add_distortion {
        let (alpha_default, beta_default) = provider.ipc_coefficients(cfg);
        let alpha = opts.ipc_alpha.unwrap_or(alpha_default);
        let beta = opts.ipc_beta.unwrap_or(beta_default);
        let ppc = provider.ppc_coefficient(cfg);
        for name in ["DET_DIST", "OVERDIST"] {
            let sampling = match result.get(name) {
                Some(ext) => result.sampling(ext),
                None => continue,
            };
            if let Some(ext) = result.get_mut(name) {
                ext.data = detector::apply_ipc(&ext.data, alpha, beta, sampling);
                ext.header.set("IPCINST", provider.family().name(), "Interpixel capacitance (IPC)");
                ext.header.set("IPCA", alpha, "IPC nearest-neighbour coupling");
                ext.header.set("IPCB", beta, "IPC diagonal coupling");
                if let Some(ppc) = ppc {
                    ext.data = detector::apply_ppc(&ext.data, ppc, sampling);
                    ext.header.set("PPC", ppc, "Post-pixel coupling (PPC)");
                }
            }
        }
    }
    Ok(())
}

fn apply_jitter(
    primary: &mut Extension,
    jitter: Option<&JitterSpec>,
    sigma: f64,
    pixel_scale: f64,
) {
    let Some(jitter) = jitter else {
        primary.header.set("JITRTYPE", "None", "Type of jitter applied");
        return;
    };
    let peak_before = primary.data.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let convolve_opts = ConvolveOptions::default();
    let gaussian = |data: &Array2<f64>, sigma: f64| {
        let sigma_pix = sigma / pixel_scale;
        convolve2d(data, &gaussian_kernel(sigma_pix, sigma_pix), convolve_opts)
    };
    let smear = |data: &Array2<f64>, length: f64| {
        convolve2d(data, &line_kernel(length / pixel_scale, 0.0), convolve_opts)
    };

    match jitter {
        JitterSpec::Gaussian => {
            info!("Calculating jitter using Gaussian with sigma={sigma:.4} arcsec per axis");
            primary.data = gaussian(&primary.data, sigma);
            primary.header.set("JITRTYPE", "Gaussian convolution", "Type of jitter applied");
            primary.header.set("JITRSIGM", sigma, "Gaussian sigma for jitter, per axis [arcsec]");
        }
        JitterSpec::Linear => {
            primary.data = smear(&primary.data, LINEAR_SMEAR);
            primary.header.set("JITRTYPE", "Linear smear", "Type of jitter applied");
            primary.header.set("JITSMEAR", LINEAR_SMEAR, "Linear smear length [arcsec]");
        }
        JitterSpec::CoarseLikeItm => {
            let blurred = gaussian(&primary.data, COARSE_SIGMA);
            primary.data = smear(&blurred, COARSE_SMEAR);
            primary.header.set("JITRTYPE", "Coarse point", "Type of jitter applied");
            primary.header.set(
                "JITRSIGM",
                COARSE_SIGMA,
                "Gaussian sigma for jitter, per axis [arcsec]",
            );
            primary.header.set("JITSMEAR", COARSE_SMEAR, "Linear smear length [arcsec]");
        }
        JitterSpec::Custom { kernel } => {
            let total = kernel.sum();
            if total <= 0.0 {
                warn!("Custom jitter kernel has no positive weight; jitter not applied");
                primary.header.set("JITRTYPE", "None", "Type of jitter applied");
                return;
            }
            let kernel = kernel / total;
            primary.data = convolve2d(&primary.data, &kernel, convolve_opts);
            primary.header.set("JITRTYPE", "Custom kernel", "Type of jitter applied");
        }
    }

    let peak_after = primary.data.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    if peak_before > 0.0 {
        primary
            .header
            .set("JITRSTRL", peak_after / peak_before, "Strehl reduction from jitter");
    }
}

fn apply_step(instrument: &Instrument, result: &mut PsfResult, step: FormatStep) -> Result<()> {
    let cfg = instrument.config();
    let opts = &cfg.options;
    let provider = instrument.provider();
    let geometry = instrument.detector_geometry()?;
    let oversample = result.oversample;
    let wavelength_um = result.wavelength.map(|w| w * 1e6);

    let enabled = match step {
        FormatStep::RotateToDetector | FormatStep::Distortion => opts.add_distortion,
        FormatStep::ChargeDiffusion => opts.add_charge_diffusion,
        FormatStep::Cruciform => opts.add_cruciform,
        FormatStep::IfuBroadening => opts.add_ifu_broadening,
    };
    if !enabled {
        debug!("Skipping formatter step {step:?}");
        return Ok(());
    }
    if step == FormatStep::Cruciform && wavelength_um.is_none() {
        warn!("No wavelength recorded on the PSF result; skipping cruciform scattering");
        return Ok(());
    }

    for ext in result.extensions.iter_mut().filter(|e| e.is_distorted()) {
        let sampling = if ext.is_oversampled() { oversample } else { 1 };
        let scale = cfg.pixel_scale / f64::from(sampling);
        match step {
            FormatStep::RotateToDetector => {
                let angle = geometry.aperture.v3_idl_yang;
                ext.data = rotation::rotate_image(&ext.data, angle, opts.crop_psf);
                ext.header.set("ROTATION", angle, "PSF rotated to match detector rotation");
            }
            FormatStep::Distortion => {
                let distorted = distortion::apply_distortion(
                    &ext.data,
                    &geometry.aperture,
                    cfg.detector_position,
                    sampling,
                );
                match distorted {
                    Some(data) => {
                        ext.data = data;
                        ext.header.set("DISTORT", "True", "SIAF distortion coefficients applied");
                    }
                    None => debug!("Aperture {} has no distortion model", geometry.aperture.name),
                }
            }
            FormatStep::ChargeDiffusion => {
                let sigma = opts
                    .charge_diffusion_sigma
                    .unwrap_or_else(|| provider.charge_diffusion_sigma(cfg));
                ext.data = detector::apply_charge_diffusion(&ext.data, sigma, scale);
                ext.header.set("CHDFTYPE", "gaussian", "Type of detector charge diffusion model");
                ext.header.set("CHDFSIGM", sigma, "[arcsec] Gaussian sigma for charge diff model");
            }
            FormatStep::Cruciform => {
                let wl = wavelength_um.unwrap_or_default();
                ext.data = detector::apply_cruciform(&ext.data, wl, scale);
                ext.header.set(
                    "MIR_DIST",
                    "kernel",
                    "MIRI detector scattering applied",
                );
                ext.header.set("MIR_AMP", detector::cruciform_amplitude(wl), "Cruciform amplitude");
            }
            FormatStep::IfuBroadening => match provider.ifu_broadening(cfg) {
                Some(model) => {
                    ext.data = detector::apply_ifu_broadening(&ext.data, model, scale);
                    ext.header.set("IFUBROAD", "empirical", "IFU PSF broadening model applied");
                }
                None => debug!("No IFU broadening model for {}", provider.family()),
            },
        }
    }
    Ok(())
}

/// Keep, replace, or append detector-sampled extensions.
fn apply_output_mode(result: &mut PsfResult, mode: OutputMode, pixel_scale: f64) {
    if mode == OutputMode::Oversampled {
        return;
    }
    let factor = result.oversample;
    let binned: Vec<Extension> = result
        .extensions
        .iter()
        .filter(|e| e.is_oversampled())
        .map(|e| {
            let name = if e.is_distorted() { "DET_DIST" } else { "DET_SAMP" };
            let mut header = e.header.clone();
            header.set("PIXELSCL", pixel_scale, "Scale in arcsec/pix (after oversampling)");
            header.set("OVERSAMP", 1_i64, "Oversampling factor relative to detector pixels");
            Extension::new(name, detector::block_sum(&e.data, factor), header)
        })
        .collect();

    match mode {
        OutputMode::Detector => result.extensions = binned,
        OutputMode::Both => result.extensions.extend(binned),
        OutputMode::Oversampled => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point_result(n: usize, oversample: u32) -> PsfResult {
        let mut data = Array2::zeros((n, n));
        data[[n / 2, n / 2]] = 1.0;
        PsfResult::new(data, Header::new(), oversample)
    }

    #[test]
    fn test_dist_copy_naming() {
        let r = point_result(8, 2);
        let copy = r.extensions[0].dist_copy();
        assert_eq!(copy.name, "OVERDIST");
        assert_eq!(copy.header.get("EXTNAME").and_then(|v| v.as_str()), Some("OVERDIST"));
    }

    #[test]
    fn test_gaussian_jitter_reduces_peak() {
        let mut r = point_result(33, 4);
        apply_jitter(&mut r.extensions[0], Some(&JitterSpec::Gaussian), 0.007, 0.031 / 4.0);
        let strehl = r.extensions[0].header.get("JITRSTRL").and_then(|v| v.as_f64()).unwrap();
        assert!(strehl < 1.0 && strehl > 0.0);
        assert_relative_eq!(r.extensions[0].data.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_jitter_records_none() {
        let mut r = point_result(9, 1);
        apply_jitter(&mut r.extensions[0], None, 0.0008, 0.03);
        assert_eq!(r.extensions[0].header.get("JITRTYPE").and_then(|v| v.as_str()), Some("None"));
        assert_eq!(r.extensions[0].data[[4, 4]], 1.0);
    }

    #[test]
    fn test_output_modes() {
        let mut both = point_result(8, 4);
        apply_output_mode(&mut both, OutputMode::Both, 0.06);
        assert_eq!(both.names(), vec!["OVERSAMP", "DET_SAMP"]);
        assert_eq!(both.get("DET_SAMP").unwrap().data.dim(), (2, 2));

        let mut det = point_result(8, 4);
        det.extensions.push(det.extensions[0].dist_copy());
        apply_output_mode(&mut det, OutputMode::Detector, 0.06);
        assert_eq!(det.names(), vec!["DET_SAMP", "DET_DIST"]);
        assert_relative_eq!(det.extensions[1].data.sum(), 1.0);
    }
}
