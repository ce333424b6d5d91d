//! Typed calculation options.
//!
//! Every field has a default, so a JSON options file only needs to list the
//! values it overrides.

use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Per-axis line-of-sight jitter typical of on-orbit operation, arcsec.
pub const TYPICAL_LOS_JITTER_PER_AXIS: f64 = 0.0008;

/// Required parity of the output field of view in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    Odd,
    Even,
}

/// Jitter model applied to the primary output image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JitterSpec {
    /// Gaussian blur with `jitter_sigma` per axis
    Gaussian,
    /// Linear drift of 0.12 arcsec
    Linear,
    /// Coarse-point Gaussian of 0.2 arcsec followed by a 0.4 arcsec smear
    CoarseLikeItm,
    /// User-supplied convolution kernel
    Custom { kernel: Array2<f64> },
}

/// Position along a bar occulter: a numeric offset in arcsec or a named
/// reference point such as `"narrow"` or a filter name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BarOffset {
    Arcsec(f64),
    Named(String),
}

/// Which extensions the formatter keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Oversampled extensions only
    Oversampled,
    /// Detector-sampled extensions only
    Detector,
    /// Oversampled followed by detector-sampled extensions
    #[default]
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcOptions {
    /// Source offset in the output frame, arcsec
    pub source_offset_x: Option<f64>,
    pub source_offset_y: Option<f64>,
    /// Polar source offset, arcsec and degrees east of north; overrides x/y
    pub source_offset_r: Option<f64>,
    pub source_offset_theta: Option<f64>,

    /// Pupil shear as a fraction of the pupil diameter. `None` takes the family default.
    pub pupil_shift_x: Option<f64>,
    pub pupil_shift_y: Option<f64>,
    /// Pupil mask rotation, degrees
    pub pupil_rotation: Option<f64>,

    /// Defocus, waves at `defocus_wavelength`
    pub defocus_waves: Option<f64>,
    /// Defocus reference wavelength, meters
    pub defocus_wavelength: Option<f64>,

    pub force_coron: bool,
    pub no_sam: bool,
    pub parity: Option<Parity>,

    pub jitter: Option<JitterSpec>,
    /// Gaussian jitter per axis, arcsec
    pub jitter_sigma: f64,

    pub bar_offset: Option<BarOffset>,
    /// Coronagraph mask shift, arcsec
    pub coron_shift_x: Option<f64>,
    pub coron_shift_y: Option<f64>,
    pub coron_include_pre_lyot_plane: bool,
    /// Include the NIRCam target-acquisition ND squares
    pub nd_squares: bool,
    pub force_fqpm_shift: bool,
    pub lrs_use_mft: bool,
    pub lrs_slit_offset_x: Option<f64>,
    pub lrs_slit_offset_y: Option<f64>,
    /// Rotate NIRSpec IFU output to the ifualign frame
    pub ifualign_rotation: bool,

    pub add_distortion: bool,
    pub crop_psf: bool,
    pub add_charge_diffusion: bool,
    pub add_cruciform: bool,
    pub add_ifu_broadening: bool,
    pub add_ipc: bool,
    /// Charge diffusion sigma override, arcsec
    pub charge_diffusion_sigma: Option<f64>,
    pub ipc_alpha: Option<f64>,
    pub ipc_beta: Option<f64>,
    pub output_mode: OutputMode,
}

impl Default for CalcOptions {
    fn default() -> Self {
        Self {
            source_offset_x: None,
            source_offset_y: None,
            source_offset_r: None,
            source_offset_theta: None,
            pupil_shift_x: None,
            pupil_shift_y: None,
            pupil_rotation: None,
            defocus_waves: None,
            defocus_wavelength: None,
            force_coron: false,
            no_sam: false,
            parity: None,
            jitter: Some(JitterSpec::Gaussian),
            jitter_sigma: TYPICAL_LOS_JITTER_PER_AXIS,
            bar_offset: None,
            coron_shift_x: None,
            coron_shift_y: None,
            coron_include_pre_lyot_plane: false,
            nd_squares: true,
            force_fqpm_shift: false,
            lrs_use_mft: true,
            lrs_slit_offset_x: None,
            lrs_slit_offset_y: None,
            ifualign_rotation: true,
            add_distortion: true,
            crop_psf: true,
            add_charge_diffusion: true,
            add_cruciform: true,
            add_ifu_broadening: true,
            add_ipc: true,
            charge_diffusion_sigma: None,
            ipc_alpha: None,
            ipc_beta: None,
            output_mode: OutputMode::Both,
        }
    }
}

impl CalcOptions {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let opts =
            CalcOptions::from_json_str(r#"{"defocus_waves": 0.5, "parity": "odd"}"#).unwrap();
        assert_eq!(opts.defocus_waves, Some(0.5));
        assert_eq!(opts.parity, Some(Parity::Odd));
        assert_eq!(opts.jitter, Some(JitterSpec::Gaussian));
        assert_eq!(opts.jitter_sigma, TYPICAL_LOS_JITTER_PER_AXIS);
        assert!(opts.lrs_use_mft);
    }

    #[test]
    fn test_bar_offset_accepts_number_or_name() {
        let opts = CalcOptions::from_json_str(r#"{"bar_offset": 2.5}"#).unwrap();
        assert_eq!(opts.bar_offset, Some(BarOffset::Arcsec(2.5)));
        let opts = CalcOptions::from_json_str(r#"{"bar_offset": "F460M"}"#).unwrap();
        assert_eq!(opts.bar_offset, Some(BarOffset::Named("F460M".to_string())));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        let mut opts = CalcOptions::default();
        opts.output_mode = OutputMode::Detector;
        opts.jitter = Some(JitterSpec::Linear);
        opts.save_to_file(&path).unwrap();
        assert_eq!(CalcOptions::load_from_file(&path).unwrap(), opts);
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(CalcOptions::from_json_str("{not json").is_err());
    }
}
