//! Mutable configuration snapshot of one instrument.

use serde::{Deserialize, Serialize};

use super::options::CalcOptions;
use crate::optics::pupil::{OpdSource, PupilSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObservingMode {
    #[default]
    Imaging,
    Ifu,
}

impl ObservingMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "imaging" => Some(ObservingMode::Imaging),
            "ifu" => Some(ObservingMode::Ifu),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObservingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObservingMode::Imaging => write!(f, "imaging"),
            ObservingMode::Ifu => write!(f, "IFU"),
        }
    }
}

/// Fields are public for reading; mutation goes through the validated setters on
/// [`Instrument`](crate::instrument::Instrument) so the cross-field invariants hold.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentConfig {
    pub filter: String,
    pub image_mask: Option<String>,
    pub pupil_mask: Option<String>,
    pub detector: String,
    /// Science-frame pixel (x, y)
    pub detector_position: (u32, u32),
    pub aperture_name: Option<String>,
    /// arcsec/pixel
    pub pixel_scale: f64,
    /// Detector rotation relative to V3, degrees
    pub rotation: Option<f64>,
    pub mode: ObservingMode,
    pub band: Option<String>,
    pub disperser: Option<String>,
    pub include_si_wfe: bool,
    pub auto_pupil: bool,
    pub auto_channel: bool,
    pub pupil: PupilSource,
    pub opd: OpdSource,
    pub options: CalcOptions,
}

impl InstrumentConfig {
    pub fn new(filter: impl Into<String>, detector: impl Into<String>, pixel_scale: f64) -> Self {
        Self {
            filter: filter.into(),
            image_mask: None,
            pupil_mask: None,
            detector: detector.into(),
            detector_position: (1024, 1024),
            aperture_name: None,
            pixel_scale,
            rotation: None,
            mode: ObservingMode::Imaging,
            band: None,
            disperser: None,
            include_si_wfe: true,
            auto_pupil: true,
            auto_channel: true,
            pupil: PupilSource::default(),
            opd: OpdSource::default(),
            options: CalcOptions::default(),
        }
    }

    pub fn is_ifu(&self) -> bool {
        self.mode == ObservingMode::Ifu
    }

    pub fn aperture(&self) -> &str {
        self.aperture_name.as_deref().unwrap_or("")
    }

    pub fn image_mask_is(&self, name: &str) -> bool {
        self.image_mask.as_deref() == Some(name)
    }

    pub fn pupil_mask_is(&self, name: &str) -> bool {
        self.pupil_mask.as_deref() == Some(name)
    }
}
