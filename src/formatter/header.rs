//! FITS-style keyword headers attached to output extensions.

use serde::Serialize;

use crate::instrument::Instrument;
use crate::optics::assembler::AssemblyMetadata;

/// Version reported in the `VERSION` keyword.
pub const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Str(String),
    Float(f64),
    Int(i64),
    Bool(bool),
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::Str(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        HeaderValue::Str(v)
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        HeaderValue::Float(v)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Int(v)
    }
}

impl From<u32> for HeaderValue {
    fn from(v: u32) -> Self {
        HeaderValue::Int(i64::from(v))
    }
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        HeaderValue::Bool(v)
    }
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderCard {
    pub key: String,
    pub value: HeaderValue,
    pub comment: String,
}

impl HeaderCard {
    pub fn new(key: &str, value: impl Into<HeaderValue>, comment: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
            comment: comment.to_string(),
        }
    }
}

/// Ordered keyword list; setting an existing key replaces it in place.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Header {
    pub cards: Vec<HeaderCard>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<HeaderValue>, comment: &str) {
        self.insert(HeaderCard::new(key, value, comment));
    }

    pub fn insert(&mut self, card: HeaderCard) {
        match self.cards.iter_mut().find(|c| c.key == card.key) {
            Some(existing) => *existing = card,
            None => self.cards.push(card),
        }
    }

    pub fn extend(&mut self, cards: impl IntoIterator<Item = HeaderCard>) {
        for card in cards {
            self.insert(card);
        }
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.cards.iter().find(|c| c.key == key).map(|c| &c.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// Primary header describing the configuration a PSF was computed for.
///
/// `output_side` is the width of the oversampled primary image in pixels. The
/// reported detector position gains half a pixel when the detector-sampled
/// side is even, since the PSF is then centered on a pixel corner.
pub fn result_header(
    instrument: &Instrument,
    metadata: &AssemblyMetadata,
    output_side: usize,
) -> crate::error::Result<Header> {
    let cfg = instrument.config();
    let geometry = instrument.detector_geometry()?;
    let mut header = Header::new();

    header.set("INSTRUME", instrument.family().name(), "Instrument");
    header.set("FILTER", cfg.filter.as_str(), "Filter name");
    header.set(
        "CORONMSK",
        cfg.image_mask.as_deref().unwrap_or("None"),
        "Image plane mask",
    );
    header.set("PUPIL", cfg.pupil_mask.as_deref().unwrap_or("None"), "Pupil plane mask");
    header.set("VERSION", CRATE_VERSION, "optical_train software version");
    header.set("DATAVERS", instrument.table().data_version.as_str(), "Geometry table version");

    let detector_side = output_side / metadata.detector_oversample.max(1) as usize;
    let half = if detector_side % 2 == 0 { 0.5 } else { 0.0 };
    let (x, y) = cfg.detector_position;
    header.set("DET_NAME", cfg.detector.as_str(), "Name of detector on this instrument");
    header.set("DET_X", f64::from(x) + half, "Detector X pixel position of array center");
    header.set("DET_Y", f64::from(y) + half, "Detector Y pixel position of array center");

    let (v2, v3) = geometry.tel_coords(cfg.detector_position);
    header.set("DET_V2", v2, "[arcmin] Det. pos. in telescope V2,V3 coord sys");
    header.set("DET_V3", v3, "[arcmin] Det. pos. in telescope V2,V3 coord sys");
    header.set("APERNAME", cfg.aperture(), "SIAF aperture name");

    header.set(
        "PIXELSCL",
        cfg.pixel_scale / f64::from(metadata.detector_oversample.max(1)),
        "Pixel scale in arcsec/pixel",
    );
    header.set(
        "DET_SAMP",
        metadata.detector_oversample,
        "Oversampling factor for MFT to detector plane",
    );
    header.set(
        "OVERSAMP",
        metadata.detector_oversample,
        "Oversampling factor relative to detector pixels",
    );

    for entry in &metadata.wfe_budget {
        header.set(&entry.label, entry.rms_nm, "[nm] RMS wavefront error");
    }
    if let Some(defocus) = metadata.defocus {
        header.set("DEFOCUS", defocus.waves, "# of waves of defocus added");
        header.set(
            "DEFOC_WL",
            defocus.reference_wavelength,
            "Wavelength reference for defocus added",
        );
    }

    header.extend(instrument.provider().header_keywords(cfg));
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_in_place() {
        let mut h = Header::new();
        h.set("GRATING", "None", "grating");
        h.set("MODE", "IFU", "mode");
        h.set("GRATING", "PRISM", "grating simulated");
        assert_eq!(h.len(), 2);
        assert_eq!(h.cards[0].key, "GRATING");
        assert_eq!(h.get("GRATING").and_then(HeaderValue::as_str), Some("PRISM"));
    }

    #[test]
    fn test_values_serialize_untagged() {
        let card = HeaderCard::new("FOCUSPOS", 0_i64, "focus");
        let json = serde_json::to_string(&card.value).unwrap();
        assert_eq!(json, "0");
        assert_eq!(HeaderValue::from(2.5).as_f64(), Some(2.5));
        assert_eq!(HeaderValue::from(true).as_f64(), None);
    }
}
