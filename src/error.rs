use thiserror::Error;

use crate::family::Family;

/// Invalid user input rejected by a validated setter.
///
/// Every variant carries the rejected value and, where the legal set is finite,
/// the values that would have been accepted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Filter name not present in the family filter catalog.
    #[error("{family} has no filter called '{value}'. Valid filters are: {}", valid.join(", "))]
    InvalidFilter {
        family: Family,
        value: String,
        valid: Vec<String>,
    },

    /// Image or pupil mask name not present in the family mask catalog.
    #[error(
        "{family} doesn't have a {plane} mask called '{value}'. Valid masks are: {}",
        valid.join(", ")
    )]
    InvalidMask {
        family: Family,
        plane: &'static str,
        value: String,
        valid: Vec<String>,
    },

    /// Detector identifier not present in the family detector table.
    #[error("Invalid detector '{value}'. Valid detector names are: {}", valid.join(", "))]
    InvalidDetector { value: String, valid: Vec<String> },

    /// Aperture name absent from the geometry table.
    #[error("Aperture name {value} not a valid aperture name for {family}")]
    InvalidAperture { family: Family, value: String },

    /// Plain aperture whose name does not carry the selected detector.
    #[error(
        "Aperture name {aperture} does not match currently selected detector {detector}. \
         Change detector first, then set desired aperture."
    )]
    ApertureDetectorMismatch { aperture: String, detector: String },

    /// Detector pixel position outside the selected detector.
    #[error(
        "Detector pixel position ({x}, {y}) is outside {detector}; \
         the maximum allowed value is (X,Y) = ({}, {})",
        width.saturating_sub(1),
        height.saturating_sub(1)
    )]
    OutOfBounds {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        detector: String,
    },

    /// IFU band not present in the band table.
    #[error("Not a valid IFU band: '{value}'. Valid bands are: {}", valid.join(", "))]
    InvalidBand { value: String, valid: Vec<String> },

    /// Disperser not present in the disperser list.
    #[error("Not a valid disperser name: '{value}'. Valid dispersers are: {}", valid.join(", "))]
    InvalidDisperser { value: String, valid: Vec<String> },

    /// Observing mode not supported by the family.
    #[error("'{value}' is not an allowed mode for {family}")]
    InvalidMode { family: Family, value: String },

    /// Primary mirror segment identifier that names no segment.
    #[error("Invalid segment '{value}': {reason}")]
    InvalidSegment { value: String, reason: &'static str },

    /// Unknown wavefront error component.
    #[error("Not a known kind of WFE: '{value}'. Valid kinds are: si, ote, total")]
    InvalidWfeKind { value: String },
}

/// Failures reading or resolving the coordinate reference tables.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Aperture identifier absent from the instrument table.
    #[error("unknown aperture '{aperture}' for instrument {instrument}")]
    UnknownAperture { instrument: String, aperture: String },

    /// No table exists for the requested instrument.
    #[error("no geometry table available for instrument '{0}'")]
    UnknownInstrument(String),

    /// A coordinate could not be mapped between frames.
    #[error("cannot map coordinates through aperture {aperture}: {reason}")]
    Unmappable { aperture: String, reason: String },

    /// The table source could not be read or parsed.
    #[error("failed to load geometry table: {0}")]
    Load(String),
}

/// Top-level error type for configuration, assembly and output formatting.
#[derive(Error, Debug)]
pub enum OpticsError {
    /// Invalid filter, mask, detector, aperture or position.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A request that is inconsistent with the current configuration, such as
    /// IFU-only functionality while in imaging mode.
    #[error("configuration conflict: {0}")]
    ConfigurationConflict(String),

    /// Geometry lookup failure.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Operation not supported by an instrument family. Signals a caller bug.
    #[error("{operation} is not implemented for {family}")]
    NotImplementedForFamily {
        family: Family,
        operation: &'static str,
    },

    /// Pupil, OPD or catalog data could not be used.
    #[error("data error: {0}")]
    Data(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raised internally when the semi-analytic shortcut cannot be built from a plane
/// stack. The assembler logs it and falls back to full propagation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("semi-analytic propagation unavailable: {0}")]
pub struct AcceleratedModeUnavailable(pub String);

pub type Result<T> = std::result::Result<T, OpticsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_detector_lists_legal_values() {
        let err = ValidationError::InvalidDetector {
            value: "NRCC1".to_string(),
            valid: vec!["NRCA1".to_string(), "NRCA2".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("NRCC1"));
        assert!(msg.contains("NRCA1, NRCA2"));
    }

    #[test]
    fn test_out_of_bounds_reports_maximum() {
        let err = ValidationError::OutOfBounds {
            x: 2048,
            y: 10,
            width: 2048,
            height: 2048,
            detector: "NRCA1".to_string(),
        };
        assert!(err.to_string().contains("(2047, 2047)"));
    }

    #[test]
    fn test_validation_converts_into_optics_error() {
        let err: OpticsError = ValidationError::InvalidBand {
            value: "5A".to_string(),
            valid: vec![],
        }
        .into();
        assert!(matches!(err, OpticsError::Validation(_)));
    }
}
