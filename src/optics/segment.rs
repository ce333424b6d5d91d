//! Primary mirror segment names and single-segment pupils.
//!
//! Segments are numbered 1 to 19 in wavefront sensing order: A1-A6 form the
//! inner ring, B and C segments alternate around the outer ring starting at
//! B1-7, and the secondary mirror is SM-19.

use ndarray::Array2;

use super::pupil::PupilMap;
use crate::error::ValidationError;

/// Number of the secondary mirror in the segment numbering.
pub const SECONDARY_MIRROR: u8 = 19;

fn invalid(value: &str, reason: &'static str) -> ValidationError {
    ValidationError::InvalidSegment {
        value: value.to_string(),
        reason,
    }
}

/// Canonical segment name for a segment number, e.g. `11` -> `"B3-11"`.
pub fn segment_name_from_number(number: u8) -> Result<String, ValidationError> {
    match number {
        1..=6 => Ok(format!("A{number}-{number}")),
        SECONDARY_MIRROR => Ok("SM-19".to_string()),
        7..=18 => {
            let letter = if number % 2 == 1 { 'B' } else { 'C' };
            Ok(format!("{letter}{}-{number}", (number - 5) / 2))
        }
        _ => Err(invalid(&number.to_string(), "segment numbers run from 1 to 19")),
    }
}

/// Canonical segment name from any common spelling: `"11"`, `"B3"`, `"B3-11"`
/// and `"SM"` are all accepted.
pub fn segment_name(value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if let Ok(number) = trimmed.parse::<i64>() {
        let number = u8::try_from(number)
            .map_err(|_| invalid(value, "segment numbers run from 1 to 19"))?;
        return segment_name_from_number(number);
    }

    let upper = trimmed.to_ascii_uppercase();
    if upper.starts_with("SM") {
        return Ok("SM-19".to_string());
    }
    let mut chars = upper.chars();
    let offset = match chars.next() {
        Some('A') => 0,
        Some('B') => 5,
        Some('C') => 6,
        _ => return Err(invalid(value, "name must start with A, B, C or SM")),
    };
    let index = chars
        .next()
        .and_then(|c| c.to_digit(10))
        .filter(|n| (1..=6).contains(n))
        .ok_or_else(|| invalid(value, "second character must be a number from 1 to 6"))?;
    let letter = &upper[..1];
    if offset == 0 {
        Ok(format!("{letter}{index}-{index}"))
    } else {
        Ok(format!("{letter}{index}-{}", offset + index * 2))
    }
}

/// Segment number for any accepted spelling.
pub fn segment_number(value: &str) -> Result<u8, ValidationError> {
    let name = segment_name(value)?;
    name.rsplit('-')
        .next()
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| invalid(value, "segment name has no number"))
}

/// Keep only the pixels of `segment_map` labelled with the requested segment.
///
/// The map holds segment numbers per pixel and zero outside the mirror.
pub fn one_segment_pupil(
    segment_map: &PupilMap,
    segment: &str,
) -> Result<PupilMap, ValidationError> {
    let number = f64::from(segment_number(segment)?);
    let amplitude: Array2<f64> = segment_map
        .amplitude
        .mapv(|v| if v == number { 1.0 } else { 0.0 });
    Ok(PupilMap {
        amplitude,
        pixel_scale: segment_map.pixel_scale,
    })
}
