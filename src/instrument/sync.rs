//! Aperture/detector synchronization.

use log::debug;

use super::Instrument;
use crate::config::ObservingMode;
use crate::error::Result;
use crate::geometry::ApertureKind;

/// Placeholder field point for compound apertures, which have no pixel grid.
const COMPOUND_POSITION: (u32, u32) = (512, 512);

/// Re-derive the aperture from the current configuration.
pub fn resync(instrument: &mut Instrument) -> Result<()> {
    match instrument.provider().aperture_rule(instrument.config()) {
        Some(aperture) => {
            debug!("Resync selects aperture {aperture}");
            instrument.set_aperture_name(&aperture)
        }
        None => Ok(()),
    }
}

/// Point the simulation at the reference position of `name`.
///
/// The detector implied by the name prefix is selected first, since selecting
/// a detector resets the aperture. Slit apertures are mapped back through the
/// full-frame aperture of the active detector.
pub fn set_position_from_aperture_name(instrument: &mut Instrument, name: &str) -> Result<()> {
    let table = std::sync::Arc::clone(&instrument.table);
    let aperture = table.lookup(name).map_err(|_| crate::error::ValidationError::InvalidAperture {
        family: instrument.family(),
        value: name.to_string(),
    })?;

    let prefix = name.split('_').next().unwrap_or(name);
    if prefix.starts_with("MIRIFU") {
        instrument.config_mut().mode = ObservingMode::Ifu;
        let detector = if name.contains("CHANNEL1") || name.contains("CHANNEL2") {
            "MIRIFUSHORT"
        } else {
            "MIRIFULONG"
        };
        instrument.set_detector(detector)?;
    } else if prefix.starts_with("MIRIM") {
        instrument.config_mut().mode = ObservingMode::Imaging;
        instrument.set_detector(prefix)?;
    } else if prefix != "NRS" {
        instrument.set_detector(prefix)?;
    }

    instrument.set_aperture_name(name)?;

    match aperture.kind {
        ApertureKind::Slit => {
            let full = table.lookup(&format!("{}_FULL", instrument.config().detector))?;
            let (x, y) = full.tel_to_sci(aperture.v2_ref, aperture.v3_ref);
            debug!(
                "Inferring detector position for slit {name} from V2,V3 ({}, {})",
                aperture.v2_ref, aperture.v3_ref
            );
            instrument.set_detector_position_signed(x.trunc() as i64, y.trunc() as i64)?;
        }
        ApertureKind::Compound => {
            instrument.set_detector_position(COMPOUND_POSITION.0, COMPOUND_POSITION.1)?;
        }
        ApertureKind::Plain => {
            let (x, y) = aperture.reference_pixel();
            instrument.set_detector_position_signed(x, y)?;
        }
    }
    debug!(
        "From {name} set detector {} position {:?}",
        instrument.config().detector,
        instrument.config().detector_position
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slit_position_comes_from_sibling_full_frame() {
        let mut nrs = Instrument::nirspec().unwrap();
        let before = nrs.config().detector_position;
        nrs.set_aperture_name("NRS_S200A1_SLIT").unwrap();
        assert_eq!(nrs.config().detector_position, before);

        set_position_from_aperture_name(&mut nrs, "NRS_S1600A1_SLIT").unwrap();
        assert_eq!(nrs.config().aperture(), "NRS_S1600A1_SLIT");
        let (x, y) = nrs.config().detector_position;
        assert!((1379..=1380).contains(&x), "x = {x}");
        assert!((1023..=1024).contains(&y), "y = {y}");
    }

    #[test]
    fn test_compound_uses_placeholder_position() {
        let mut miri = Instrument::miri().unwrap();
        set_position_from_aperture_name(&mut miri, "MIRIFU_CHANNEL3B").unwrap();
        assert_eq!(miri.config().detector, "MIRIFULONG");
        assert!(miri.config().is_ifu());
        assert_eq!(miri.config().detector_position, COMPOUND_POSITION);
        assert_eq!(miri.config().band.as_deref(), Some("3B"));
    }

    #[test]
    fn test_unknown_aperture_is_rejected() {
        let mut fgs = Instrument::fgs().unwrap();
        assert!(set_position_from_aperture_name(&mut fgs, "FGS3_FULL").is_err());
    }

    #[test]
    fn test_miri_imaging_from_coronagraph_aperture() {
        let mut miri = Instrument::miri().unwrap();
        set_position_from_aperture_name(&mut miri, "MIRIM_CORON1140").unwrap();
        assert_eq!(miri.config().aperture(), "MIRIM_CORON1140");
        assert_eq!(miri.config().detector_position, (119, 627));
    }
}
