/// An image- or pupil-plane mask, optionally tied to a default aperture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskEntry {
    pub name: &'static str,
    pub aperture: Option<&'static str>,
}

const fn mask(name: &'static str) -> MaskEntry {
    MaskEntry { name, aperture: None }
}

const fn mask_at(name: &'static str, aperture: &'static str) -> MaskEntry {
    MaskEntry {
        name,
        aperture: Some(aperture),
    }
}

pub const NIRCAM_IMAGE_MASKS: &[MaskEntry] = &[
    mask("MASKLWB"),
    mask("MASKSWB"),
    mask("MASK210R"),
    mask("MASK335R"),
    mask("MASK430R"),
];

pub const NIRCAM_PUPIL_MASKS: &[MaskEntry] = &[
    mask("CIRCLYOT"),
    mask("WEDGELYOT"),
    mask("MASKRND"),
    mask("MASKSWB"),
    mask("MASKLWB"),
    mask("WEAK LENS +4"),
    mask("WEAK LENS +8"),
    mask("WEAK LENS -8"),
    mask("WEAK LENS +12 (=4+8)"),
    mask("WEAK LENS -4 (=4-8)"),
    mask("WLP4"),
    mask("WLM4"),
    mask("WLP8"),
    mask("WLM8"),
    mask("WLP12"),
    mask("DHS_01"),
    mask("DHS_02"),
    mask("DHS_03"),
    mask("DHS_04"),
    mask("DHS_05"),
    mask("DHS_06"),
    mask("DHS_07"),
    mask("DHS_08"),
    mask("DHS_09"),
    mask("DHS_10"),
];

pub const MIRI_IMAGE_MASKS: &[MaskEntry] = &[
    mask_at("FQPM1065", "MIRIM_CORON1065"),
    mask_at("FQPM1140", "MIRIM_CORON1140"),
    mask_at("FQPM1550", "MIRIM_CORON1550"),
    mask_at("LYOT2300", "MIRIM_CORONLYOT"),
    mask("LRS slit"),
];

pub const MIRI_PUPIL_MASKS: &[MaskEntry] = &[mask("MASKFQPM"), mask("MASKLYOT"), mask("P750L")];

pub const NIRSPEC_IMAGE_MASKS: &[MaskEntry] = &[
    mask("S200A1"),
    mask("S200A2"),
    mask("S400A1"),
    mask("S1600A1"),
    mask("S200B1"),
    mask("MSA all open"),
    mask("Single MSA open shutter"),
    mask("Three adjacent MSA open shutters"),
    mask("IFU"),
];

pub const NIRSPEC_PUPIL_MASKS: &[MaskEntry] = &[mask("NIRSpec grating")];

pub const NIRISS_IMAGE_MASKS: &[MaskEntry] = &[
    mask("CORON058"),
    mask("CORON075"),
    mask("CORON150"),
    mask("CORON200"),
];

pub const NIRISS_PUPIL_MASKS: &[MaskEntry] = &[mask("CLEARP"), mask("MASK_NRM"), mask("GR700XD")];

/// Case-insensitive mask lookup; returns the canonical entry.
pub fn resolve_mask<'a>(masks: &'a [MaskEntry], name: &str) -> Option<&'a MaskEntry> {
    let name = name.trim();
    masks.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

pub fn mask_names(masks: &[MaskEntry]) -> Vec<String> {
    masks.iter().map(|m| m.name.to_string()).collect()
}

/// `""` and `"none"` (any case) clear a mask.
pub fn is_clear(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name.eq_ignore_ascii_case("none")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_returns_canonical_case() {
        let m = resolve_mask(MIRI_IMAGE_MASKS, "lrs SLIT").unwrap();
        assert_eq!(m.name, "LRS slit");
        assert_eq!(m.aperture, None);
        assert_eq!(
            resolve_mask(MIRI_IMAGE_MASKS, "fqpm1140").unwrap().aperture,
            Some("MIRIM_CORON1140")
        );
    }

    #[test]
    fn test_clear_values() {
        assert!(is_clear(""));
        assert!(is_clear("None"));
        assert!(!is_clear("MASK210R"));
    }
}
