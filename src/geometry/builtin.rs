//! Representative geometry tables compiled into the crate.
//!
//! Reference points, scales and angles follow the published SIAF layout closely
//! enough for configuration modeling; they are not a substitute for the
//! authoritative reference files, which can be supplied as JSON through
//! [`JsonGeometryDir`](super::cache::JsonGeometryDir).

use super::aperture::{coeff_index, Aperture, ApertureKind, SciDistortion};
use super::table::GeometryTable;

pub const BUILTIN_DATA_VERSION: &str = "builtin-1";

/// Build the built-in table for an instrument, matching names case-insensitively.
pub fn builtin_table(instrument: &str) -> Option<GeometryTable> {
    let apertures = match instrument.to_ascii_lowercase().as_str() {
        "nircam" => nircam(),
        "miri" => miri(),
        "nirspec" => nirspec(),
        "niriss" => niriss(),
        "fgs" => fgs(),
        _ => return None,
    };
    Some(GeometryTable::new(canonical(instrument), BUILTIN_DATA_VERSION, apertures))
}

fn canonical(instrument: &str) -> &'static str {
    match instrument.to_ascii_lowercase().as_str() {
        "nircam" => "NIRCam",
        "miri" => "MIRI",
        "nirspec" => "NIRSpec",
        "niriss" => "NIRISS",
        _ => "FGS",
    }
}

fn distortion(scale: f64, a20: f64, a11: f64, b02: f64, b11: f64) -> SciDistortion {
    let mut d = SciDistortion::zero(3, scale);
    d.a_coeffs[coeff_index(2, 0)] = a20;
    d.a_coeffs[coeff_index(1, 1)] = a11;
    d.b_coeffs[coeff_index(0, 2)] = b02;
    d.b_coeffs[coeff_index(1, 1)] = b11;
    d.a_coeffs[coeff_index(1, 2)] = a20 * 0.1;
    d.b_coeffs[coeff_index(2, 1)] = b02 * 0.1;
    d
}

#[allow(clippy::too_many_arguments)]
fn full_frame(
    name: &str,
    size: (f64, f64),
    scale: (f64, f64),
    v_ref: (f64, f64),
    yang: f64,
    parity: f64,
    dist: Option<SciDistortion>,
) -> Aperture {
    let mut ap = Aperture {
        name: name.to_string(),
        kind: ApertureKind::Plain,
        x_sci_ref: size.0 / 2.0 + 0.5,
        y_sci_ref: size.1 / 2.0 + 0.5,
        x_sci_scale: scale.0,
        y_sci_scale: scale.1,
        v2_ref: v_ref.0,
        v3_ref: v_ref.1,
        v3_idl_yang: yang,
        v_idl_parity: parity,
        corners: [(0.0, 0.0); 4],
        distortion: dist,
    };
    ap.corners = ap.detector_corners(size.0, size.1);
    ap
}

/// Plain aperture sharing the pixel grid of `parent`, referenced at `sci_ref`.
fn sub_aperture(parent: &Aperture, name: &str, sci_ref: (f64, f64), scale_factor: f64) -> Aperture {
    let (v2, v3) = parent.sci_to_tel(sci_ref.0, sci_ref.1);
    let mut ap = parent.clone();
    ap.name = name.to_string();
    ap.x_sci_ref = sci_ref.0;
    ap.y_sci_ref = sci_ref.1;
    ap.x_sci_scale *= scale_factor;
    ap.y_sci_scale *= scale_factor;
    ap.v2_ref = v2;
    ap.v3_ref = v3;
    ap
}

fn quad(center: (f64, f64), width: f64, height: f64, theta_deg: f64) -> [(f64, f64); 4] {
    let (s, c) = theta_deg.to_radians().sin_cos();
    let a = (width * c, -width * s);
    let b = (height * s, height * c);
    let p = (center.0 - (a.0 + b.0) / 2.0, center.1 - (a.1 + b.1) / 2.0);
    [
        p,
        (p.0 + a.0, p.1 + a.1),
        (p.0 + a.0 + b.0, p.1 + a.1 + b.1),
        (p.0 + b.0, p.1 + b.1),
    ]
}

/// Sky-only aperture placed at a pixel of `parent`.
fn slit(parent: &Aperture, name: &str, sci: (f64, f64), width: f64, height: f64) -> Aperture {
    let (v2, v3) = parent.sci_to_tel(sci.0, sci.1);
    Aperture {
        name: name.to_string(),
        kind: ApertureKind::Slit,
        x_sci_ref: 0.0,
        y_sci_ref: 0.0,
        x_sci_scale: 0.0,
        y_sci_scale: 0.0,
        v2_ref: v2,
        v3_ref: v3,
        v3_idl_yang: parent.v3_idl_yang,
        v_idl_parity: parent.v_idl_parity,
        corners: quad((v2, v3), width, height, parent.v3_idl_yang),
        distortion: None,
    }
}

fn compound(name: &str, v_ref: (f64, f64), width: f64, height: f64, theta: f64) -> Aperture {
    Aperture {
        name: name.to_string(),
        kind: ApertureKind::Compound,
        x_sci_ref: 0.0,
        y_sci_ref: 0.0,
        x_sci_scale: 0.0,
        y_sci_scale: 0.0,
        v2_ref: v_ref.0,
        v3_ref: v_ref.1,
        v3_idl_yang: 0.0,
        v_idl_parity: -1.0,
        corners: quad(v_ref, width, height, theta),
        distortion: None,
    }
}

fn nircam() -> Vec<Aperture> {
    const SIZE: (f64, f64) = (2048.0, 2048.0);
    let detectors: [(&str, (f64, f64), (f64, f64), f64); 10] = [
        ("NRCA1", (0.03108, 0.03130), (120.60, -527.53), -0.55),
        ("NRCA2", (0.03100, 0.03124), (120.18, -459.71), -0.32),
        ("NRCA3", (0.03096, 0.03134), (51.31, -527.93), -0.47),
        ("NRCA4", (0.03100, 0.03130), (52.02, -459.42), -0.23),
        ("NRCA5", (0.06292, 0.06326), (86.10, -493.23), -0.24),
        ("NRCB1", (0.03110, 0.03134), (-120.04, -527.10), 0.36),
        ("NRCB2", (0.03104, 0.03128), (-120.82, -459.30), 0.46),
        ("NRCB3", (0.03098, 0.03126), (-51.77, -527.54), 0.28),
        ("NRCB4", (0.03106, 0.03132), (-52.39, -459.19), 0.53),
        ("NRCB5", (0.06290, 0.06318), (-89.19, -493.51), 0.16),
    ];

    let mut out = Vec::new();
    for (i, (det, scale, v_ref, yang)) in detectors.iter().enumerate() {
        let k = i as f64;
        let dist = distortion(1024.0, 2.1e-4 + 1e-6 * k, -1.2e-4, 1.6e-4, 8.0e-5 - 1e-6 * k);
        out.push(full_frame(&format!("{det}_FULL"), SIZE, *scale, *v_ref, *yang, -1.0, Some(dist)));
    }

    let parent = |name: &str| out.iter().find(|a| a.name == name).cloned();
    let coron: [(&str, &str, (f64, f64)); 17] = [
        ("NRCA5_FULL", "NRCA5_FULL_MASKLWB", (1420.5, 1684.5)),
        ("NRCA4_FULL", "NRCA4_FULL_MASKSWB", (1040.5, 1612.5)),
        ("NRCA2_FULL", "NRCA2_FULL_MASK210R", (1764.5, 1623.5)),
        ("NRCA5_FULL", "NRCA5_FULL_MASK335R", (1152.5, 1684.5)),
        ("NRCA5_FULL", "NRCA5_FULL_MASK430R", (918.5, 1684.5)),
        ("NRCA5_FULL", "NRCA5_FULL_WEDGE_BAR", (1263.5, 1684.5)),
        ("NRCA5_FULL", "NRCA5_FULL_WEDGE_RND", (1035.5, 1684.5)),
        ("NRCA4_FULL", "NRCA4_FULL_WEDGE_BAR", (1130.5, 1612.5)),
        ("NRCA2_FULL", "NRCA2_FULL_WEDGE_RND", (1530.5, 1623.5)),
        ("NRCA5_FULL", "NRCA5_MASKLWB_NARROW", (1755.5, 1684.5)),
        ("NRCA5_FULL", "NRCA5_MASKLWB_F460M", (1500.5, 1684.5)),
        ("NRCA4_FULL", "NRCA4_MASKSWB_F182M", (930.5, 1612.5)),
        ("NRCB5_FULL", "NRCB5_MASKLWB", (1340.5, 1700.5)),
        ("NRCB3_FULL", "NRCB3_MASKSWB", (1090.5, 1640.5)),
        ("NRCB1_FULL", "NRCB1_MASK210R", (1700.5, 1640.5)),
        ("NRCB5_FULL", "NRCB5_MASK335R", (1120.5, 1700.5)),
        ("NRCB5_FULL", "NRCB5_MASK430R", (880.5, 1700.5)),
    ];
    let mut extra = Vec::new();
    for (parent_name, name, sci_ref) in coron {
        if let Some(p) = parent(parent_name) {
            extra.push(sub_aperture(&p, name, sci_ref, 1.00004));
        }
    }
    if let Some(p) = parent("NRCA1_FULL") {
        extra.push(sub_aperture(&p, "NRCA1_SUB400P", (200.5, 200.5), 1.0));
    }
    out.extend(extra);
    out
}

fn miri() -> Vec<Aperture> {
    let full = full_frame(
        "MIRIM_FULL",
        (1024.0, 1032.0),
        (0.11083, 0.11087),
        (-453.56, -373.81),
        4.83544897,
        -1.0,
        Some(distortion(512.0, 3.0e-4, -1.5e-4, 2.2e-4, 1.1e-4)),
    );
    let mut out = vec![
        sub_aperture(&full, "MIRIM_CORON1065", (120.0, 882.0), 1.0),
        sub_aperture(&full, "MIRIM_CORON1140", (119.0, 627.0), 1.0),
        sub_aperture(&full, "MIRIM_CORON1550", (117.0, 374.0), 1.0),
        sub_aperture(&full, "MIRIM_CORONLYOT", (304.0, 786.0), 1.0),
        sub_aperture(&full, "MIRIM_BRIGHTSKY", (711.5, 305.5), 1.0),
        slit(&full, "MIRIM_SLIT", (325.13, 299.7), 4.72345, 0.51525),
    ];
    out.push(full);

    let channels: [(char, (f64, f64), f64); 4] = [
        ('1', (3.2, 3.7), 8.41),
        ('2', (4.0, 4.8), 8.22),
        ('3', (5.2, 6.2), 7.63),
        ('4', (6.6, 7.7), 8.69),
    ];
    for (ch, (w, h), theta) in channels {
        for (j, sub) in ['A', 'B', 'C'].iter().enumerate() {
            let dtheta = 0.04 * j as f64;
            out.push(compound(
                &format!("MIRIFU_CHANNEL{ch}{sub}"),
                (-503.65, -318.74),
                w,
                h,
                theta + dtheta,
            ));
        }
    }
    out
}

fn nirspec() -> Vec<Aperture> {
    let nrs1 = full_frame(
        "NRS1_FULL",
        (2048.0, 2048.0),
        (0.10450, 0.10420),
        (378.42, -428.40),
        138.43,
        -1.0,
        Some(distortion(1024.0, 1.8e-4, -9.0e-5, 1.4e-4, 7.0e-5)),
    );
    let nrs2 = full_frame(
        "NRS2_FULL",
        (2048.0, 2048.0),
        (0.10425, 0.10440),
        (527.61, -560.11),
        138.87,
        -1.0,
        Some(distortion(1024.0, 1.7e-4, -8.0e-5, 1.5e-4, 6.0e-5)),
    );
    let out = vec![
        slit(&nrs1, "NRS_S200A1_SLIT", (1380.0, 1070.0), 0.2, 3.2),
        slit(&nrs1, "NRS_S200A2_SLIT", (1380.0, 1020.0), 0.2, 3.2),
        slit(&nrs1, "NRS_S400A1_SLIT", (1390.0, 990.0), 0.4, 3.65),
        slit(&nrs1, "NRS_S1600A1_SLIT", (1380.0, 1024.0), 1.6, 1.6),
        slit(&nrs1, "NRS_S200B1_SLIT", (1240.0, 1130.0), 0.2, 3.2),
        slit(&nrs1, "NRS_FULL_IFU", (1440.0, 1060.0), 3.193, 3.097),
        slit(&nrs1, "NRS_FULL_MSA", (1024.5, 1024.5), 180.0, 180.0),
        nrs1,
        nrs2,
    ];
    out
}

fn niriss() -> Vec<Aperture> {
    let cen = full_frame(
        "NIS_CEN",
        (2048.0, 2048.0),
        (0.065550, 0.065763),
        (-290.10, -697.50),
        -0.57,
        -1.0,
        Some(distortion(1024.0, 1.9e-4, -1.0e-4, 1.7e-4, 9.0e-5)),
    );
    vec![
        sub_aperture(&cen, "NIS_AMIFULL", (1720.5, 1555.5), 1.0),
        sub_aperture(&cen, "NIS_SOSSFULL", (1024.5, 1800.5), 1.0),
        cen,
    ]
}

fn fgs() -> Vec<Aperture> {
    vec![
        full_frame(
            "FGS1_FULL",
            (2048.0, 2048.0),
            (0.06909, 0.06889),
            (207.19, -697.50),
            -1.24,
            1.0,
            Some(distortion(1024.0, 2.4e-4, -1.3e-4, 1.8e-4, 1.0e-4)),
        ),
        full_frame(
            "FGS2_FULL",
            (2048.0, 2048.0),
            (0.06897, 0.06902),
            (-23.53, -697.73),
            -0.62,
            -1.0,
            Some(distortion(1024.0, 2.2e-4, -1.1e-4, 1.9e-4, 9.0e-5)),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_instrument_has_a_table() {
        for name in ["NIRCam", "miri", "NIRSpec", "NIRISS", "FGS"] {
            let table = builtin_table(name).unwrap();
            assert!(!table.is_empty(), "{name} table is empty");
        }
        assert!(builtin_table("WFI").is_none());
    }

    #[test]
    fn test_slit_reference_lies_inside_sibling_detector() {
        let table = builtin_table("nirspec").unwrap();
        let full = table.lookup("NRS1_FULL").unwrap();
        let slit = table.lookup("NRS_S1600A1_SLIT").unwrap();
        let (x, y) = full.tel_to_sci(slit.v2_ref, slit.v3_ref);
        assert!((x - 1380.0).abs() < 1e-6);
        assert!((y - 1024.0).abs() < 1e-6);
    }

    #[test]
    fn test_miri_ifu_apertures_are_compound() {
        let table = builtin_table("miri").unwrap();
        let ap = table.lookup("MIRIFU_CHANNEL2B").unwrap();
        assert_eq!(ap.kind, ApertureKind::Compound);
        assert!((ap.corner_rotation() - 8.26).abs() < 1e-9);
    }
}
