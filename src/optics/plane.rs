//! Optical plane descriptions and the ordered plane stack.
//!
//! Planes describe *what* an external propagation engine should apply; nothing
//! here computes wavefronts.

use std::sync::Arc;

use serde::Serialize;

use super::aberration::FieldAberration;
use super::pupil::{OpdSource, PupilMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaneKind {
    Pupil,
    Image,
    Detector,
    Rotation,
    Inversion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Axis {
    X,
    Y,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignDirection {
    Forward,
    Backward,
}

/// Extent of the region the accelerated propagators evaluate, arcsec.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OcculterBox {
    Square(f64),
    Rect(f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationMode {
    /// Plain FFT/MFT propagation through every plane
    Fourier,
    /// Semi-analytic coronagraph shortcut around a compact occulter
    SemiAnalytic,
    /// Matrix Fourier transform in a fine-sampled box around the occulter
    MatrixFourier,
}

/// Source position relative to the field center.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SourceOffset {
    /// arcsec
    pub r: f64,
    /// degrees east of north
    pub theta: f64,
}

/// Transmission or phase source carried by a plane.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "element", rename_all = "snake_case")]
pub enum OpticalElement {
    /// Telescope entrance pupil amplitude plus OTE OPD
    EntrancePupil {
        #[serde(skip)]
        pupil: Arc<PupilMap>,
        diameter: f64,
    },
    Inversion { axis: Axis },
    Rotation { angle: f64 },
    /// Field-dependent instrument WFE
    FieldAberration(FieldAberration),
    /// Pure defocus, `nwaves` at `reference_wavelength` meters over `radius` meters
    ThinLens {
        nwaves: f64,
        reference_wavelength: f64,
        radius: f64,
    },
    /// NIRCam weak lens, named by its nominal power
    WeakLens {
        lens: String,
        nwaves: f64,
        reference_wavelength: f64,
    },
    /// Uniform throughput placeholder
    ScalarTransmission { transmission: f64 },
    /// Band-limited coronagraph mask (NIRCam round and bar occulters)
    BandLimitedCoron {
        mask: String,
        module: char,
        nd_squares: bool,
        bar_offset: Option<f64>,
        auto_offset: Option<String>,
        shift: Option<(f64, f64)>,
    },
    CircularOcculter {
        radius: f64,
        shift: Option<(f64, f64)>,
    },
    BarOcculter {
        width: f64,
        height: f64,
        shift: Option<(f64, f64)>,
    },
    SquareFieldStop {
        size: f64,
        angle: f64,
        shift: Option<(f64, f64)>,
    },
    RectangularFieldStop {
        width: f64,
        height: f64,
        angle: f64,
        shift: Option<(f64, f64)>,
    },
    RectangleAperture { width: f64, height: f64 },
    IdealFqpm {
        wavelength: f64,
        shift: Option<(f64, f64)>,
    },
    FqpmAligner { direction: AlignDirection },
    MsaOpenGrid,
    MsaThreeShutters,
    /// Several analytic elements multiplied together in one plane
    Compound { parts: Vec<OpticalElement> },
    /// Element rasterized on a fixed fine grid
    FixedSampling {
        inner: Box<OpticalElement>,
        npix: u32,
        pixelscale: f64,
        oversample: u32,
    },
    /// Transmission map from the instrument data directory
    TransmissionFile { file: String },
    /// GR700XD grism pupil with its cylindrical lens
    GrismPupil,
    /// CLEARP pupil alignment reference obscuration
    ClearpPupil,
    Detector {
        pixelscale: f64,
        fov_pixels: u32,
        oversample: u32,
    },
}

impl OpticalElement {
    /// Whether the element is a compact image-plane occulter usable by the
    /// semi-analytic method.
    pub fn is_compact_occulter(&self) -> bool {
        match self {
            OpticalElement::CircularOcculter { .. } | OpticalElement::BandLimitedCoron { .. } => {
                true
            }
            OpticalElement::Compound { parts } => {
                parts.iter().any(OpticalElement::is_compact_occulter)
            }
            _ => false,
        }
    }
}

/// One entry of a [`PlaneStack`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plane {
    pub kind: PlaneKind,
    pub name: String,
    pub element: OpticalElement,
    #[serde(skip)]
    pub opd: Option<OpdSource>,
    /// Shift, meters in pupil planes
    pub shift: Option<(f64, f64)>,
    pub rotation: Option<f64>,
    pub flip_x: bool,
    pub flip_y: bool,
    /// Display hint for the propagation engine, e.g. `"intensity"`
    pub display_hint: Option<String>,
}

impl Plane {
    pub fn new(kind: PlaneKind, name: impl Into<String>, element: OpticalElement) -> Self {
        Self {
            kind,
            name: name.into(),
            element,
            opd: None,
            shift: None,
            rotation: None,
            flip_x: false,
            flip_y: false,
            display_hint: None,
        }
    }

    pub fn pupil(name: impl Into<String>, element: OpticalElement) -> Self {
        Self::new(PlaneKind::Pupil, name, element)
    }

    pub fn image(name: impl Into<String>, element: OpticalElement) -> Self {
        Self::new(PlaneKind::Image, name, element)
    }

    pub fn rotation_plane(angle: f64) -> Self {
        let mut plane = Self::new(
            PlaneKind::Rotation,
            "Rotation",
            OpticalElement::Rotation { angle },
        );
        plane.display_hint = Some("intensity".to_string());
        plane
    }

    /// Pupil-mask geometry: shift, rotation and flips.
    pub fn with_geometry(mut self, shift: Option<(f64, f64)>, rotation: Option<f64>) -> Self {
        self.shift = shift;
        self.rotation = rotation;
        self
    }

    pub fn flipped(mut self, flip_x: bool, flip_y: bool) -> Self {
        self.flip_x = flip_x;
        self.flip_y = flip_y;
        self
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.display_hint = Some(hint.to_string());
        self
    }

    /// Planes that change the wavefront rather than just its coordinates.
    pub fn is_transform(&self) -> bool {
        matches!(self.kind, PlaneKind::Rotation | PlaneKind::Inversion)
    }

    /// The instrument field-dependent aberration plane.
    pub fn is_field_aberration(&self) -> bool {
        matches!(self.element, OpticalElement::FieldAberration(_))
    }
}

/// Ordered optical planes from entrance pupil to detector.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PlaneStack {
    pub planes: Vec<Plane>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackViolation {
    MissingEntrancePupil,
    DetectorCount(usize),
    DetectorNotLast,
    RotationBeforeInversion { rotation: usize, inversion: usize },
}

impl std::fmt::Display for StackViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackViolation::MissingEntrancePupil => {
                write!(f, "first plane is not the entrance pupil")
            }
            StackViolation::DetectorCount(n) => write!(f, "expected one detector plane, found {n}"),
            StackViolation::DetectorNotLast => write!(f, "detector plane is not last"),
            StackViolation::RotationBeforeInversion { rotation, inversion } => write!(
                f,
                "rotation at index {rotation} precedes inversion at index {inversion}"
            ),
        }
    }
}

impl PlaneStack {
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.planes.iter().map(|p| p.name.as_str()).collect()
    }

    /// Check the structural invariants of a finished stack.
    pub fn validate(&self) -> Result<(), StackViolation> {
        let entrance = self
            .planes
            .iter()
            .filter(|p| matches!(p.element, OpticalElement::EntrancePupil { .. }))
            .count();
        let first_is_entrance = self
            .planes
            .first()
            .is_some_and(|p| matches!(p.element, OpticalElement::EntrancePupil { .. }));
        if entrance != 1 || !first_is_entrance {
            return Err(StackViolation::MissingEntrancePupil);
        }

        let detectors = self.planes.iter().filter(|p| p.kind == PlaneKind::Detector).count();
        if detectors != 1 {
            return Err(StackViolation::DetectorCount(detectors));
        }
        if self.planes.last().map(|p| p.kind) != Some(PlaneKind::Detector) {
            return Err(StackViolation::DetectorNotLast);
        }

        let inversions: Vec<usize> = self.indices_of(PlaneKind::Inversion);
        let rotations: Vec<usize> = self.indices_of(PlaneKind::Rotation);
        for &inversion in &inversions {
            if let Some(&rotation) = rotations.iter().find(|&&r| r < inversion) {
                return Err(StackViolation::RotationBeforeInversion { rotation, inversion });
            }
        }
        Ok(())
    }

    fn indices_of(&self, kind: PlaneKind) -> Vec<usize> {
        self.planes
            .iter()
            .enumerate()
            .filter(|(_, p)| p.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optics::pupil::analytic_pupil;

    fn entrance() -> Plane {
        Plane::pupil(
            "JWST Entrance Pupil",
            OpticalElement::EntrancePupil {
                pupil: Arc::new(analytic_pupil(16, 6.5)),
                diameter: 6.5,
            },
        )
    }

    fn detector() -> Plane {
        Plane::new(
            PlaneKind::Detector,
            "detector",
            OpticalElement::Detector {
                pixelscale: 0.031,
                fov_pixels: 161,
                oversample: 2,
            },
        )
    }

    fn inversion() -> Plane {
        Plane::new(
            PlaneKind::Inversion,
            "OTE exit pupil",
            OpticalElement::Inversion { axis: Axis::Y },
        )
    }

    #[test]
    fn test_valid_stack() {
        let stack = PlaneStack::new(vec![
            entrance(),
            inversion(),
            Plane::rotation_plane(-4.8),
            detector(),
        ]);
        assert_eq!(stack.validate(), Ok(()));
    }

    #[test]
    fn test_rotation_before_inversion_rejected() {
        let stack = PlaneStack::new(vec![
            entrance(),
            Plane::rotation_plane(3.0),
            inversion(),
            detector(),
        ]);
        assert_eq!(
            stack.validate(),
            Err(StackViolation::RotationBeforeInversion {
                rotation: 1,
                inversion: 2
            })
        );
    }

    #[test]
    fn test_detector_must_be_last() {
        let stack = PlaneStack::new(vec![entrance(), detector(), inversion()]);
        assert_eq!(stack.validate(), Err(StackViolation::DetectorNotLast));
        let stack = PlaneStack::new(vec![entrance(), inversion()]);
        assert_eq!(stack.validate(), Err(StackViolation::DetectorCount(0)));
    }

    #[test]
    fn test_compound_with_occulter_is_compact() {
        let el = OpticalElement::Compound { parts: vec![
            OpticalElement::CircularOcculter {
                radius: 2.125,
                shift: None,
            },
            OpticalElement::SquareFieldStop {
                size: 30.0,
                angle: 4.8,
                shift: None,
            },
        ] };
        assert!(el.is_compact_occulter());
        assert!(!OpticalElement::MsaOpenGrid.is_compact_occulter());
    }
}
