//! Optical planes and their assembly into a propagation-ready stack.

pub mod aberration;
pub mod assembler;
pub mod plane;
pub mod pupil;
pub mod segment;

pub use aberration::WfeKind;
pub use assembler::{assemble, AssemblyMetadata, AssemblyRequest, Defocus, WfeEntry};
pub use plane::{OpticalElement, Plane, PlaneKind, PlaneStack, PropagationMode, SourceOffset};
pub use pupil::{OpdSource, PupilMap, PupilSource};
pub use segment::{one_segment_pupil, segment_name};
