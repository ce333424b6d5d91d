//! JWST-class instrument configuration and optical plane assembly
//!
//! This crate models the configurable state of the five JWST science
//! instruments (filters, masks, detectors and apertures), assembles the ordered
//! optical plane stack a Fourier propagation engine consumes, and applies the
//! post-propagation detector effects to computed PSF images.

pub mod catalog;
pub mod config;
pub mod error;
pub mod family;
pub mod formatter;
pub mod geometry;
pub mod instrument;
pub mod io;
pub mod optics;

// Re-exports for easier access
pub use config::{CalcOptions, InstrumentConfig, ObservingMode};
pub use error::{OpticsError, Result, ValidationError};
pub use family::{Family, FamilyOptics};
pub use formatter::{format_output, Extension, PsfResult};
pub use geometry::{GeometryCache, GeometryTable};
pub use instrument::Instrument;
pub use optics::{assemble, AssemblyMetadata, AssemblyRequest, PlaneStack};
