//! Coordinate reference data: apertures, per-instrument tables and the table cache.

pub mod aperture;
pub mod builtin;
pub mod cache;
pub mod detector_geometry;
pub mod table;

pub use aperture::{Aperture, ApertureKind, SciDistortion};
pub use cache::{BuiltinGeometry, GeometryCache, GeometrySource, JsonGeometryDir};
pub use detector_geometry::DetectorGeometry;
pub use table::GeometryTable;
