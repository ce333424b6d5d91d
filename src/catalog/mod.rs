//! Filter and mask catalogs for each instrument family.

pub mod filters;
pub mod masks;

pub use filters::{filter_catalog, FilterCatalog, FilterEntry};
pub use masks::{is_clear, mask_names, resolve_mask, MaskEntry};
