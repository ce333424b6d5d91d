//! File I/O for externally supplied optical data.

#[cfg(feature = "fits")]
pub mod fits;
