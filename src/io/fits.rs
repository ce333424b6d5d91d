//! FITS image reading for pupil and OPD maps.
//!
//! Images are returned in ndarray (row 0 at top) order, flipped vertically from
//! the FITS convention where the first row is at the bottom.

use std::path::Path;

use fitsio::hdu::HduInfo;
use fitsio::FitsFile;
use ndarray::{s, Array2, Array3};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitsError {
    #[error("FITS I/O error: {0}")]
    FitsIo(#[from] fitsio::errors::Error),
    #[error("HDU {0} is not an image")]
    NotAnImage(usize),
    #[error("Invalid image shape: {0}")]
    InvalidShape(String),
}

/// Read the primary image of a FITS file. Data cubes return plane `slice`
/// (0 when not given).
pub fn read_image_plane<P: AsRef<Path>>(
    path: P,
    slice: Option<usize>,
) -> Result<Array2<f64>, FitsError> {
    let mut fptr = FitsFile::open(path.as_ref())?;
    let hdu = fptr.primary_hdu()?;
    let shape = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => shape.clone(),
        _ => return Err(FitsError::NotAnImage(0)),
    };
    let data: Vec<f64> = hdu.read_image(&mut fptr)?;

    let plane = match shape.as_slice() {
        [ny, nx] => Array2::from_shape_vec((*ny, *nx), data)
            .map_err(|e| FitsError::InvalidShape(e.to_string()))?,
        [nz, ny, nx] => {
            let index = slice.unwrap_or(0);
            if index >= *nz {
                return Err(FitsError::InvalidShape(format!(
                    "slice {index} requested from cube of depth {nz}"
                )));
            }
            let cube = Array3::from_shape_vec((*nz, *ny, *nx), data)
                .map_err(|e| FitsError::InvalidShape(e.to_string()))?;
            cube.slice(s![index, .., ..]).to_owned()
        }
        other => return Err(FitsError::InvalidShape(format!("{other:?}"))),
    };

    Ok(plane.slice(s![..;-1, ..]).to_owned())
}

/// Read a floating-point header keyword from the primary HDU, if present.
pub fn read_primary_key<P: AsRef<Path>>(path: P, key: &str) -> Result<Option<f64>, FitsError> {
    let mut fptr = FitsFile::open(path.as_ref())?;
    let hdu = fptr.primary_hdu()?;
    Ok(hdu.read_key::<f64>(&mut fptr, key).ok())
}
