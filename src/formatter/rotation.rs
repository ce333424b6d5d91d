//! Rotation of sky-frame PSFs into the detector frame.

use ndarray::{Array2, Zip};

/// Bilinear sample at fractional `(row, col)`; zero outside the array.
pub fn sample_bilinear(data: &Array2<f64>, row: f64, col: f64) -> f64 {
    let (rows, cols) = data.dim();
    if !(row > -1.0 && col > -1.0 && row < rows as f64 && col < cols as f64) {
        return 0.0;
    }
    let r0 = row.floor();
    let c0 = col.floor();
    let fr = row - r0;
    let fc = col - c0;
    let at = |r: f64, c: f64| -> f64 {
        if r < 0.0 || c < 0.0 || r >= rows as f64 || c >= cols as f64 {
            0.0
        } else {
            data[[r as usize, c as usize]]
        }
    };
    at(r0, c0) * (1.0 - fr) * (1.0 - fc)
        + at(r0, c0 + 1.0) * (1.0 - fr) * fc
        + at(r0 + 1.0, c0) * fr * (1.0 - fc)
        + at(r0 + 1.0, c0 + 1.0) * fr * fc
}

/// Rotate `data` counterclockwise by `angle` degrees about its center.
///
/// With `crop` the output keeps the input shape; otherwise it grows to hold
/// the whole rotated image.
pub fn rotate_image(data: &Array2<f64>, angle: f64, crop: bool) -> Array2<f64> {
    let (rows, cols) = data.dim();
    let (s, c) = angle.to_radians().sin_cos();
    let (out_rows, out_cols) = if crop {
        (rows, cols)
    } else {
        let h = (rows as f64 * c.abs() + cols as f64 * s.abs()).ceil() as usize;
        let w = (cols as f64 * c.abs() + rows as f64 * s.abs()).ceil() as usize;
        (h.max(rows), w.max(cols))
    };

    let in_center = ((rows as f64 - 1.0) / 2.0, (cols as f64 - 1.0) / 2.0);
    let out_center = ((out_rows as f64 - 1.0) / 2.0, (out_cols as f64 - 1.0) / 2.0);

    let mut out = Array2::zeros((out_rows, out_cols));
    Zip::indexed(&mut out).par_for_each(|(i, j), v| {
        let y = i as f64 - out_center.0;
        let x = j as f64 - out_center.1;
        // Inverse rotation back into the input frame
        let xs = x * c + y * s;
        let ys = -x * s + y * c;
        *v = sample_bilinear(data, ys + in_center.0, xs + in_center.1);
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_rotation_is_identity() {
        let data = Array2::from_shape_fn((9, 7), |(i, j)| (i * 7 + j) as f64);
        let out = rotate_image(&data, 0.0, true);
        for (a, b) in out.iter().zip(data.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_quarter_turn_moves_offset_pixel() {
        let mut data = Array2::zeros((11, 11));
        data[[5, 8]] = 1.0;
        let out = rotate_image(&data, 90.0, true);
        assert_relative_eq!(out[[8, 5]], 1.0, epsilon = 1e-9);
        assert_relative_eq!(out.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_uncropped_output_grows() {
        let data = Array2::ones((10, 20));
        let out = rotate_image(&data, 45.0, false);
        assert!(out.nrows() > 10 && out.ncols() > 20);
    }

    #[test]
    fn test_bilinear_midpoint() {
        let data = ndarray::array![[0.0, 2.0], [4.0, 6.0]];
        assert_relative_eq!(sample_bilinear(&data, 0.5, 0.5), 3.0);
        assert_eq!(sample_bilinear(&data, -2.0, 0.0), 0.0);
    }
}
