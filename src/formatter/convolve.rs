//! 2D convolution for the detector-effect kernels, with optional rayon
//! parallelism.

use ndarray::{Array2, Zip};
use num_traits::Float;

/// Options for controlling the convolution operation
#[derive(Debug, Clone, Copy)]
pub struct ConvolveOptions {
    /// Whether to use parallel processing with rayon
    pub parallel: bool,

    /// Controls how edges are handled
    pub edge_mode: EdgeMode,
}

impl Default for ConvolveOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            edge_mode: EdgeMode::Constant(0.0),
        }
    }
}

/// Edge handling modes for convolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeMode {
    /// Uses a constant value for pixels outside image bounds
    Constant(f64),

    /// Reflects the image at the edges
    Reflect,

    /// Extends the edge pixels outward
    Extend,
}

/// Convolve a 2D array with a kernel, keeping the input size.
///
/// The kernel center is at `(rows / 2, cols / 2)`; the kernel is flipped so
/// asymmetric kernels shift flux in the direction they point.
pub fn convolve2d<T>(input: &Array2<T>, kernel: &Array2<T>, options: ConvolveOptions) -> Array2<T>
where
    T: Float + Send + Sync,
{
    let mut output = Array2::zeros(input.dim());
    if input.is_empty() || kernel.is_empty() {
        return output;
    }

    let pixel = |(i, j): (usize, usize)| accumulate(input, kernel, i, j, options.edge_mode);
    if options.parallel {
        Zip::indexed(&mut output).par_for_each(|idx, out| *out = pixel(idx));
    } else {
        Zip::indexed(&mut output).for_each(|idx, out| *out = pixel(idx));
    }
    output
}

fn accumulate<T: Float>(
    input: &Array2<T>,
    kernel: &Array2<T>,
    i: usize,
    j: usize,
    edge_mode: EdgeMode,
) -> T {
    let (rows, cols) = input.dim();
    let (kernel_rows, kernel_cols) = kernel.dim();
    let kr = (kernel_rows / 2) as isize;
    let kc = (kernel_cols / 2) as isize;

    let mut sum = T::zero();
    for ki in 0..kernel_rows {
        for kj in 0..kernel_cols {
            let ii = i as isize - (ki as isize - kr);
            let jj = j as isize - (kj as isize - kc);
            if let Some(value) = get_pixel(input, ii, jj, rows, cols, edge_mode) {
                sum = sum + value * kernel[[ki, kj]];
            }
        }
    }
    sum
}

// Pixel value with edge handling; `None` contributes nothing.
fn get_pixel<T: Float>(
    input: &Array2<T>,
    i: isize,
    j: isize,
    rows: usize,
    cols: usize,
    edge_mode: EdgeMode,
) -> Option<T> {
    if i >= 0 && i < rows as isize && j >= 0 && j < cols as isize {
        return Some(input[[i as usize, j as usize]]);
    }

    match edge_mode {
        EdgeMode::Constant(value) => num_traits::cast(value),
        EdgeMode::Reflect => {
            let ri = reflect_index(i, rows as isize);
            let rj = reflect_index(j, cols as isize);
            Some(input[[ri as usize, rj as usize]])
        }
        EdgeMode::Extend => {
            let ei = i.clamp(0, rows as isize - 1);
            let ej = j.clamp(0, cols as isize - 1);
            Some(input[[ei as usize, ej as usize]])
        }
    }
}

fn reflect_index(idx: isize, size: isize) -> isize {
    let reflected = if idx < 0 {
        -idx - 1
    } else if idx >= size {
        2 * size - idx - 1
    } else {
        idx
    };
    reflected.clamp(0, size - 1)
}

/// Odd kernel side covering `extent` sigma on each side of the center.
fn kernel_side(sigma: f64, extent: f64) -> usize {
    let half = (sigma * extent).ceil().max(1.0) as usize;
    2 * half + 1
}

// Gaussian exponent along one axis; zero sigma collapses to a delta.
fn axis_exponent(offset: f64, sigma: f64) -> f64 {
    if sigma > 0.0 {
        offset * offset / (2.0 * sigma * sigma)
    } else if offset == 0.0 {
        0.0
    } else {
        f64::INFINITY
    }
}

/// Normalized elliptical Gaussian kernel; sigmas in pixels.
pub fn gaussian_kernel(sigma_x: f64, sigma_y: f64) -> Array2<f64> {
    let rows = kernel_side(sigma_y, 4.0);
    let cols = kernel_side(sigma_x, 4.0);
    let (cy, cx) = ((rows / 2) as f64, (cols / 2) as f64);
    let mut kernel = Array2::from_shape_fn((rows, cols), |(i, j)| {
        let x = j as f64 - cx;
        let y = i as f64 - cy;
        let gx = axis_exponent(x, sigma_x);
        let gy = axis_exponent(y, sigma_y);
        (-(gx + gy)).exp()
    });
    normalize(&mut kernel);
    kernel
}

/// Normalized single-row kernel of `length` pixels at `angle` degrees
/// counterclockwise from +X. The side is always odd.
pub fn line_kernel(length: f64, angle: f64) -> Array2<f64> {
    let half = (length / 2.0).ceil().max(0.0) as usize;
    let side = 2 * half + 1;
    let (s, c) = angle.to_radians().sin_cos();
    let mut kernel = Array2::zeros((side, side));
    let samples = (side * 4).max(1);
    for k in 0..=samples {
        let t = (k as f64 / samples as f64 - 0.5) * length;
        let col = (half as f64 + t * c).round();
        let row = (half as f64 + t * s).round();
        if (0.0..side as f64).contains(&col) && (0.0..side as f64).contains(&row) {
            kernel[[row as usize, col as usize]] = 1.0;
        }
    }
    normalize(&mut kernel);
    kernel
}

/// Normalized box of `width` pixels along X.
pub fn box_kernel_x(width: f64) -> Array2<f64> {
    let half = ((width - 1.0) / 2.0).ceil().max(0.0) as usize;
    let side = 2 * half + 1;
    let mut kernel = Array2::from_shape_fn((1, side), |(_, j)| {
        let d = (j as f64 - half as f64).abs();
        // Fractional coverage of the outermost pixels
        (width / 2.0 - d + 0.5).clamp(0.0, 1.0)
    });
    normalize(&mut kernel);
    kernel
}

fn normalize(kernel: &mut Array2<f64>) {
    let sum = kernel.sum();
    if sum > 0.0 {
        kernel.mapv_inplace(|v| v / sum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_identity_kernel() {
        let image = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
        let kernel = array![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]];
        let result = convolve2d(&image, &kernel, ConvolveOptions::default());
        assert_eq!(result, image);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let image = Array2::from_shape_fn((17, 13), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let kernel = gaussian_kernel(1.3, 0.7);
        let serial = convolve2d(
            &image,
            &kernel,
            ConvolveOptions {
                parallel: false,
                edge_mode: EdgeMode::Reflect,
            },
        );
        let parallel = convolve2d(
            &image,
            &kernel,
            ConvolveOptions {
                parallel: true,
                edge_mode: EdgeMode::Reflect,
            },
        );
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_flux_preserved_away_from_edges() {
        let mut image = Array2::zeros((31, 31));
        image[[15, 15]] = 1.0;
        let result = convolve2d(&image, &gaussian_kernel(2.0, 2.0), ConvolveOptions::default());
        assert_relative_eq!(result.sum(), 1.0, epsilon = 1e-12);
        assert!(result[[15, 15]] < 1.0);
    }

    #[test]
    fn test_kernels_are_normalized_and_odd() {
        for kernel in [gaussian_kernel(0.5, 3.0), line_kernel(6.0, 30.0), box_kernel_x(3.4)] {
            assert_relative_eq!(kernel.sum(), 1.0, epsilon = 1e-12);
            assert_eq!(kernel.nrows() % 2, 1);
            assert_eq!(kernel.ncols() % 2, 1);
        }
        let line = line_kernel(4.0, 0.0);
        assert_eq!(line.row(2).iter().filter(|&&v| v > 0.0).count(), 5);
    }
}
