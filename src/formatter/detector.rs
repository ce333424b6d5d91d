//! Empirical detector effects applied to formatted PSFs.
//!
//! All kernels are normalized so total flux is preserved away from the stamp
//! edges.

use ndarray::{s, Array2};

use super::convolve::{box_kernel_x, convolve2d, gaussian_kernel, ConvolveOptions, EdgeMode};
use crate::family::IfuBroadening;

fn options() -> ConvolveOptions {
    ConvolveOptions {
        parallel: true,
        edge_mode: EdgeMode::Constant(0.0),
    }
}

/// Gaussian charge diffusion; `sigma` and `pixel_scale` in arcsec.
pub fn apply_charge_diffusion(data: &Array2<f64>, sigma: f64, pixel_scale: f64) -> Array2<f64> {
    if sigma <= 0.0 || pixel_scale <= 0.0 {
        return data.clone();
    }
    let sigma_pix = sigma / pixel_scale;
    convolve2d(data, &gaussian_kernel(sigma_pix, sigma_pix), options())
}

/// 3×3 interpixel capacitance kernel with nearest-neighbour coupling `alpha`
/// and diagonal coupling `beta`, stretched to `oversample` subpixels per
/// detector pixel.
pub fn ipc_kernel(alpha: f64, beta: f64, oversample: u32) -> Array2<f64> {
    let step = oversample.max(1) as usize;
    let side = 2 * step + 1;
    let mut kernel = Array2::zeros((side, side));
    let c = step;
    kernel[[c, c]] = 1.0 - 4.0 * alpha - 4.0 * beta;
    for (di, dj) in [(0, 1), (1, 0), (0, -1), (-1, 0)] {
        kernel[[offset(c, di, step), offset(c, dj, step)]] = alpha;
    }
    for (di, dj) in [(1, 1), (1, -1), (-1, 1), (-1, -1)] {
        kernel[[offset(c, di, step), offset(c, dj, step)]] = beta;
    }
    kernel
}

fn offset(center: usize, direction: isize, step: usize) -> usize {
    (center as isize + direction * step as isize) as usize
}

pub fn apply_ipc(data: &Array2<f64>, alpha: f64, beta: f64, oversample: u32) -> Array2<f64> {
    convolve2d(data, &ipc_kernel(alpha, beta, oversample), options())
}

/// Post-pixel coupling: a fraction `ppc` of each pixel's charge leaks one
/// detector pixel along the fast-read (+X) direction.
pub fn apply_ppc(data: &Array2<f64>, ppc: f64, oversample: u32) -> Array2<f64> {
    let step = oversample.max(1) as usize;
    let mut kernel = Array2::zeros((1, 2 * step + 1));
    kernel[[0, step]] = 1.0 - ppc;
    kernel[[0, 2 * step]] = ppc;
    convolve2d(data, &kernel, options())
}

/// Fraction of MIRI imager flux in the cross-shaped scattering artifact.
pub fn cruciform_amplitude(wavelength_um: f64) -> f64 {
    if wavelength_um >= 21.0 {
        return 0.0;
    }
    (0.18 * (-(wavelength_um - 5.6).max(0.0) / 4.0).exp()).clamp(0.0, 0.18)
}

/// MIRI Si:As internal scattering: a share of the flux is redistributed along
/// the detector rows and columns with an exponential profile.
pub fn apply_cruciform(data: &Array2<f64>, wavelength_um: f64, pixel_scale: f64) -> Array2<f64> {
    let amplitude = cruciform_amplitude(wavelength_um);
    if amplitude <= 0.0 || pixel_scale <= 0.0 {
        return data.clone();
    }
    // Exponential scale length of the arms, arcsec
    let length_pix = 1.9 * wavelength_um / 5.6 / pixel_scale;
    let half = ((length_pix * 4.0).ceil() as usize).min(data.ncols().max(data.nrows()));
    let mut arm = Array2::from_shape_fn((1, 2 * half + 1), |(_, j)| {
        (-(j as f64 - half as f64).abs() / length_pix.max(1e-6)).exp()
    });
    let total = arm.sum();
    arm.mapv_inplace(|v| v / total);

    let horizontal = convolve2d(data, &arm, options());
    let vertical = convolve2d(data, &arm.t().to_owned(), options());
    let mut out = data * (1.0 - amplitude);
    out.scaled_add(amplitude / 2.0, &horizontal);
    out.scaled_add(amplitude / 2.0, &vertical);
    out
}

/// IFU spatial broadening; `pixel_scale` in arcsec for the sampled stamp.
pub fn apply_ifu_broadening(
    data: &Array2<f64>,
    model: IfuBroadening,
    pixel_scale: f64,
) -> Array2<f64> {
    if pixel_scale <= 0.0 {
        return data.clone();
    }
    let kernel = match model {
        IfuBroadening::SliceBox { width } => box_kernel_x(width / pixel_scale),
        IfuBroadening::Gaussian { sigma_x, sigma_y } => {
            gaussian_kernel(sigma_x / pixel_scale, sigma_y / pixel_scale)
        }
    };
    convolve2d(data, &kernel, options())
}

/// Sum `factor × factor` blocks; trailing rows and columns that do not fill a
/// block are dropped.
pub fn block_sum(data: &Array2<f64>, factor: u32) -> Array2<f64> {
    let f = factor.max(1) as usize;
    let (rows, cols) = (data.nrows() / f, data.ncols() / f);
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        data.slice(s![i * f..(i + 1) * f, j * f..(j + 1) * f]).sum()
    })
}
