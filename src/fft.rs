//! Windowed-FFT core for Transform PAL's chroma separation.
//!
//! Forward/inverse 2-D (32x16) and 3-D (16x32x8) transforms over tiles
//! of the field, built separably from 1-D FFTs (row pass, column pass,
//! and for 3-D a depth pass). Each tile is windowed with a raised-cosine
//! so that two half-overlapping tiles sum to 1 and overlap-add needs no
//! inverse window. [`decoders::transform_pal`](crate::decoders::transform_pal)
//! is the consumer: it places tiles, applies the window, calls
//! [`Tile2D::forward`]/[`Tile3D::forward`], gates the spectrum, and
//! accumulates the inverse back into a chroma buffer.

use std::f64::consts::PI;
use std::sync::{Arc, Mutex, OnceLock};

use rustfft::{num_complex::Complex64, Fft, FftPlanner};

use crate::error::{Error, Result};

/// 2-D tile width (samples).
pub const XTILE_2D: usize = 32;
/// 2-D tile height (lines).
pub const YTILE_2D: usize = 16;
pub const HALF_XTILE_2D: usize = XTILE_2D / 2;
pub const HALF_YTILE_2D: usize = YTILE_2D / 2;
/// Number of distinct x bins a real-valued signal's spectrum carries.
pub const XCOMPLEX_2D: usize = XTILE_2D / 2 + 1;
pub const YCOMPLEX_2D: usize = YTILE_2D;

/// 3-D tile width (samples).
pub const XTILE_3D: usize = 16;
/// 3-D tile height (lines).
pub const YTILE_3D: usize = 32;
/// 3-D tile depth (fields).
pub const ZTILE_3D: usize = 8;
pub const HALF_XTILE_3D: usize = XTILE_3D / 2;
pub const HALF_YTILE_3D: usize = YTILE_3D / 2;
pub const HALF_ZTILE_3D: usize = ZTILE_3D / 2;
pub const XCOMPLEX_3D: usize = 9;
pub const YCOMPLEX_3D: usize = 32;
pub const ZCOMPLEX_3D: usize = 8;

/// Default bin-similarity threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.4;

/// Serializes FFT plan *construction* only; plan *execution* is
/// thread-safe and is not guarded by this. Process-wide, matching the
/// source's global FFTW planning lock even though `rustfft` itself
/// doesn't require one.
static PLAN_MUTEX: Mutex<()> = Mutex::new(());

fn planned<F>(f: F) -> Arc<dyn Fft<f64>>
where
    F: FnOnce(&mut FftPlanner<f64>) -> Arc<dyn Fft<f64>>,
{
    let _guard = PLAN_MUTEX.lock().unwrap();
    let mut planner = FftPlanner::new();
    f(&mut planner)
}

/// Symmetric raised-cosine window: `w(i, N) = 1/2 - 1/2*cos(2*pi*(i+1/2)/N)`.
pub fn raised_cosine(i: usize, n: usize) -> f64 {
    0.5 - 0.5 * (2.0 * PI * (i as f64 + 0.5) / n as f64).cos()
}

fn window_1d(n: usize) -> Vec<f64> {
    (0..n).map(|i| raised_cosine(i, n)).collect()
}

/// Precomputed separable 2-D window, `w[y][x] = wx(x) * wy(y)`.
pub struct Window2D {
    data: Vec<f64>,
}

impl Window2D {
    fn new() -> Self {
        let wx = window_1d(XTILE_2D);
        let wy = window_1d(YTILE_2D);
        let mut data = vec![0.0; XTILE_2D * YTILE_2D];
        for y in 0..YTILE_2D {
            for x in 0..XTILE_2D {
                data[y * XTILE_2D + x] = wx[x] * wy[y];
            }
        }
        Window2D { data }
    }

    #[inline]
    pub fn at(&self, y: usize, x: usize) -> f64 {
        self.data[y * XTILE_2D + x]
    }
}

/// Precomputed separable 3-D window, `w[z][y][x] = wx(x) * wy(y) * wz(z)`.
pub struct Window3D {
    data: Vec<f64>,
}

impl Window3D {
    fn new() -> Self {
        let wx = window_1d(XTILE_3D);
        let wy = window_1d(YTILE_3D);
        let wz = window_1d(ZTILE_3D);
        let mut data = vec![0.0; XTILE_3D * YTILE_3D * ZTILE_3D];
        for z in 0..ZTILE_3D {
            for y in 0..YTILE_3D {
                for x in 0..XTILE_3D {
                    data[(z * YTILE_3D + y) * XTILE_3D + x] = wx[x] * wy[y] * wz[z];
                }
            }
        }
        Window3D { data }
    }

    #[inline]
    pub fn at(&self, z: usize, y: usize, x: usize) -> f64 {
        self.data[(z * YTILE_3D + y) * XTILE_3D + x]
    }
}

fn global_window_2d() -> &'static Window2D {
    static WINDOW: OnceLock<Window2D> = OnceLock::new();
    WINDOW.get_or_init(Window2D::new)
}

fn global_window_3d() -> &'static Window3D {
    static WINDOW: OnceLock<Window3D> = OnceLock::new();
    WINDOW.get_or_init(Window3D::new)
}

/// A reusable 2-D forward/inverse transform over `XTILE_2D x YTILE_2D`
/// tiles, built from two 1-D FFT passes (row, then column).
pub struct Tile2D {
    x_fwd: Arc<dyn Fft<f64>>,
    x_inv: Arc<dyn Fft<f64>>,
    y_fwd: Arc<dyn Fft<f64>>,
    y_inv: Arc<dyn Fft<f64>>,
}

impl Tile2D {
    /// Builds forward/inverse plans. Plan construction is serialized
    /// process-wide.
    pub fn new() -> Result<Self> {
        let x_fwd = planned(|p| p.plan_fft_forward(XTILE_2D));
        let x_inv = planned(|p| p.plan_fft_inverse(XTILE_2D));
        let y_fwd = planned(|p| p.plan_fft_forward(YTILE_2D));
        let y_inv = planned(|p| p.plan_fft_inverse(YTILE_2D));
        Ok(Tile2D {
            x_fwd,
            x_inv,
            y_fwd,
            y_inv,
        })
    }

    pub fn window(&self) -> &'static Window2D {
        global_window_2d()
    }

    /// Forward real-to-complex transform of a windowed `YTILE_2D x XTILE_2D`
    /// tile (row-major, `tile[y*XTILE_2D+x]`).
    pub fn forward(&self, tile: &[f64]) -> Vec<Complex64> {
        debug_assert_eq!(tile.len(), XTILE_2D * YTILE_2D);
        let mut buf: Vec<Complex64> = tile.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        for row in buf.chunks_mut(XTILE_2D) {
            self.x_fwd.process(row);
        }
        transpose_apply(&mut buf, YTILE_2D, XTILE_2D, &self.y_fwd);
        buf
    }

    /// Inverse transform; returns the real part, normalized by tile volume.
    pub fn inverse(&self, spectrum: &mut [Complex64]) -> Vec<f64> {
        debug_assert_eq!(spectrum.len(), XTILE_2D * YTILE_2D);
        transpose_apply(spectrum, YTILE_2D, XTILE_2D, &self.y_inv);
        for row in spectrum.chunks_mut(XTILE_2D) {
            self.x_inv.process(row);
        }
        let scale = 1.0 / (XTILE_2D * YTILE_2D) as f64;
        spectrum.iter().map(|c| c.re * scale).collect()
    }

    /// Reflection bin of `(x, y)` for the 2-D case.
    pub fn reflection(x: usize, y: usize) -> (usize, usize) {
        let x_ref = reflect(HALF_XTILE_2D as isize - x as isize, XTILE_2D);
        let y_ref = reflect(HALF_YTILE_2D as isize - y as isize, YTILE_2D);
        (x_ref, y_ref)
    }
}

/// A reusable 3-D forward/inverse transform over `XTILE_3D x YTILE_3D x
/// ZTILE_3D` tiles, built from three 1-D FFT passes (row, column, depth).
pub struct Tile3D {
    x_fwd: Arc<dyn Fft<f64>>,
    x_inv: Arc<dyn Fft<f64>>,
    y_fwd: Arc<dyn Fft<f64>>,
    y_inv: Arc<dyn Fft<f64>>,
    z_fwd: Arc<dyn Fft<f64>>,
    z_inv: Arc<dyn Fft<f64>>,
}

impl Tile3D {
    pub fn new() -> Result<Self> {
        let x_fwd = planned(|p| p.plan_fft_forward(XTILE_3D));
        let x_inv = planned(|p| p.plan_fft_inverse(XTILE_3D));
        let y_fwd = planned(|p| p.plan_fft_forward(YTILE_3D));
        let y_inv = planned(|p| p.plan_fft_inverse(YTILE_3D));
        let z_fwd = planned(|p| p.plan_fft_forward(ZTILE_3D));
        let z_inv = planned(|p| p.plan_fft_inverse(ZTILE_3D));
        Ok(Tile3D {
            x_fwd,
            x_inv,
            y_fwd,
            y_inv,
            z_fwd,
            z_inv,
        })
    }

    pub fn window(&self) -> &'static Window3D {
        global_window_3d()
    }

    /// Forward transform of a windowed `ZTILE_3D x YTILE_3D x XTILE_3D`
    /// tile (`tile[(z*YTILE_3D+y)*XTILE_3D+x]`).
    pub fn forward(&self, tile: &[f64]) -> Vec<Complex64> {
        debug_assert_eq!(tile.len(), XTILE_3D * YTILE_3D * ZTILE_3D);
        let mut buf: Vec<Complex64> = tile.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        for plane in buf.chunks_mut(XTILE_3D * YTILE_3D) {
            for row in plane.chunks_mut(XTILE_3D) {
                self.x_fwd.process(row);
            }
            transpose_apply(plane, YTILE_3D, XTILE_3D, &self.y_fwd);
        }
        transpose_apply(&mut buf, ZTILE_3D, XTILE_3D * YTILE_3D, &self.z_fwd);
        buf
    }

    pub fn inverse(&self, spectrum: &mut [Complex64]) -> Vec<f64> {
        debug_assert_eq!(spectrum.len(), XTILE_3D * YTILE_3D * ZTILE_3D);
        transpose_apply(spectrum, ZTILE_3D, XTILE_3D * YTILE_3D, &self.z_inv);
        for plane in spectrum.chunks_mut(XTILE_3D * YTILE_3D) {
            transpose_apply(plane, YTILE_3D, XTILE_3D, &self.y_inv);
            for row in plane.chunks_mut(XTILE_3D) {
                self.x_inv.process(row);
            }
        }
        let scale = 1.0 / (XTILE_3D * YTILE_3D * ZTILE_3D) as f64;
        spectrum.iter().map(|c| c.re * scale).collect()
    }

    /// Reflection bin of `(x, y, z)` for the 3-D case.
    ///
    /// The z reflection intentionally uses `ZTILE/4` rather than the
    /// theoretically-expected `6*ZTILE/8`; this mirrors a known-dubious
    /// index in the source decoder and is preserved as-is, not "fixed".
    pub fn reflection(x: usize, y: usize, z: usize) -> (usize, usize, usize) {
        let x_ref = reflect(HALF_XTILE_3D as isize - x as isize, XTILE_3D);
        let y_ref = reflect((YTILE_3D / 4) as isize - y as isize, YTILE_3D);
        let z_ref = reflect((ZTILE_3D / 4) as isize - z as isize, ZTILE_3D);
        (x_ref, y_ref, z_ref)
    }
}

fn reflect(value: isize, modulus: usize) -> usize {
    value.rem_euclid(modulus as isize) as usize
}

/// Applies `fft` along the second axis of a row-major `outer x inner`
/// buffer by gathering/scattering through a temporary column buffer
/// (a manual transpose-apply-transpose, since `rustfft` only operates
/// on contiguous slices).
fn transpose_apply(buf: &mut [Complex64], outer: usize, inner: usize, fft: &Arc<dyn Fft<f64>>) {
    let mut column = vec![Complex64::new(0.0, 0.0); outer];
    for x in 0..inner {
        for y in 0..outer {
            column[y] = buf[y * inner + x];
        }
        fft.process(&mut column);
        for y in 0..outer {
            buf[y * inner + x] = column[y];
        }
    }
}

/// Bin-similarity gate: a bin and its reflection are both kept iff
/// each squared magnitude is within `threshold` of the
/// other; self-reflective bins (subcarrier itself) are always kept.
/// All bins not selected by `considered` are zeroed by the caller
/// before calling `inverse`.
pub fn gate_magnitude(in_bin: Complex64, ref_bin: Complex64, threshold_sq: f64) -> bool {
    let mag_in = in_bin.norm_sqr();
    let mag_ref = ref_bin.norm_sqr();
    mag_in >= mag_ref * threshold_sq && mag_ref >= mag_in * threshold_sq
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_sums_to_one_across_half_overlap() {
        let w = window_1d(YTILE_2D);
        for i in 0..HALF_YTILE_2D {
            let sum = w[i] + w[i + HALF_YTILE_2D];
            assert!((sum - 1.0).abs() < 1e-9, "i={i} sum={sum}");
        }
    }

    #[test]
    fn tile2d_round_trips_dc_component() {
        let tile2d = Tile2D::new().unwrap();
        let tile = vec![1.0; XTILE_2D * YTILE_2D];
        let mut spectrum = tile2d.forward(&tile);
        // DC bin (0,0) should carry the whole sum; everything else ~0.
        let dc = spectrum[0];
        assert!((dc.re - (XTILE_2D * YTILE_2D) as f64).abs() < 1e-6, "{:?}", dc);
        let back = tile2d.inverse(&mut spectrum);
        for v in back {
            assert!((v - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn tile3d_round_trips_dc_component() {
        let tile3d = Tile3D::new().unwrap();
        let tile = vec![2.0; XTILE_3D * YTILE_3D * ZTILE_3D];
        let mut spectrum = tile3d.forward(&tile);
        let back = tile3d.inverse(&mut spectrum);
        for v in back {
            assert!((v - 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn reflection_2d_self_reflective_at_carrier() {
        // x = HALFXTILE/2... just check the identity for x=HALFXTILE_2D (where reflection wraps to 0)
        let (x_ref, _) = Tile2D::reflection(HALF_XTILE_2D, 0);
        assert_eq!(x_ref, 0);
    }

    #[test]
    fn gate_keeps_similar_magnitudes() {
        let a = Complex64::new(10.0, 0.0);
        let b = Complex64::new(9.0, 0.0);
        assert!(gate_magnitude(a, b, 0.4));
    }

    #[test]
    fn gate_rejects_dissimilar_magnitudes() {
        let a = Complex64::new(100.0, 0.0);
        let b = Complex64::new(1.0, 0.0);
        assert!(!gate_magnitude(a, b, 0.4));
    }
}
