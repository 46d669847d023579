//! Transform PAL 2-D/3-D chroma separation.
//!
//! Frequency-domain luma/chroma separation: tile the field (or, in 3-D
//! mode, an 8-field temporal window) with a windowed FFT, gate bins by
//! similarity to their reflection about the chroma carrier, and
//! overlap-add the inverse transform back into a per-field chroma
//! buffer. The result is consumed by [`super::pal2d::PalDecoder`] the
//! same way a burst-based 2-D filter's separated chroma would be.

use std::ops::Range;

use rustfft::num_complex::Complex64;

use crate::error::{Error, Result};
use crate::field::SourceField;
use crate::fft::{self, Tile2D, Tile3D};
use crate::params::VideoParameters;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformDimensions {
    TwoD,
    ThreeD,
}

pub struct TransformPalSeparator {
    dims: TransformDimensions,
    threshold_sq: f64,
    tile2d: Option<Tile2D>,
    tile3d: Option<Tile3D>,
}

impl TransformPalSeparator {
    pub fn new(dims: TransformDimensions, threshold: f64) -> Result<Self> {
        let (tile2d, tile3d) = match dims {
            TransformDimensions::TwoD => (Some(Tile2D::new()?), None),
            TransformDimensions::ThreeD => (None, Some(Tile3D::new()?)),
        };
        Ok(TransformPalSeparator {
            dims,
            threshold_sq: threshold * threshold,
            tile2d,
            tile3d,
        })
    }

    pub fn look_behind(&self) -> usize {
        match self.dims {
            TransformDimensions::TwoD => 0,
            TransformDimensions::ThreeD => 2,
        }
    }

    pub fn look_ahead(&self) -> usize {
        match self.dims {
            TransformDimensions::TwoD => 0,
            TransformDimensions::ThreeD => 4,
        }
    }

    /// Separates chroma for the two fields of the target frame.
    /// Returns `[top_field_chroma, bottom_field_chroma]`, each sized
    /// `field_width * field_height`.
    pub fn separate(
        &mut self,
        window: &[SourceField],
        target: Range<usize>,
        params: &VideoParameters,
    ) -> Result<[Vec<f64>; 2]> {
        match self.dims {
            TransformDimensions::TwoD => self.separate_2d(window, target, params),
            TransformDimensions::ThreeD => self.separate_3d(window, target, params),
        }
    }

    fn separate_2d(
        &self,
        window: &[SourceField],
        target: Range<usize>,
        params: &VideoParameters,
    ) -> Result<[Vec<f64>; 2]> {
        if window[target.start].chroma_data.is_some() {
            return Err(Error::YcSplitIntoTransformPal);
        }
        let tile = self.tile2d.as_ref().expect("2-D tile built for TwoD mode");
        let top_is_first = window[target.start].is_first_field;
        let top = self.separate_field_2d(tile, &window[target.start], top_is_first, params);
        let bottom = self.separate_field_2d(tile, &window[target.start + 1], !top_is_first, params);
        Ok([top, bottom])
    }

    fn separate_field_2d(
        &self,
        tile: &Tile2D,
        field: &SourceField,
        is_top: bool,
        params: &VideoParameters,
    ) -> Vec<f64> {
        let mut chroma = vec![0.0; params.field_width * params.field_height];
        let window_fn = tile.window();
        for ty0 in tile_starts(params.field_height, fft::HALF_YTILE_2D) {
            for tx0 in tile_starts(params.field_width, fft::HALF_XTILE_2D) {
                let mut raw = vec![0.0; fft::XTILE_2D * fft::YTILE_2D];
                for ty in 0..fft::YTILE_2D {
                    for tx in 0..fft::XTILE_2D {
                        let value = sample_value(field, ty0 + ty as isize, tx0 + tx as isize, params, is_top);
                        raw[ty * fft::XTILE_2D + tx] = value * window_fn.at(ty, tx);
                    }
                }
                let spectrum = tile.forward(&raw);
                let mut gated = gate_2d(&spectrum, self.threshold_sq);
                let result = tile.inverse(&mut gated);
                for ty in 0..fft::YTILE_2D {
                    let field_line = ty0 + ty as isize;
                    if field_line < 0 || field_line as usize >= params.field_height {
                        continue;
                    }
                    for tx in 0..fft::XTILE_2D {
                        let sample_idx = tx0 + tx as isize;
                        if sample_idx < 0 || sample_idx as usize >= params.field_width {
                            continue;
                        }
                        if !is_active(field_line as usize, sample_idx as usize, params, is_top) {
                            continue;
                        }
                        chroma[field_line as usize * params.field_width + sample_idx as usize] +=
                            result[ty * fft::XTILE_2D + tx];
                    }
                }
            }
        }
        chroma
    }

    fn separate_3d(
        &mut self,
        window: &[SourceField],
        target: Range<usize>,
        params: &VideoParameters,
    ) -> Result<[Vec<f64>; 2]> {
        if window[target.start].chroma_data.is_some() {
            return Err(Error::YcSplitIntoTransformPal);
        }
        let tile = self.tile3d.as_ref().expect("3-D tile built for ThreeD mode");

        // Every output frame must be decoded at the same Z-position
        // within the 8-field tile: the tile always starts `look_behind`
        // frames (as fields) before the target, regardless of how much
        // further context the caller supplies.
        let behind_fields = self.look_behind() * 2;
        let z_base = target.start as isize - behind_fields as isize;
        if z_base < 0 || z_base as usize + fft::ZTILE_3D > window.len() {
            return Err(Error::Decode {
                frame: target.start,
                reason: "insufficient temporal context for 3-D transform tile".into(),
            });
        }
        let z_base = z_base as usize;

        let mut chroma_top = vec![0.0; params.field_width * params.field_height];
        let mut chroma_bottom = vec![0.0; params.field_width * params.field_height];
        let top_is_first = window[target.start].is_first_field;
        let window_fn = tile.window();

        for ty0 in tile_starts(params.field_height, fft::HALF_YTILE_3D) {
            for tx0 in tile_starts(params.field_width, fft::HALF_XTILE_3D) {
                let mut raw = vec![0.0; fft::XTILE_3D * fft::YTILE_3D * fft::ZTILE_3D];
                for z in 0..fft::ZTILE_3D {
                    let field = &window[z_base + z];
                    let is_top = field.is_first_field;
                    for ty in 0..fft::YTILE_3D {
                        for tx in 0..fft::XTILE_3D {
                            let value = sample_value(field, ty0 + ty as isize, tx0 + tx as isize, params, is_top);
                            raw[(z * fft::YTILE_3D + ty) * fft::XTILE_3D + tx] = value * window_fn.at(z, ty, tx);
                        }
                    }
                }
                let spectrum = tile.forward(&raw);
                let mut gated = gate_3d(&spectrum, self.threshold_sq);
                let result = tile.inverse(&mut gated);

                for z in 0..fft::ZTILE_3D {
                    let field_idx = z_base + z;
                    let target_slot = if field_idx == target.start {
                        Some(true)
                    } else if field_idx == target.start + 1 {
                        Some(false)
                    } else {
                        None
                    };
                    let Some(is_this_top) = target_slot.map(|is_first| is_first == top_is_first) else {
                        continue;
                    };
                    let dest = if is_this_top { &mut chroma_top } else { &mut chroma_bottom };
                    for ty in 0..fft::YTILE_3D {
                        let field_line = ty0 + ty as isize;
                        if field_line < 0 || field_line as usize >= params.field_height {
                            continue;
                        }
                        for tx in 0..fft::XTILE_3D {
                            let sample_idx = tx0 + tx as isize;
                            if sample_idx < 0 || sample_idx as usize >= params.field_width {
                                continue;
                            }
                            if !is_active(field_line as usize, sample_idx as usize, params, is_this_top) {
                                continue;
                            }
                            let idx = field_line as usize * params.field_width + sample_idx as usize;
                            dest[idx] += result[(z * fft::YTILE_3D + ty) * fft::XTILE_3D + tx];
                        }
                    }
                }
            }
        }

        Ok([chroma_top, chroma_bottom])
    }
}

fn tile_starts(len: usize, half_tile: usize) -> Vec<isize> {
    let mut starts = Vec::new();
    let mut start = -(half_tile as isize);
    while start < len as isize + half_tile as isize {
        starts.push(start);
        start += half_tile as isize;
    }
    starts
}

fn is_active(field_line: usize, sample_idx: usize, params: &VideoParameters, is_top: bool) -> bool {
    let frame_line = 2 * field_line + usize::from(!is_top);
    frame_line >= params.first_active_frame_line
        && frame_line < params.last_active_frame_line
        && sample_idx >= params.active_video_start
        && sample_idx < params.active_video_end
}

fn sample_value(field: &SourceField, field_line: isize, sample_idx: isize, params: &VideoParameters, is_top: bool) -> f64 {
    if field_line < 0
        || field_line as usize >= params.field_height
        || sample_idx < 0
        || sample_idx as usize >= params.field_width
        || !is_active(field_line as usize, sample_idx as usize, params, is_top)
    {
        return f64::from(params.black_16b_ire);
    }
    f64::from(field.data[field_line as usize * params.field_width + sample_idx as usize])
}

fn gate_2d(spectrum: &[Complex64], threshold_sq: f64) -> Vec<Complex64> {
    let mut gated = vec![Complex64::new(0.0, 0.0); spectrum.len()];
    for y in 0..fft::YCOMPLEX_2D {
        for x in 0..fft::XTILE_2D {
            let (x_ref, y_ref) = Tile2D::reflection(x, y);
            let bin = spectrum[y * fft::XTILE_2D + x];
            let reflected = spectrum[y_ref * fft::XTILE_2D + x_ref];
            if (x, y) == (x_ref, y_ref) || fft::gate_magnitude(bin, reflected, threshold_sq) {
                gated[y * fft::XTILE_2D + x] = bin;
            }
        }
    }
    gated
}

fn gate_3d(spectrum: &[Complex64], threshold_sq: f64) -> Vec<Complex64> {
    let mut gated = vec![Complex64::new(0.0, 0.0); spectrum.len()];
    for z in 0..fft::ZCOMPLEX_3D {
        for y in 0..fft::YCOMPLEX_3D {
            for x in 0..fft::XTILE_3D {
                let (x_ref, y_ref, z_ref) = Tile3D::reflection(x, y, z);
                let idx = (z * fft::YTILE_3D + y) * fft::XTILE_3D + x;
                let ref_idx = (z_ref * fft::YTILE_3D + y_ref) * fft::XTILE_3D + x_ref;
                let bin = spectrum[idx];
                let reflected = spectrum[ref_idx];
                if (x, y, z) == (x_ref, y_ref, z_ref) || fft::gate_magnitude(bin, reflected, threshold_sq) {
                    gated[idx] = bin;
                }
            }
        }
    }
    gated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::VideoSystem;

    fn params() -> VideoParameters {
        VideoParameters {
            system: VideoSystem::Pal,
            field_width: 48,
            field_height: 20,
            active_video_start: 4,
            active_video_end: 44,
            first_active_frame_line: 2,
            last_active_frame_line: 36,
            black_16b_ire: 16384,
            white_16b_ire: 54016,
            is_subcarrier_locked: true,
            is_widescreen: false,
            active_area_cropping_applied: false,
        }
    }

    #[test]
    fn black_field_separates_to_near_zero_chroma() {
        let p = params();
        let field = SourceField::black(1, true, Some(1), &p);
        let mut separator = TransformPalSeparator::new(TransformDimensions::TwoD, fft::DEFAULT_THRESHOLD).unwrap();
        let tile = separator.tile2d.as_ref().unwrap();
        let out = separator.separate_field_2d(tile, &field, true, &p);
        for &v in &out {
            assert!(v.abs() < 1e-6, "{v}");
        }
    }

    #[test]
    fn two_d_separate_produces_field_sized_buffers() {
        let p = params();
        let top = SourceField::black(1, true, Some(1), &p);
        let bottom = SourceField::black(2, false, Some(1), &p);
        let window = vec![top, bottom];
        let mut separator = TransformPalSeparator::new(TransformDimensions::TwoD, fft::DEFAULT_THRESHOLD).unwrap();
        let [t, b] = separator.separate(&window, 0..2, &p).unwrap();
        assert_eq!(t.len(), p.field_width * p.field_height);
        assert_eq!(b.len(), p.field_width * p.field_height);
    }
}
