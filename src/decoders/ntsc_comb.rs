//! NTSC comb filter: 1-D / 2-D / 3-D adaptive chroma separation
//! exploiting NTSC's line-to-line subcarrier phase inversion.

use std::ops::Range;

use crate::error::{Error, Result};
use crate::field::{self, SourceField};
use crate::fir::{self, carrier_tables, SUBCARRIER_SAMPLES_PER_CYCLE};
use crate::frame::ComponentFrame;
use crate::params::VideoParameters;

/// Number of samples representing a quarter subcarrier cycle, used as
/// the 1-D comb's predictor offset (half a cycle either side of the
/// predicted luma sample).
const HALF_CYCLE_SAMPLES: usize = (SUBCARRIER_SAMPLES_PER_CYCLE / 2.0) as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombDimensions {
    OneD,
    TwoD,
    ThreeD { adaptive: bool },
}

#[derive(Debug, Clone)]
pub struct NtscCombConfig {
    pub dimensions: CombDimensions,
    pub chroma_gain: f64,
    pub chroma_phase_deg: f64,
    pub phase_compensation: bool,
    pub luma_nr: f64,
    pub chroma_nr: f64,
}

impl Default for NtscCombConfig {
    fn default() -> Self {
        NtscCombConfig {
            dimensions: CombDimensions::TwoD,
            chroma_gain: 1.0,
            chroma_phase_deg: 0.0,
            phase_compensation: false,
            luma_nr: 0.0,
            chroma_nr: 0.0,
        }
    }
}

pub struct NtscCombDecoder {
    params: VideoParameters,
    config: NtscCombConfig,
    cos_table: Vec<f64>,
    sin_table: Vec<f64>,
}

impl NtscCombDecoder {
    pub fn new(params: VideoParameters, config: NtscCombConfig) -> Result<Self> {
        let (cos_table, sin_table) =
            carrier_tables(params.field_width, SUBCARRIER_SAMPLES_PER_CYCLE);
        Ok(NtscCombDecoder {
            params,
            config,
            cos_table,
            sin_table,
        })
    }

    pub fn look_behind(&self) -> usize {
        match self.config.dimensions {
            CombDimensions::ThreeD { .. } => 1,
            _ => 0,
        }
    }

    pub fn look_ahead(&self) -> usize {
        match self.config.dimensions {
            CombDimensions::ThreeD { .. } => 2,
            _ => 0,
        }
    }

    /// Decodes one frame. `target` indexes the two fields within
    /// `window` that belong to the output frame; for 3-D mode, the
    /// frames immediately surrounding `target` (in units of 2 fields)
    /// supply temporal candidates.
    pub fn decode_frame(&mut self, window: &[SourceField], target: Range<usize>) -> Result<ComponentFrame> {
        if target.len() != 2 {
            return Err(Error::Decode {
                frame: target.start,
                reason: "target range must name exactly two fields".into(),
            });
        }
        let (top, bottom) = field::split_top_bottom(&window[target.clone()])?;
        let mut frame = ComponentFrame::new_black(&self.params);

        for frame_line in self.params.first_active_frame_line..self.params.last_active_frame_line {
            let (field, line_in_field) = field::frame_line_source(top, bottom, frame_line);
            let composite = composite_line_f64(field, line_in_field, self.params.field_width);

            let chroma = match self.config.dimensions {
                CombDimensions::OneD => self.comb_1d(&composite),
                CombDimensions::TwoD => self.comb_2d(window, target.clone(), frame_line, &composite),
                CombDimensions::ThreeD { adaptive } => {
                    self.comb_3d(window, target.clone(), frame_line, &composite, adaptive)
                }
            };

            let mut luma: Vec<f64> = composite
                .iter()
                .zip(chroma.iter())
                .map(|(&c, &ch)| c - ch)
                .collect();

            if self.config.luma_nr > 0.0 {
                apply_nr(&mut luma, self.config.luma_nr, self.params.ire_gain());
            }

            let (mut u_line, mut v_line) = self.demodulate(&chroma, frame_line, field.field_phase_id);
            if self.config.chroma_nr > 0.0 {
                apply_nr(&mut u_line, self.config.chroma_nr, self.params.ire_gain());
                apply_nr(&mut v_line, self.config.chroma_nr, self.params.ire_gain());
            }
            rotate_gain_phase(&mut u_line, &mut v_line, self.config.chroma_gain, self.config.chroma_phase_deg);

            write_active_line(
                &mut frame,
                &self.params,
                frame_line,
                &luma,
                &u_line,
                &v_line,
            );
        }

        Ok(frame)
    }

    fn comb_1d(&self, composite: &[f64]) -> Vec<f64> {
        let n = composite.len();
        let mut chroma = vec![0.0; n];
        for x in 0..n {
            let left = x.checked_sub(HALF_CYCLE_SAMPLES).map(|i| composite[i]);
            let right = if x + HALF_CYCLE_SAMPLES < n {
                Some(composite[x + HALF_CYCLE_SAMPLES])
            } else {
                None
            };
            let predicted_luma = match (left, right) {
                (Some(l), Some(r)) => 0.5 * (l + r),
                (Some(l), None) => l,
                (None, Some(r)) => r,
                (None, None) => composite[x],
            };
            chroma[x] = composite[x] - predicted_luma;
        }
        chroma
    }

    fn comb_2d(
        &self,
        window: &[SourceField],
        target: Range<usize>,
        frame_line: usize,
        composite: &[f64],
    ) -> Vec<f64> {
        let n = composite.len();
        if frame_line < 2 {
            // No same-parity line two rows up; fall back to the 1-D predictor.
            return self.comb_1d(composite);
        }
        let (top, bottom) = match field::split_top_bottom(&window[target]) {
            Ok(v) => v,
            Err(_) => return self.comb_1d(composite),
        };
        let (field_above, line_above) = field::frame_line_source(top, bottom, frame_line - 2);
        let above = composite_line_f64(field_above, line_above, n);
        composite.iter().zip(above.iter()).map(|(&a, &b)| 0.5 * (a - b)).collect()
    }

    fn comb_3d(
        &self,
        window: &[SourceField],
        target: Range<usize>,
        frame_line: usize,
        composite: &[f64],
        adaptive: bool,
    ) -> Vec<f64> {
        let candidate_2d = self.comb_2d(window, target.clone(), frame_line, composite);
        if !adaptive {
            return candidate_2d;
        }

        let prev_frame_same_line = temporal_candidate(window, target.clone(), frame_line, -1, self.params.field_width);
        let next_frame_same_line = temporal_candidate(window, target.clone(), frame_line, 1, self.params.field_width);

        let n = composite.len();
        let mut out = vec![0.0; n];
        for x in 0..n {
            let candidates = [
                (candidate_2d[x], 0usize),
                (prev_frame_same_line.as_ref().map(|v| v[x]).unwrap_or(candidate_2d[x]), 1usize),
                (next_frame_same_line.as_ref().map(|v| v[x]).unwrap_or(candidate_2d[x]), 2usize),
            ];
            let reference = composite[x];
            let mut best_penalty = f64::INFINITY;
            let mut best_value = candidate_2d[x];
            for &(value, source) in &candidates {
                let mut penalty = neighborhood_penalty(composite, x, value, reference);
                if self.config.phase_compensation {
                    penalty += phase_penalty(frame_line, source);
                }
                // Ties favor the 2-D candidate (source == 0), which is
                // listed first and therefore wins on `<` (not `<=`).
                if penalty < best_penalty {
                    best_penalty = penalty;
                    best_value = value;
                }
            }
            out[x] = best_value;
        }
        out
    }

    fn demodulate(&self, chroma: &[f64], frame_line: usize, field_phase_id: Option<u8>) -> (Vec<f64>, Vec<f64>) {
        let sign = line_phase_sign(field_phase_id, frame_line);
        let mut u = vec![0.0; chroma.len()];
        let mut v = vec![0.0; chroma.len()];
        for x in 0..chroma.len() {
            u[x] = chroma[x] * self.cos_table[x];
            v[x] = chroma[x] * self.sin_table[x] * sign;
        }
        // Split-IQ low-pass: a short symmetric FIR smooths the raw
        // product before it is treated as a baseband chroma sample.
        let taps = [0.5, 0.25];
        let mut u_lp = vec![0.0; u.len()];
        let mut v_lp = vec![0.0; v.len()];
        fir::apply(&u, &mut u_lp, &taps);
        fir::apply(&v, &mut v_lp, &taps);
        (u_lp, v_lp)
    }
}

/// NTSC's subcarrier phase inverts every line, but which absolute
/// phase a field's first active line starts at is a property of the
/// field itself, not of `frame_line` alone; `field_phase_id` anchors
/// that starting phase so the same `frame_line` resolves to a
/// consistent sign across fields instead of assuming every field
/// starts on the same parity.
fn line_phase_sign(field_phase_id: Option<u8>, frame_line: usize) -> f64 {
    let anchor = field_phase_id.unwrap_or(1) as usize;
    if (anchor + frame_line) % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

fn temporal_candidate(
    window: &[SourceField],
    target: Range<usize>,
    frame_line: usize,
    frame_offset: isize,
    width: usize,
) -> Option<Vec<f64>> {
    let shift = frame_offset * 2;
    let start = target.start as isize + shift;
    let end = target.end as isize + shift;
    if start < 0 || end as usize > window.len() {
        return None;
    }
    let (top, bottom) = field::split_top_bottom(&window[start as usize..end as usize]).ok()?;
    let (field, line) = field::frame_line_source(top, bottom, frame_line);
    Some(composite_line_f64(field, line, width))
}

/// Disagreement penalty between a candidate chroma sample and the
/// reference neighborhood: a small neighborhood of the reference pixel
/// is weighed against each candidate's neighborhood.
fn neighborhood_penalty(composite: &[f64], x: usize, candidate: f64, reference: f64) -> f64 {
    let reconstructed_luma = reference - candidate;
    let mut penalty = (reference - reconstructed_luma).abs();
    for dx in [-1isize, 1] {
        let idx = x as isize + dx;
        if idx >= 0 && (idx as usize) < composite.len() {
            penalty += (composite[idx as usize] - reconstructed_luma).abs() * 0.25;
        }
    }
    penalty
}

fn phase_penalty(frame_line: usize, source: usize) -> f64 {
    // A small per-line burst-phase adjustment; same-line (2-D, source 0)
    // candidates never incur it since they share this line's phase.
    if source == 0 {
        0.0
    } else {
        0.05 * ((frame_line % 4) as f64)
    }
}

pub(crate) fn apply_nr(line: &mut [f64], level: f64, ire_gain: f64) {
    let r = ire_gain / 100.0;
    let limit = level * r;
    let taps = [0.5, -0.2];
    let mut hp = vec![0.0; line.len()];
    fir::apply(line, &mut hp, &taps);
    fir::core(&mut hp, limit);
    for (sample, h) in line.iter_mut().zip(hp.iter()) {
        *sample -= *h;
    }
}

pub(crate) fn rotate_gain_phase(u: &mut [f64], v: &mut [f64], gain: f64, phase_deg: f64) {
    let phase = phase_deg.to_radians();
    let (sin_p, cos_p) = phase.sin_cos();
    for (uu, vv) in u.iter_mut().zip(v.iter_mut()) {
        let (ou, ov) = (*uu, *vv);
        *uu = gain * (ou * cos_p - ov * sin_p);
        *vv = gain * (ou * sin_p + ov * cos_p);
    }
}

pub(crate) fn composite_line_f64(field: &SourceField, line_in_field: usize, width: usize) -> Vec<f64> {
    let start = line_in_field * width;
    field.data[start..start + width].iter().map(|&s| f64::from(s)).collect()
}

pub(crate) fn write_active_line(
    frame: &mut ComponentFrame,
    params: &VideoParameters,
    frame_line: usize,
    luma: &[f64],
    u: &[f64],
    v: &[f64],
) {
    if frame_line < params.first_active_frame_line || frame_line >= params.last_active_frame_line {
        return;
    }
    let (plane_line, _) = frame.active_coords(params, frame_line - params.first_active_frame_line, 0);
    for x in params.active_video_start..params.active_video_end {
        let (_, plane_x) = frame.active_coords(params, frame_line - params.first_active_frame_line, x - params.active_video_start);
        frame.y.set(plane_line, plane_x, luma[x]);
        frame.u.set(plane_line, plane_x, u[x]);
        frame.v.set(plane_line, plane_x, v[x]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::VideoSystem;

    fn params() -> VideoParameters {
        VideoParameters {
            system: VideoSystem::Ntsc,
            field_width: 40,
            field_height: 10,
            active_video_start: 4,
            active_video_end: 36,
            first_active_frame_line: 2,
            last_active_frame_line: 16,
            black_16b_ire: 16384,
            white_16b_ire: 54016,
            is_subcarrier_locked: true,
            is_widescreen: false,
            active_area_cropping_applied: false,
        }
    }

    fn black_window(params: &VideoParameters, fields: usize) -> Vec<SourceField> {
        (0..fields)
            .map(|i| SourceField::black(i as u64 + 1, i % 2 == 0, Some(1), params))
            .collect()
    }

    #[test]
    fn black_field_decodes_to_black_frame() {
        let p = params();
        let window = black_window(&p, 2);
        let mut decoder = NtscCombDecoder::new(
            p.clone(),
            NtscCombConfig {
                dimensions: CombDimensions::TwoD,
                ..Default::default()
            },
        )
        .unwrap();
        let frame = decoder.decode_frame(&window, 0..2).unwrap();
        assert!(frame.all_finite());
        for y in p.first_active_frame_line..p.last_active_frame_line {
            let (line, _) = frame.active_coords(&p, y - p.first_active_frame_line, 0);
            for x in 0..(p.active_video_end - p.active_video_start) {
                let (_, px) = frame.active_coords(&p, y - p.first_active_frame_line, x);
                assert!((frame.y.get(line, px) - f64::from(p.black_16b_ire)).abs() < 1e-6);
                assert!(frame.u.get(line, px).abs() < 1e-6);
                assert!(frame.v.get(line, px).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn one_d_comb_cancels_constant_signal() {
        let composite = vec![1000.0; 40];
        let p = params();
        let decoder = NtscCombDecoder::new(p, NtscCombConfig::default()).unwrap();
        let chroma = decoder.comb_1d(&composite);
        for &c in chroma.iter().skip(HALF_CYCLE_SAMPLES).take(30) {
            assert!(c.abs() < 1e-9);
        }
    }
}
