//! PAL 2-D/Transform-PAL decoder.
//!
//! Both chroma sources feed the same burst-locked IQ demodulation and
//! write-out pipeline; they differ only in how the subcarrier-modulated
//! chroma waveform is isolated from luma before demodulation:
//!
//! - [`ChromaSource::Classic`] takes a horizontal high-pass of the raw
//!   composite line, then a same-field vertical average two frame-lines
//!   away (the PAL analogue of [`super::ntsc_comb`]'s 2-D comb trick,
//!   exploiting the Vswitch phase inversion between adjacent lines).
//! - [`ChromaSource::Transform`] delegates to a
//!   [`super::transform_pal::TransformPalSeparator`], which already
//!   performs frequency-domain spatial separation, so no further
//!   vertical smoothing is applied on top of it.

use std::ops::Range;

use crate::decoders::ntsc_comb::{apply_nr, composite_line_f64, rotate_gain_phase, write_active_line};
use crate::decoders::transform_pal::TransformPalSeparator;
use crate::error::{Error, Result};
use crate::field::{self, SourceField};
use crate::fir::{self, carrier_tables, SUBCARRIER_SAMPLES_PER_CYCLE};
use crate::frame::ComponentFrame;
use crate::params::VideoParameters;

/// Horizontal luma low-pass used to isolate the classic chroma band.
/// The original's quarter-plane filter's exact cutoff
/// wasn't part of the retrieval pack; this is a same-shape 7-tap
/// half-kernel reimplementation from the documented subcarrier-adjacent
/// passband.
const LOW_PASS_TAPS: &[f64] = &[0.25, 0.2, 0.125, 0.05];

/// Colour burst duration, in subcarrier cycles, at 4x-subcarrier
/// sampling: a PAL burst gate runs roughly 10 cycles.
const BURST_CYCLES: usize = 10;

pub enum ChromaSource {
    Classic,
    Transform(TransformPalSeparator),
}

pub struct Pal2DConfig {
    pub chroma_gain: f64,
    pub chroma_phase_deg: f64,
    pub chroma_nr: f64,
    pub luma_nr: f64,
    /// `simple_pal`: skip the vertical quarter-plane leg and
    /// demodulate each line independently. Only meaningful for
    /// [`ChromaSource::Classic`].
    pub simple: bool,
}

pub struct PalDecoder {
    params: VideoParameters,
    config: Pal2DConfig,
    source: ChromaSource,
    cos_table: Vec<f64>,
    sin_table: Vec<f64>,
}

impl PalDecoder {
    pub fn new(params: VideoParameters, config: Pal2DConfig, source: ChromaSource) -> Result<Self> {
        let (cos_table, sin_table) = carrier_tables(params.field_width, SUBCARRIER_SAMPLES_PER_CYCLE);
        Ok(PalDecoder {
            params,
            config,
            source,
            cos_table,
            sin_table,
        })
    }

    pub fn look_behind(&self) -> usize {
        match &self.source {
            ChromaSource::Classic => 0,
            ChromaSource::Transform(sep) => sep.look_behind(),
        }
    }

    pub fn look_ahead(&self) -> usize {
        match &self.source {
            ChromaSource::Classic => 0,
            ChromaSource::Transform(sep) => sep.look_ahead(),
        }
    }

    pub fn decode_frame(&mut self, window: &[SourceField], target: Range<usize>) -> Result<ComponentFrame> {
        if target.len() != 2 {
            return Err(Error::Decode {
                frame: target.start,
                reason: "target range must name exactly two fields".into(),
            });
        }
        if window[target.start].data.is_empty() {
            return Err(Error::EmptyFieldData(window[target.start].seq_no));
        }

        let width = self.params.field_width;
        let transform_chroma = match &mut self.source {
            ChromaSource::Classic => None,
            ChromaSource::Transform(sep) => Some(sep.separate(window, target.clone(), &self.params)?),
        };

        let (top, bottom) = field::split_top_bottom(&window[target.clone()])?;
        let top_is_first = top.is_first_field;
        let mut frame = ComponentFrame::new_black(&self.params);

        for frame_line in self.params.first_active_frame_line..self.params.last_active_frame_line {
            let (field, line_in_field) = field::frame_line_source(top, bottom, frame_line);
            let composite = composite_line_f64(field, line_in_field, width);

            let chroma_composite = match &transform_chroma {
                None => classic_chroma_band(&composite),
                Some([top_chroma, bottom_chroma]) => {
                    let is_top = frame_line % 2 == 0;
                    let buf = if is_top == top_is_first { top_chroma } else { bottom_chroma };
                    buf[line_in_field * width..line_in_field * width + width].to_vec()
                }
            };

            let (mut u_line, mut v_line) = self.demodulate(&composite, &chroma_composite, frame_line, field.field_phase_id);

            if matches!(self.source, ChromaSource::Classic) && !self.config.simple {
                self.smooth_vertical(window, target.clone(), frame_line, &mut u_line, &mut v_line);
            }

            if self.config.chroma_nr > 0.0 {
                apply_nr(&mut u_line, self.config.chroma_nr, self.params.ire_gain());
                apply_nr(&mut v_line, self.config.chroma_nr, self.params.ire_gain());
            }
            rotate_gain_phase(&mut u_line, &mut v_line, self.config.chroma_gain, self.config.chroma_phase_deg);

            let mut luma: Vec<f64> = composite.iter().zip(chroma_composite.iter()).map(|(&c, &ch)| c - ch).collect();
            if self.config.luma_nr > 0.0 {
                apply_nr(&mut luma, self.config.luma_nr, self.params.ire_gain());
            }

            write_active_line(&mut frame, &self.params, frame_line, &luma, &u_line, &v_line);
        }

        Ok(frame)
    }

    /// Burst-phase-locked quadrature demodulation. `composite` (the
    /// full raw line, not yet chroma-separated) supplies the burst
    /// gate that `detect_burst` correlates against the nominal
    /// subcarrier to get this line's (bp, bq) rotation; `chroma` is
    /// what actually gets demodulated by it. V's reference phase flips
    /// every line (PAL's Vswitch).
    fn demodulate(&self, composite: &[f64], chroma: &[f64], frame_line: usize, field_phase_id: Option<u8>) -> (Vec<f64>, Vec<f64>) {
        let (bp, bq) = detect_burst(composite, self.params.active_video_start, &self.cos_table, &self.sin_table);
        let vsw = line_vsw(field_phase_id, frame_line, bq);

        let mut u = vec![0.0; chroma.len()];
        let mut v = vec![0.0; chroma.len()];
        for x in 0..chroma.len() {
            // Rotate the nominal carrier by the burst-measured phase
            // error (bp, bq already normalized to a unit vector) before
            // using it as the demodulation reference.
            let cos_ref = self.cos_table[x] * bp + self.sin_table[x] * bq;
            let sin_ref = self.sin_table[x] * bp - self.cos_table[x] * bq;
            u[x] = chroma[x] * cos_ref;
            v[x] = chroma[x] * sin_ref * vsw;
        }
        let taps = [0.5, 0.25];
        let mut u_lp = vec![0.0; u.len()];
        let mut v_lp = vec![0.0; v.len()];
        fir::apply(&u, &mut u_lp, &taps);
        fir::apply(&v, &mut v_lp, &taps);
        (u_lp, v_lp)
    }

    /// Averages this line's demodulated chroma with the same-field
    /// line two frame-lines away, on each side when available (the
    /// quarter-plane filter's vertical leg). Vswitch leaves V's sign
    /// unchanged between same-parity lines two apart, so no
    /// re-negation is needed.
    fn smooth_vertical(
        &self,
        window: &[SourceField],
        target: Range<usize>,
        frame_line: usize,
        u: &mut [f64],
        v: &mut [f64],
    ) {
        let width = self.params.field_width;
        let Ok((top, bottom)) = field::split_top_bottom(&window[target]) else {
            return;
        };
        let mut neighbors = Vec::new();
        if frame_line >= 2 {
            let (f, l) = field::frame_line_source(top, bottom, frame_line - 2);
            neighbors.push((composite_line_f64(f, l, width), f.field_phase_id));
        }
        if frame_line + 2 < self.params.last_active_frame_line {
            let (f, l) = field::frame_line_source(top, bottom, frame_line + 2);
            neighbors.push((composite_line_f64(f, l, width), f.field_phase_id));
        }
        if neighbors.is_empty() {
            return;
        }

        for (neighbor, neighbor_phase_id) in &neighbors {
            let chroma = classic_chroma_band(neighbor);
            let (nu, nv) = self.demodulate(neighbor, &chroma, frame_line, *neighbor_phase_id);
            let weight = 0.25;
            for x in 0..u.len() {
                u[x] = u[x] * (1.0 - weight) + nu[x] * weight;
                v[x] = v[x] * (1.0 - weight) + nv[x] * weight;
            }
        }
    }
}

/// Half-open sample range the colour burst occupies on a line: a gate
/// immediately before active video starts, long enough for
/// [`BURST_CYCLES`] subcarrier cycles.
fn burst_range(active_video_start: usize) -> Range<usize> {
    let gate_width = (BURST_CYCLES as f64 * SUBCARRIER_SAMPLES_PER_CYCLE) as usize;
    active_video_start.saturating_sub(gate_width)..active_video_start
}

/// Correlates the burst gate against the nominal subcarrier reference
/// to get the line's burst phase/amplitude, then normalizes to a unit
/// rotation vector `(bp, bq)`. Falls back to the identity rotation
/// `(1.0, 0.0)` when the gate is empty or the measured amplitude is
/// negligible (no real subcarrier present, e.g. a black test field).
fn detect_burst(composite: &[f64], active_video_start: usize, cos_table: &[f64], sin_table: &[f64]) -> (f64, f64) {
    let mut bp = 0.0;
    let mut bq = 0.0;
    for n in burst_range(active_video_start) {
        if n >= composite.len() {
            break;
        }
        bp += composite[n] * cos_table[n];
        bq += composite[n] * sin_table[n];
    }
    let amplitude = (bp * bp + bq * bq).sqrt();
    if amplitude < 1e-9 {
        return (1.0, 0.0);
    }
    (bp / amplitude, bq / amplitude)
}

/// PAL's Vswitch flips V's sign every line; which absolute parity a
/// field starts on is a property of the field (its `field_phase_id`),
/// not of `frame_line` alone. When no `field_phase_id` hint is
/// available, the measured burst phase (`bq`'s sign) is the fallback
/// signal for which parity this line is on.
fn line_vsw(field_phase_id: Option<u8>, frame_line: usize, bq: f64) -> f64 {
    match field_phase_id {
        Some(phase) => {
            if (phase as usize + frame_line) % 2 == 0 {
                1.0
            } else {
                -1.0
            }
        }
        None if bq.abs() > 1e-9 => bq.signum(),
        None => {
            if frame_line % 2 == 0 {
                1.0
            } else {
                -1.0
            }
        }
    }
}

fn classic_chroma_band(composite: &[f64]) -> Vec<f64> {
    let mut lowpass = vec![0.0; composite.len()];
    fir::apply(composite, &mut lowpass, LOW_PASS_TAPS);
    composite.iter().zip(lowpass.iter()).map(|(&c, &l)| c - l).collect()
}
