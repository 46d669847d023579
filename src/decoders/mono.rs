//! Monochrome decoder: pass luma through, optionally stripping chroma
//! with an embedded comb notch filter, then applying luma noise
//! reduction.

use std::ops::Range;

use crate::decoders::ntsc_comb::{CombDimensions, NtscCombConfig, NtscCombDecoder};
use crate::error::{Error, Result};
use crate::field::{self, SourceField};
use crate::fir;
use crate::frame::ComponentFrame;
use crate::params::{VideoParameters, VideoSystem};

#[derive(Debug, Clone, Copy)]
pub struct MonoConfig {
    pub filter_chroma: bool,
    pub luma_nr: f64,
}

/// PAL and NTSC use different high-pass tap sets for luma-NR coring
/// pre-emphasis. The exact `deemp.h` coefficients from the
/// source weren't part of the retrieval pack; these are a same-shape
/// symmetric high-pass reimplementation from the documented algorithm.
const NTSC_NR_TAPS: &[f64] = &[0.6, -0.2, -0.1];
const PAL_NR_TAPS: &[f64] = &[0.55, -0.15, -0.1, -0.05];

/// Mono decoder. When `filter_chroma` is set it composes an embedded
/// [`NtscCombDecoder`] used purely as a chroma notch, zeroing U/V
/// afterward; this mirrors the source's `MonoDecoder` holding a `Comb`.
pub struct MonoDecoder {
    params: VideoParameters,
    config: MonoConfig,
    comb: Option<NtscCombDecoder>,
}

impl MonoDecoder {
    pub fn new(params: VideoParameters, config: MonoConfig) -> Result<Self> {
        let comb = if config.filter_chroma {
            Some(NtscCombDecoder::new(
                params,
                NtscCombConfig {
                    dimensions: CombDimensions::TwoD,
                    chroma_gain: 1.0,
                    chroma_phase_deg: 0.0,
                    phase_compensation: false,
                    luma_nr: 0.0,
                    chroma_nr: 0.0,
                },
            )?)
        } else {
            None
        };
        Ok(MonoDecoder { params, config, comb })
    }

    pub fn look_behind(&self) -> usize {
        0
    }

    pub fn look_ahead(&self) -> usize {
        0
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

        let mut frame = if let Some(comb) = &mut self.comb {
            let mut frame = comb.decode_frame(window, target.clone())?;
            zero_chroma(&mut frame);
            frame
        } else {
            self.passthrough(window, target)?
        };

        if self.config.luma_nr > 0.0 {
            self.apply_luma_nr(&mut frame);
        }

        Ok(frame)
    }

    fn passthrough(&self, window: &[SourceField], target: Range<usize>) -> Result<ComponentFrame> {
        let (top, bottom) = field::split_top_bottom(&window[target])?;
        let mut frame = ComponentFrame::new_black(&self.params);
        for frame_line in self.params.first_active_frame_line..self.params.last_active_frame_line {
            let (source, line_in_field) = field::frame_line_source(top, bottom, frame_line);
            let width = self.params.field_width;
            let line_start = line_in_field * width;
            let line = &source.data[line_start..line_start + width];
            let plane_y = frame_line - self.params.first_active_frame_line;
            for x in self.params.active_video_start..self.params.active_video_end {
                let (py, px) = frame.active_coords(&self.params, plane_y, x - self.params.active_video_start);
                frame.y.set(py, px, f64::from(line[x]));
            }
        }
        Ok(frame)
    }

    fn apply_luma_nr(&self, frame: &mut ComponentFrame) {
        let r = self.params.ire_gain() / 100.0;
        let limit = self.config.luma_nr * r;
        let taps = if matches!(self.params.system, VideoSystem::Pal | VideoSystem::PalM) {
            PAL_NR_TAPS
        } else {
            NTSC_NR_TAPS
        };
        for line in 0..frame.y.height {
            let row = frame.y.row(line).to_vec();
            let mut hp = vec![0.0; row.len()];
            fir::apply(&row, &mut hp, taps);
            fir::core(&mut hp, limit);
            let out = frame.y.row_mut(line);
            for (sample, h) in out.iter_mut().zip(hp.iter()) {
                *sample -= *h;
            }
        }
    }
}

fn zero_chroma(frame: &mut ComponentFrame) {
    for v in frame.u.data.iter_mut() {
        *v = 0.0;
    }
    for v in frame.v.data.iter_mut() {
        *v = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::VideoSystem;

    fn params() -> VideoParameters {
        VideoParameters {
            system: VideoSystem::Ntsc,
            field_width: 20,
            field_height: 6,
            active_video_start: 2,
            active_video_end: 18,
            first_active_frame_line: 1,
            last_active_frame_line: 10,
            black_16b_ire: 16384,
            white_16b_ire: 54016,
            is_subcarrier_locked: false,
            is_widescreen: false,
            active_area_cropping_applied: false,
        }
    }

    #[test]
    fn passthrough_without_nr_preserves_composite() {
        let p = params();
        let mut top = SourceField::black(1, true, Some(1), &p);
        let mut bottom = SourceField::black(2, false, Some(1), &p);
        for (i, s) in top.data.iter_mut().enumerate() {
            *s = (20000 + i) as u16;
        }
        for (i, s) in bottom.data.iter_mut().enumerate() {
            *s = (30000 + i) as u16;
        }
        let window = vec![top, bottom];
        let mut decoder = MonoDecoder::new(
            p.clone(),
            MonoConfig {
                filter_chroma: false,
                luma_nr: 0.0,
            },
        )
        .unwrap();
        let frame = decoder.decode_frame(&window, 0..2).unwrap();

        for frame_line in p.first_active_frame_line..p.last_active_frame_line {
            let (source, line_in_field) = if frame_line % 2 == 0 {
                (&window[0], frame_line / 2)
            } else {
                (&window[1], frame_line / 2)
            };
            let line_start = line_in_field * p.field_width;
            for x in p.active_video_start..p.active_video_end {
                let (py, px) = frame.active_coords(&p, frame_line - p.first_active_frame_line, x - p.active_video_start);
                assert_eq!(frame.y.get(py, px), f64::from(source.data[line_start + x]));
            }
        }
    }

    #[test]
    fn filter_chroma_zeroes_uv() {
        let p = params();
        let window = vec![
            SourceField::black(1, true, Some(1), &p),
            SourceField::black(2, false, Some(1), &p),
        ];
        let mut decoder = MonoDecoder::new(
            p,
            MonoConfig {
                filter_chroma: true,
                luma_nr: 0.0,
            },
        )
        .unwrap();
        let frame = decoder.decode_frame(&window, 0..2).unwrap();
        assert!(frame.u.data.iter().all(|&v| v == 0.0));
        assert!(frame.v.data.iter().all(|&v| v == 0.0));
    }
}
