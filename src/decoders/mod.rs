//! Decoder kernel selection: a tagged variant instead of a trait
//! object, since the kernel set is closed and known at compile time.

pub mod mono;
pub mod ntsc_comb;
pub mod pal2d;
pub mod transform_pal;

use std::ops::Range;

use crate::error::Result;
use crate::field::SourceField;
use crate::frame::ComponentFrame;
use crate::params::{DecoderType, TriggerConfig, VideoParameters};

use mono::{MonoConfig, MonoDecoder};
use ntsc_comb::{CombDimensions, NtscCombConfig, NtscCombDecoder};
use pal2d::{ChromaSource, Pal2DConfig, PalDecoder};
use transform_pal::{TransformDimensions, TransformPalSeparator};

/// One instance per worker thread: each thread owns its own kernel
/// instance.
pub enum DecoderKernel {
    Mono(MonoDecoder),
    Pal(PalDecoder),
    NtscComb(NtscCombDecoder),
}

impl DecoderKernel {
    /// Builds the kernel named by `decoder_type` (already resolved from
    /// `Auto`) for `params`, configured from `trigger`.
    pub fn build(decoder_type: DecoderType, params: VideoParameters, trigger: &TriggerConfig) -> Result<Self> {
        debug_assert_ne!(decoder_type, DecoderType::Auto, "Auto must be resolved before building a kernel");
        match decoder_type {
            DecoderType::Auto => unreachable!("resolved by caller"),
            DecoderType::Mono => Ok(DecoderKernel::Mono(MonoDecoder::new(
                params,
                MonoConfig {
                    filter_chroma: false,
                    luma_nr: trigger.luma_nr,
                },
            )?)),
            DecoderType::Pal2D => Ok(DecoderKernel::Pal(PalDecoder::new(
                params,
                pal_config(trigger),
                ChromaSource::Classic,
            )?)),
            DecoderType::Transform2D => {
                let sep = TransformPalSeparator::new(TransformDimensions::TwoD, crate::fft::DEFAULT_THRESHOLD)?;
                Ok(DecoderKernel::Pal(PalDecoder::new(params, pal_config(trigger), ChromaSource::Transform(sep))?))
            }
            DecoderType::Transform3D => {
                let sep = TransformPalSeparator::new(TransformDimensions::ThreeD, crate::fft::DEFAULT_THRESHOLD)?;
                Ok(DecoderKernel::Pal(PalDecoder::new(params, pal_config(trigger), ChromaSource::Transform(sep))?))
            }
            DecoderType::Ntsc1D => Ok(DecoderKernel::NtscComb(NtscCombDecoder::new(
                params,
                ntsc_config(trigger, CombDimensions::OneD),
            )?)),
            DecoderType::Ntsc2D => Ok(DecoderKernel::NtscComb(NtscCombDecoder::new(
                params,
                ntsc_config(trigger, CombDimensions::TwoD),
            )?)),
            DecoderType::Ntsc3D => Ok(DecoderKernel::NtscComb(NtscCombDecoder::new(
                params,
                ntsc_config(trigger, CombDimensions::ThreeD { adaptive: true }),
            )?)),
            DecoderType::Ntsc3DNoAdapt => Ok(DecoderKernel::NtscComb(NtscCombDecoder::new(
                params,
                ntsc_config(trigger, CombDimensions::ThreeD { adaptive: false }),
            )?)),
        }
    }

    pub fn look_behind(&self) -> usize {
        match self {
            DecoderKernel::Mono(d) => d.look_behind(),
            DecoderKernel::Pal(d) => d.look_behind(),
            DecoderKernel::NtscComb(d) => d.look_behind(),
        }
    }

    pub fn look_ahead(&self) -> usize {
        match self {
            DecoderKernel::Mono(d) => d.look_ahead(),
            DecoderKernel::Pal(d) => d.look_ahead(),
            DecoderKernel::NtscComb(d) => d.look_ahead(),
        }
    }

    pub fn decode_frame(&mut self, window: &[SourceField], target: Range<usize>) -> Result<ComponentFrame> {
        match self {
            DecoderKernel::Mono(d) => d.decode_frame(window, target),
            DecoderKernel::Pal(d) => d.decode_frame(window, target),
            DecoderKernel::NtscComb(d) => d.decode_frame(window, target),
        }
    }
}

fn pal_config(trigger: &TriggerConfig) -> Pal2DConfig {
    Pal2DConfig {
        chroma_gain: trigger.chroma_gain,
        chroma_phase_deg: trigger.chroma_phase,
        chroma_nr: trigger.chroma_nr,
        luma_nr: trigger.luma_nr,
        simple: trigger.simple_pal,
    }
}

fn ntsc_config(trigger: &TriggerConfig, dimensions: CombDimensions) -> NtscCombConfig {
    NtscCombConfig {
        dimensions,
        chroma_gain: trigger.chroma_gain,
        chroma_phase_deg: trigger.chroma_phase,
        phase_compensation: trigger.ntsc_phase_comp,
        luma_nr: trigger.luma_nr,
        chroma_nr: trigger.chroma_nr,
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
            is_subcarrier_locked: false,
            is_widescreen: false,
            active_area_cropping_applied: false,
        }
    }

    #[test]
    fn build_selects_ntsc_comb_for_ntsc2d() {
        let trigger = TriggerConfig::default();
        let kernel = DecoderKernel::build(DecoderType::Ntsc2D, params(), &trigger).unwrap();
        assert!(matches!(kernel, DecoderKernel::NtscComb(_)));
        assert_eq!(kernel.look_behind(), 0);
    }

    #[test]
    fn build_selects_pal_for_transform2d() {
        let mut p = params();
        p.system = VideoSystem::Pal;
        let trigger = TriggerConfig::default();
        let kernel = DecoderKernel::build(DecoderType::Transform2D, p, &trigger).unwrap();
        assert!(matches!(kernel, DecoderKernel::Pal(_)));
    }

    #[test]
    fn build_selects_three_d_comb_with_context() {
        let trigger = TriggerConfig::default();
        let kernel = DecoderKernel::build(DecoderType::Ntsc3D, params(), &trigger).unwrap();
        assert_eq!(kernel.look_behind(), 1);
        assert_eq!(kernel.look_ahead(), 2);
    }
}
