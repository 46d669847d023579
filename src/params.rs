//! Value types describing a source's video system and the knobs a
//! decode invocation can be configured with.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Analog video line standard of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSystem {
    Pal,
    Ntsc,
    PalM,
    Unknown,
}

/// Immutable calibration/geometry of a source, shared by every field
/// and frame decoded from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoParameters {
    pub system: VideoSystem,
    /// Samples per line.
    pub field_width: usize,
    /// Lines per field (top/bottom differ by parity: 262/263 NTSC, 312/313 PAL).
    pub field_height: usize,
    /// Half-open sample range `[start, end)` containing active video.
    pub active_video_start: usize,
    pub active_video_end: usize,
    /// Half-open frame-line range `[first, last)`, 0-based.
    pub first_active_frame_line: usize,
    pub last_active_frame_line: usize,
    /// 16-bit IRE calibration counts; `white > black`.
    pub black_16b_ire: u16,
    pub white_16b_ire: u16,
    pub is_subcarrier_locked: bool,
    pub is_widescreen: bool,
    pub active_area_cropping_applied: bool,
}

impl VideoParameters {
    /// Validates geometry and calibration invariants. Called once by
    /// the orchestrator before any decode work begins.
    pub fn validate(&self) -> Result<()> {
        if !(self.active_video_start < self.active_video_end
            && self.active_video_end <= self.field_width)
        {
            return Err(Error::InvalidParameterValue {
                name: "active_video_start/active_video_end",
                value: format!("{}..{} (field_width={})", self.active_video_start, self.active_video_end, self.field_width),
            });
        }
        if !(self.first_active_frame_line < self.last_active_frame_line
            && self.last_active_frame_line <= 2 * self.field_height - 1)
        {
            return Err(Error::InvalidParameterValue {
                name: "first_active_frame_line/last_active_frame_line",
                value: format!(
                    "{}..{} (field_height={})",
                    self.first_active_frame_line, self.last_active_frame_line, self.field_height
                ),
            });
        }
        if self.white_16b_ire <= self.black_16b_ire {
            return Err(Error::InvalidParameterValue {
                name: "white_16b_ire",
                value: format!("{} <= black={}", self.white_16b_ire, self.black_16b_ire),
            });
        }
        Ok(())
    }

    /// Height of the interlaced component frame built from this
    /// source's two fields.
    pub fn frame_height(&self) -> usize {
        2 * self.field_height - 1
    }

    /// `(white - black)` unit gain used throughout the IRE arithmetic.
    pub fn ire_gain(&self) -> f64 {
        f64::from(self.white_16b_ire) - f64::from(self.black_16b_ire)
    }
}

/// Which decoder kernel to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderType {
    Auto,
    Mono,
    Pal2D,
    Transform2D,
    Transform3D,
    Ntsc1D,
    Ntsc2D,
    Ntsc3D,
    Ntsc3DNoAdapt,
}

impl DecoderType {
    fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "auto" => DecoderType::Auto,
            "mono" => DecoderType::Mono,
            "pal2d" => DecoderType::Pal2D,
            "transform2d" => DecoderType::Transform2D,
            "transform3d" => DecoderType::Transform3D,
            "ntsc1d" => DecoderType::Ntsc1D,
            "ntsc2d" => DecoderType::Ntsc2D,
            "ntsc3d" => DecoderType::Ntsc3D,
            "ntsc3dnoadapt" => DecoderType::Ntsc3DNoAdapt,
            other => return Err(Error::UnknownDecoderType(other.to_string())),
        })
    }

    /// Resolves `Auto` against the source's video system: transform2d
    /// for PAL, ntsc2d for NTSC.
    pub fn resolve(self, system: VideoSystem) -> DecoderType {
        match self {
            DecoderType::Auto => match system {
                VideoSystem::Pal | VideoSystem::Unknown => DecoderType::Transform2D,
                VideoSystem::Ntsc | VideoSystem::PalM => DecoderType::Ntsc2D,
            },
            other => other,
        }
    }

    /// `(look_behind, look_ahead)` frame counts this kernel needs.
    pub fn temporal_context(self) -> (usize, usize) {
        match self {
            DecoderType::Transform3D => (2, 4),
            DecoderType::Ntsc3D | DecoderType::Ntsc3DNoAdapt => (1, 2),
            _ => (0, 0),
        }
    }
}

/// Pixel format the output writer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Rgb48,
    Yuv444P16,
    Gray16,
}

/// The full configuration surface of a decode trigger.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub output_path: String,
    pub decoder_type: DecoderType,
    pub output_format: OutputFormat,
    pub output_y4m: bool,
    pub chroma_gain: f64,
    pub chroma_phase: f64,
    pub threads: usize,
    pub luma_nr: f64,
    pub chroma_nr: f64,
    pub output_padding: u32,
    pub active_area_only: bool,
    pub ntsc_phase_comp: bool,
    pub simple_pal: bool,
    pub start_frame: Option<u64>,
    pub frame_count: Option<u64>,
    /// Orchestrator progress-callback cadence, in frames. Default
    /// carried over from the original decoder pool.
    pub progress_every: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig {
            output_path: String::new(),
            decoder_type: DecoderType::Auto,
            output_format: OutputFormat::Rgb48,
            output_y4m: false,
            chroma_gain: 1.0,
            chroma_phase: 0.0,
            threads: 0,
            luma_nr: 0.0,
            chroma_nr: 0.0,
            output_padding: 8,
            active_area_only: false,
            ntsc_phase_comp: false,
            simple_pal: false,
            start_frame: None,
            frame_count: None,
            progress_every: 100,
        }
    }
}

const KNOWN_PARAMS: &[&str] = &[
    "output_path",
    "decoder_type",
    "output_format",
    "chroma_gain",
    "chroma_phase",
    "threads",
    "luma_nr",
    "chroma_nr",
    "output_padding",
    "active_area_only",
    "ntsc_phase_comp",
    "simple_pal",
    "start_frame",
    "frame_count",
    "progress_every",
];

fn coerce_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_range(name: &'static str, value: &str, lo: f64, hi: f64) -> Result<f64> {
    let parsed: f64 = value.parse().map_err(|_| Error::InvalidParameterValue {
        name,
        value: value.to_string(),
    })?;
    if parsed < lo || parsed > hi {
        return Err(Error::InvalidParameterValue {
            name,
            value: value.to_string(),
        });
    }
    Ok(parsed)
}

impl TriggerConfig {
    /// Builds a config from a raw string-keyed map, as it would arrive
    /// from a config file. Unknown parameters are rejected; boolean
    /// values accept coerced string forms.
    pub fn from_raw(raw: &HashMap<String, String>) -> Result<Self> {
        for key in raw.keys() {
            if !KNOWN_PARAMS.contains(&key.as_str()) {
                return Err(Error::UnknownParameter(key.clone()));
            }
        }

        let mut config = TriggerConfig::default();

        if let Some(v) = raw.get("output_path") {
            config.output_path = v.clone();
        }
        if config.output_path.is_empty() {
            return Err(Error::MissingOutputPath);
        }

        if let Some(v) = raw.get("decoder_type") {
            config.decoder_type = DecoderType::parse(v)?;
        }

        if let Some(v) = raw.get("output_format") {
            config.output_format = match v.as_str() {
                "rgb" => OutputFormat::Rgb48,
                "yuv" => OutputFormat::Yuv444P16,
                "y4m" => {
                    config.output_y4m = true;
                    OutputFormat::Yuv444P16
                }
                other => return Err(Error::UnsupportedOutputFormat(other.to_string())),
            };
        }

        if let Some(v) = raw.get("chroma_gain") {
            config.chroma_gain = parse_range("chroma_gain", v, 0.0, 10.0)?;
        }
        if let Some(v) = raw.get("chroma_phase") {
            config.chroma_phase = parse_range("chroma_phase", v, -180.0, 180.0)?;
        }
        if let Some(v) = raw.get("threads") {
            config.threads = parse_range("threads", v, 0.0, 64.0)? as usize;
        }
        if let Some(v) = raw.get("luma_nr") {
            config.luma_nr = parse_range("luma_nr", v, 0.0, 10.0)?;
        }
        if let Some(v) = raw.get("chroma_nr") {
            config.chroma_nr = parse_range("chroma_nr", v, 0.0, 10.0)?;
        }
        if let Some(v) = raw.get("output_padding") {
            config.output_padding = parse_range("output_padding", v, 1.0, 32.0)? as u32;
        }
        if let Some(v) = raw.get("active_area_only") {
            config.active_area_only = coerce_bool(v).ok_or_else(|| Error::InvalidParameterValue {
                name: "active_area_only",
                value: v.clone(),
            })?;
        }
        if let Some(v) = raw.get("ntsc_phase_comp") {
            config.ntsc_phase_comp = coerce_bool(v).ok_or_else(|| Error::InvalidParameterValue {
                name: "ntsc_phase_comp",
                value: v.clone(),
            })?;
        }
        if let Some(v) = raw.get("simple_pal") {
            config.simple_pal = coerce_bool(v).ok_or_else(|| Error::InvalidParameterValue {
                name: "simple_pal",
                value: v.clone(),
            })?;
        }
        if let Some(v) = raw.get("start_frame") {
            config.start_frame = Some(v.parse().map_err(|_| Error::InvalidParameterValue {
                name: "start_frame",
                value: v.clone(),
            })?);
        }
        if let Some(v) = raw.get("frame_count") {
            config.frame_count = Some(v.parse().map_err(|_| Error::InvalidParameterValue {
                name: "frame_count",
                value: v.clone(),
            })?);
        }
        if let Some(v) = raw.get("progress_every") {
            config.progress_every = parse_range("progress_every", v, 1.0, 1_000_000.0)? as u64;
        }

        Ok(config)
    }

    /// Resolves `start_frame`/`frame_count` against the number of
    /// frames available from the source, applying the original
    /// decoder pool's defaulting (start = 0 if unset, length = rest
    /// of the source if unset) and bounds check.
    pub fn resolve_frame_range(&self, available_frames: u64) -> Result<(u64, u64)> {
        let start = self.start_frame.unwrap_or(0);
        if start > available_frames {
            return Err(Error::StartFrameOutOfBounds {
                start,
                available: available_frames,
            });
        }
        let count = self.frame_count.unwrap_or(available_frames - start);
        Ok((start, start + count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_output_path_is_config_error() {
        let raw = HashMap::new();
        let err = TriggerConfig::from_raw(&raw).unwrap_err();
        assert!(matches!(err, Error::MissingOutputPath));
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let mut raw = HashMap::new();
        raw.insert("output_path".to_string(), "out.bin".to_string());
        raw.insert("bogus".to_string(), "1".to_string());
        let err = TriggerConfig::from_raw(&raw).unwrap_err();
        assert!(matches!(err, Error::UnknownParameter(_)));
    }

    #[test]
    fn string_coerced_booleans_accepted() {
        let mut raw = HashMap::new();
        raw.insert("output_path".to_string(), "out.bin".to_string());
        raw.insert("active_area_only".to_string(), "yes".to_string());
        let config = TriggerConfig::from_raw(&raw).unwrap();
        assert!(config.active_area_only);
    }

    #[test]
    fn decoder_type_auto_resolves_by_system() {
        assert_eq!(
            DecoderType::Auto.resolve(VideoSystem::Pal),
            DecoderType::Transform2D
        );
        assert_eq!(
            DecoderType::Auto.resolve(VideoSystem::Ntsc),
            DecoderType::Ntsc2D
        );
    }

    #[test]
    fn temporal_context_matches_kernel() {
        assert_eq!(DecoderType::Transform3D.temporal_context(), (2, 4));
        assert_eq!(DecoderType::Ntsc3D.temporal_context(), (1, 2));
        assert_eq!(DecoderType::Mono.temporal_context(), (0, 0));
    }

    fn params() -> VideoParameters {
        VideoParameters {
            system: VideoSystem::Pal,
            field_width: 1135,
            field_height: 313,
            active_video_start: 186,
            active_video_end: 1106,
            first_active_frame_line: 22,
            last_active_frame_line: 620,
            black_16b_ire: 16384,
            white_16b_ire: 54016,
            is_subcarrier_locked: true,
            is_widescreen: false,
            active_area_cropping_applied: false,
        }
    }

    #[test]
    fn valid_params_pass_validation() {
        assert!(params().validate().is_ok());
    }

    #[test]
    fn inverted_ire_calibration_rejected() {
        let mut p = params();
        p.black_16b_ire = p.white_16b_ire;
        assert!(p.validate().is_err());
    }
}
