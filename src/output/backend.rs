//! Output backend abstraction: wraps a [`super::writer::OutputWriter`]
//! in something that actually persists frames. Grounded on the
//! original pool's split between an `OutputBackend` interface, a
//! working `RawOutputBackend`, and an FFmpeg-fed encoder backend that
//! this crate only states the contract for.

use std::fs::File;
use std::io::{BufWriter, Write};

use crate::error::{Error, Result};
use crate::field::{FieldId, VideoFieldRepresentation};
use crate::frame::ComponentFrame;
use crate::params::VideoParameters;

use super::writer::{OutputConfig, OutputWriter};

/// Where encoded output goes and how frames get there.
///
/// `write_audio` defaults to a no-op: only a backend that embeds audio
/// (an FFmpeg-fed encoder, not provided here) needs to override it.
pub trait OutputBackend {
    fn initialize(&mut self, output_path: &str, video_parameters: &mut VideoParameters, config: OutputConfig) -> Result<()>;
    fn write_frame(&mut self, frame: &ComponentFrame) -> Result<()>;
    /// Passes one field's worth of raw audio samples through untouched.
    /// Called once per field when the source reports `has_audio()`.
    fn write_audio(&mut self, samples: &[i16]) -> Result<()> {
        let _ = samples;
        Ok(())
    }
    fn finalize(&mut self) -> Result<()>;
    fn format_info(&self) -> String;
}

/// Writes RGB48/YUV444P16/GRAY16 samples (optionally yuv4mpeg2-framed)
/// straight to a file. Video-only: audio is acknowledged but discarded,
/// matching the original raw backend, which has no audio path at all.
pub struct RawFileBackend {
    writer: Option<OutputWriter>,
    file: Option<BufWriter<File>>,
    frames_written: u64,
}

impl Default for RawFileBackend {
    fn default() -> Self {
        RawFileBackend {
            writer: None,
            file: None,
            frames_written: 0,
        }
    }
}

impl RawFileBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputBackend for RawFileBackend {
    fn initialize(&mut self, output_path: &str, video_parameters: &mut VideoParameters, config: OutputConfig) -> Result<()> {
        let writer = OutputWriter::new(video_parameters, config);
        let file = File::create(output_path).map_err(Error::OutputFileOpen)?;
        let mut file = BufWriter::new(file);

        let header = writer.stream_header()?;
        if !header.is_empty() {
            file.write_all(header.as_bytes())?;
        }

        log::debug!("RawFileBackend: initialized {} output to {output_path}", writer.pixel_name());
        self.writer = Some(writer);
        self.file = Some(file);
        self.frames_written = 0;
        Ok(())
    }

    fn write_frame(&mut self, frame: &ComponentFrame) -> Result<()> {
        let writer = self.writer.as_ref().ok_or_else(|| Error::BackendInit("write_frame called before initialize".into()))?;
        let file = self.file.as_mut().ok_or_else(|| Error::BackendInit("write_frame called before initialize".into()))?;

        let frame_header = writer.frame_header();
        if !frame_header.is_empty() {
            file.write_all(frame_header.as_bytes())?;
        }

        let samples = writer.convert(frame);
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        file.write_all(&bytes)?;

        self.frames_written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            log::debug!("RawFileBackend: wrote {} frames", self.frames_written);
        }
        Ok(())
    }

    fn format_info(&self) -> String {
        match &self.writer {
            Some(w) => w.pixel_name().to_string(),
            None => "uninitialized".to_string(),
        }
    }
}

/// Feeds a source's per-field audio straight to a backend that embeds
/// it, untouched: the original decoder pool reads audio once per
/// field and forwards it to the FFmpeg backend without resampling or
/// format conversion.
pub fn passthrough_audio(source: &dyn VideoFieldRepresentation, field_id: FieldId, backend: &mut dyn OutputBackend) -> Result<()> {
    if !source.has_audio() {
        return Ok(());
    }
    let samples = source.get_audio_samples(field_id);
    if !samples.is_empty() {
        backend.write_audio(&samples)?;
    }
    Ok(())
}

/// Contract-only stand-in for an FFmpeg-fed codec backend (mp4-h264,
/// mov-prores, etc). Not implemented in this crate: there is no
/// FFmpeg binding here, only the interface a real one would satisfy.
pub struct CodecBackend;

impl OutputBackend for CodecBackend {
    fn initialize(&mut self, _output_path: &str, _video_parameters: &mut VideoParameters, _config: OutputConfig) -> Result<()> {
        Err(Error::BackendInit("codec output backends require an FFmpeg binding, which this crate does not provide".into()))
    }

    fn write_frame(&mut self, _frame: &ComponentFrame) -> Result<()> {
        Err(Error::BackendInit("codec output backend is a contract stub".into()))
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }

    fn format_info(&self) -> String {
        "codec (unimplemented)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{OutputFormat, VideoSystem};

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
    fn write_frame_before_initialize_is_an_error() {
        let mut backend = RawFileBackend::new();
        let frame = ComponentFrame::new_black(&params());
        assert!(backend.write_frame(&frame).is_err());
    }

    #[test]
    fn initialize_then_write_then_finalize_round_trips_to_a_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("tbc-chroma-decode-test-{}.raw", std::process::id()));
        let path_str = path.to_str().unwrap().to_string();

        let mut p = params();
        let mut backend = RawFileBackend::new();
        backend
            .initialize(&path_str, &mut p, OutputConfig { pixel_format: OutputFormat::Gray16, output_y4m: false, padding_amount: 1 })
            .unwrap();
        let frame = ComponentFrame::new_black(&p);
        backend.write_frame(&frame).unwrap();
        backend.finalize().unwrap();

        let written = std::fs::read(&path).unwrap();
        assert!(!written.is_empty());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn codec_backend_reports_unimplemented() {
        let mut backend = CodecBackend;
        let mut p = params();
        let err = backend
            .initialize("out.mp4", &mut p, OutputConfig { pixel_format: OutputFormat::Yuv444P16, output_y4m: false, padding_amount: 1 })
            .unwrap_err();
        assert!(matches!(err, Error::BackendInit(_)));
    }
}
