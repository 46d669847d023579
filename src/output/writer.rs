//! Pixel-format conversion, active-area padding and Y4M stream framing.

use crate::error::{Error, Result};
use crate::frame::ComponentFrame;
use crate::params::{OutputFormat, VideoParameters, VideoSystem};

// Limits, zero points and scaling factors (from 0-1) for Y'CbCr colour
// representations [Poynton ch25 p305] [BT.601-7 sec 2.5.3].
const Y_MIN: f64 = 1.0 * 256.0;
const Y_ZERO: f64 = 16.0 * 256.0;
const Y_SCALE: f64 = 219.0 * 256.0;
const Y_MAX: f64 = 254.75 * 256.0;
const C_MIN: f64 = 1.0 * 256.0;
const C_ZERO: f64 = 128.0 * 256.0;
const C_SCALE: f64 = 112.0 * 256.0;
const C_MAX: f64 = 254.75 * 256.0;

// ITU-R BT.601-7 [Poynton eq 25.1 p303 and eq 25.5 p307].
const ONE_MINUS_KB: f64 = 1.0 - 0.114;
const ONE_MINUS_KR: f64 = 1.0 - 0.299;

// kB = sqrt(209556997.0 / 96146491.0) / 3.0
// kR = sqrt(221990474.0 / 288439473.0)
// [Poynton eq 28.1 p336]
const KB: f64 = 0.492_111_041_122_483_56;
const KR: f64 = 0.877_283_219_938_178_7;

/// Configuration surface for pixel conversion, padding and Y4M framing.
#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    pub pixel_format: OutputFormat,
    pub output_y4m: bool,
    /// 1 = no padding; otherwise the active rectangle is grown until
    /// both dimensions are divisible by this factor.
    pub padding_amount: u32,
}

/// Converts decoded [`ComponentFrame`]s into one of the supported
/// output pixel layouts, applying any configured padding and emitting
/// a yuv4mpeg2 stream/frame header when requested.
pub struct OutputWriter {
    config: OutputConfig,
    video_parameters: VideoParameters,
    active_width: usize,
    active_height: usize,
    output_height: usize,
    top_pad_lines: usize,
    bottom_pad_lines: usize,
}

impl OutputWriter {
    /// Builds a writer for `config`, expanding `video_parameters`'
    /// active rectangle in place (both on the caller's copy and the
    /// writer's own) so the output dimensions are divisible by
    /// `config.padding_amount`. A no-op when that factor is 1.
    pub fn new(video_parameters: &mut VideoParameters, config: OutputConfig) -> Self {
        let active_height = video_parameters.last_active_frame_line - video_parameters.first_active_frame_line;
        let mut start = video_parameters.active_video_start as i64;
        let mut end = video_parameters.active_video_end as i64;
        let mut top_pad_lines = 0usize;
        let mut bottom_pad_lines = 0usize;
        let mut output_height = active_height;

        if config.padding_amount > 1 {
            let padding = i64::from(config.padding_amount);
            loop {
                let width = end - start;
                if width % padding == 0 {
                    break;
                }
                if width % 2 == 0 {
                    end += 1;
                } else {
                    start -= 1;
                }
            }
            loop {
                output_height = top_pad_lines + active_height + bottom_pad_lines;
                if output_height % config.padding_amount as usize == 0 {
                    break;
                }
                if output_height % 2 == 0 {
                    bottom_pad_lines += 1;
                } else {
                    top_pad_lines += 1;
                }
            }
            video_parameters.active_video_start = start.max(0) as usize;
            video_parameters.active_video_end = end as usize;
            log::debug!(
                "output padding expanded active area to {}..{} x {} top/{} bottom pad lines",
                video_parameters.active_video_start,
                video_parameters.active_video_end,
                output_height,
                top_pad_lines,
            );
        }

        let active_width = (end - start) as usize;

        OutputWriter {
            config,
            video_parameters: *video_parameters,
            active_width,
            active_height,
            output_height,
            top_pad_lines,
            bottom_pad_lines,
        }
    }

    pub fn active_width(&self) -> usize {
        self.active_width
    }

    pub fn output_height(&self) -> usize {
        self.output_height
    }

    pub fn pixel_name(&self) -> &'static str {
        match self.config.pixel_format {
            OutputFormat::Rgb48 => "RGB48",
            OutputFormat::Yuv444P16 => "YUV444P16",
            OutputFormat::Gray16 => "GRAY16",
        }
    }

    /// Number of `u16` samples one converted frame occupies.
    pub fn frame_sample_count(&self) -> usize {
        match self.config.pixel_format {
            OutputFormat::Rgb48 | OutputFormat::Yuv444P16 => self.active_width * self.output_height * 3,
            OutputFormat::Gray16 => self.active_width * self.output_height,
        }
    }

    /// The yuv4mpeg2 stream header, or an empty string when
    /// `output_y4m` is unset. Errors if `output_y4m` is set with a
    /// pixel format the format has no tag for: RGB48 isn't a valid
    /// Y4M colourspace here.
    pub fn stream_header(&self) -> Result<String> {
        if !self.config.output_y4m {
            return Ok(String::new());
        }

        let format_tag = match self.config.pixel_format {
            OutputFormat::Yuv444P16 => "C444p16 XCOLORRANGE=LIMITED",
            OutputFormat::Gray16 => "Cmono16 XCOLORRANGE=LIMITED",
            OutputFormat::Rgb48 => {
                return Err(Error::UnsupportedOutputFormat("RGB48 cannot be wrapped in a yuv4mpeg2 stream".into()));
            }
        };

        let frame_rate = if self.video_parameters.system == VideoSystem::Pal { "F25:1" } else { "F30000:1001" };
        let field_order = if (self.video_parameters.first_active_frame_line % 2) ^ (self.top_pad_lines % 2) == 1 {
            "Ib"
        } else {
            "It"
        };
        let par = match (self.video_parameters.system, self.video_parameters.is_widescreen) {
            (VideoSystem::Pal, true) => "A865:779",
            (VideoSystem::Pal, false) => "A259:311",
            (_, true) => "A25:22",
            (_, false) => "A352:413",
        };

        Ok(format!(
            "YUV4MPEG2 W{} H{} {frame_rate} {field_order} {par} {format_tag}\n",
            self.active_width, self.output_height,
        ))
    }

    /// Per-frame yuv4mpeg2 marker, or empty when `output_y4m` is unset.
    pub fn frame_header(&self) -> &'static str {
        if self.config.output_y4m {
            "FRAME\n"
        } else {
            ""
        }
    }

    /// Converts one decoded frame into this writer's pixel layout.
    /// `GRAY16` is a single plane; `YUV444P16` is three planar blocks
    /// (Y, then Cb, then Cr); `RGB48` is interleaved per sample.
    pub fn convert(&self, frame: &ComponentFrame) -> Vec<u16> {
        let mut out = vec![0u16; self.frame_sample_count()];
        self.clear_pad_lines(0, self.top_pad_lines, &mut out);
        self.clear_pad_lines(self.output_height - self.bottom_pad_lines, self.bottom_pad_lines, &mut out);
        for line in 0..self.active_height {
            self.convert_line(line, frame, &mut out);
        }
        out
    }

    fn clear_pad_lines(&self, first_line: usize, num_lines: usize, out: &mut [u16]) {
        if num_lines == 0 {
            return;
        }
        match self.config.pixel_format {
            OutputFormat::Rgb48 => {
                let start = self.active_width * first_line * 3;
                out[start..start + num_lines * self.active_width * 3].fill(0);
            }
            OutputFormat::Yuv444P16 => {
                let plane_len = self.active_width * self.output_height;
                let y_start = self.active_width * first_line;
                let span = num_lines * self.active_width;
                out[y_start..y_start + span].fill(Y_ZERO as u16);
                out[plane_len + y_start..plane_len + y_start + span].fill(C_ZERO as u16);
                out[2 * plane_len + y_start..2 * plane_len + y_start + span].fill(C_ZERO as u16);
            }
            OutputFormat::Gray16 => {
                let y_start = self.active_width * first_line;
                out[y_start..y_start + num_lines * self.active_width].fill(Y_ZERO as u16);
            }
        }
    }

    fn convert_line(&self, line_number: usize, frame: &ComponentFrame, out: &mut [u16]) {
        let (input_line, x_offset) = if self.video_parameters.active_area_cropping_applied {
            (line_number, 0)
        } else {
            (self.video_parameters.first_active_frame_line + line_number, self.video_parameters.active_video_start)
        };
        let output_line = self.top_pad_lines + line_number;
        let y_offset = f64::from(self.video_parameters.black_16b_ire);
        let range = self.video_parameters.ire_gain();

        match self.config.pixel_format {
            OutputFormat::Rgb48 => {
                let y_scale = 65535.0 / range;
                let uv_scale = 65535.0 / range;
                let base = self.active_width * output_line * 3;
                for x in 0..self.active_width {
                    let in_y = frame.y.get(input_line, x_offset + x);
                    let in_u = frame.u.get(input_line, x_offset + x);
                    let in_v = frame.v.get(input_line, x_offset + x);
                    let r_y = ((in_y - y_offset) * y_scale).clamp(0.0, 65535.0);
                    let r_u = in_u * uv_scale;
                    let r_v = in_v * uv_scale;
                    let pos = base + x * 3;
                    out[pos] = (r_y + 1.139_883 * r_v).clamp(0.0, 65535.0) as u16;
                    out[pos + 1] = (r_y - 0.394_642 * r_u - 0.580_622 * r_v).clamp(0.0, 65535.0) as u16;
                    out[pos + 2] = (r_y + 2.032_062 * r_u).clamp(0.0, 65535.0) as u16;
                }
            }
            OutputFormat::Yuv444P16 => {
                let plane_len = self.active_width * self.output_height;
                let y_base = self.active_width * output_line;
                let y_scale = Y_SCALE / range;
                let cb_scale = (C_SCALE / (ONE_MINUS_KB * KB)) / range;
                let cr_scale = (C_SCALE / (ONE_MINUS_KR * KR)) / range;
                for x in 0..self.active_width {
                    let in_y = frame.y.get(input_line, x_offset + x);
                    let in_u = frame.u.get(input_line, x_offset + x);
                    let in_v = frame.v.get(input_line, x_offset + x);
                    out[y_base + x] = (((in_y - y_offset) * y_scale) + Y_ZERO).clamp(Y_MIN, Y_MAX) as u16;
                    out[plane_len + y_base + x] = ((in_u * cb_scale) + C_ZERO).clamp(C_MIN, C_MAX) as u16;
                    out[2 * plane_len + y_base + x] = ((in_v * cr_scale) + C_ZERO).clamp(C_MIN, C_MAX) as u16;
                }
            }
            OutputFormat::Gray16 => {
                let y_base = self.active_width * output_line;
                let y_scale = Y_SCALE / range;
                for x in 0..self.active_width {
                    let in_y = frame.y.get(input_line, x_offset + x);
                    out[y_base + x] = (((in_y - y_offset) * y_scale) + Y_ZERO).clamp(Y_MIN, Y_MAX) as u16;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> VideoParameters {
        VideoParameters {
            system: VideoSystem::Pal,
            field_width: 48,
            field_height: 20,
            active_video_start: 6,
            active_video_end: 42,
            first_active_frame_line: 4,
            last_active_frame_line: 34,
            black_16b_ire: 16384,
            white_16b_ire: 54016,
            is_subcarrier_locked: true,
            is_widescreen: false,
            active_area_cropping_applied: false,
        }
    }

    #[test]
    fn no_padding_leaves_active_rectangle_untouched() {
        let mut p = params();
        let writer = OutputWriter::new(&mut p, OutputConfig { pixel_format: OutputFormat::Gray16, output_y4m: false, padding_amount: 1 });
        assert_eq!(writer.active_width(), 36);
        assert_eq!(writer.output_height(), 30);
        assert_eq!(p.active_video_start, 6);
    }

    #[test]
    fn padding_expands_dimensions_to_multiple_of_eight() {
        let mut p = params();
        let writer = OutputWriter::new(&mut p, OutputConfig { pixel_format: OutputFormat::Gray16, output_y4m: false, padding_amount: 8 });
        assert_eq!(writer.active_width() % 8, 0);
        assert_eq!(writer.output_height() % 8, 0);
        assert_eq!(p.active_video_end - p.active_video_start, writer.active_width());
    }

    #[test]
    fn y4m_header_matches_expected_format_for_gray16() {
        let mut p = params();
        let writer = OutputWriter::new(&mut p, OutputConfig { pixel_format: OutputFormat::Gray16, output_y4m: true, padding_amount: 1 });
        let header = writer.stream_header().unwrap();
        assert_eq!(header, "YUV4MPEG2 W36 H30 F25:1 It A259:311 Cmono16 XCOLORRANGE=LIMITED\n");
    }

    #[test]
    fn rgb48_in_y4m_is_rejected() {
        let mut p = params();
        let writer = OutputWriter::new(&mut p, OutputConfig { pixel_format: OutputFormat::Rgb48, output_y4m: true, padding_amount: 1 });
        assert!(writer.stream_header().is_err());
    }

    #[test]
    fn no_y4m_header_is_empty() {
        let mut p = params();
        let writer = OutputWriter::new(&mut p, OutputConfig { pixel_format: OutputFormat::Rgb48, output_y4m: false, padding_amount: 1 });
        assert_eq!(writer.stream_header().unwrap(), "");
        assert_eq!(writer.frame_header(), "");
    }

    #[test]
    fn black_frame_converts_to_y_zero_with_gray16() {
        let mut p = params();
        let writer = OutputWriter::new(&mut p, OutputConfig { pixel_format: OutputFormat::Gray16, output_y4m: false, padding_amount: 1 });
        let frame = ComponentFrame::new_black(&p);
        let out = writer.convert(&frame);
        assert!(out.iter().all(|&s| s == Y_ZERO as u16));
    }
}
