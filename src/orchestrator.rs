//! Decode orchestrator: partitions a frame range across
//! worker threads, builds per-frame field windows with look-behind/
//! look-ahead padding, and dispatches to one decoder kernel instance
//! per thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::decoders::DecoderKernel;
use crate::error::{Error, Result};
use crate::field::{FieldId, SourceField, VideoFieldRepresentation};
use crate::frame::ComponentFrame;
use crate::output::backend::passthrough_audio;
use crate::output::{OutputBackend, OutputConfig};
use crate::params::{TriggerConfig, VideoParameters};

/// Caller-owned cancellation handle: the atomic cancellation flag is
/// per-call shared state. Cheap to check; never blocks a worker
/// mid-frame.
#[derive(Default)]
pub struct CancellationFlag(AtomicBool);

impl CancellationFlag {
    pub fn new() -> Self {
        CancellationFlag(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a full decode run. Cancellation is a distinct, non-error
/// outcome: returned as a distinct outcome, not an error.
pub enum DecodeOutcome {
    Completed(Vec<ComponentFrame>),
    Cancelled,
}

/// Runs one decode invocation over `[start_frame, end_frame)` of
/// `source`'s fields, honoring `trigger`'s configuration.
///
/// `progress` is invoked as `progress(frames_done, frames_total)` from
/// worker threads; it must be reentrant.
pub fn decode(
    source: &dyn VideoFieldRepresentation,
    trigger: &TriggerConfig,
    start_frame: u64,
    end_frame: u64,
    cancellation: &CancellationFlag,
    progress: &(dyn Fn(u64, u64) + Send + Sync),
) -> Result<DecodeOutcome> {
    let params = source.get_video_parameters().ok_or(Error::MissingVideoParameters)?;
    params.validate()?;

    let decoder_type = trigger.decoder_type.resolve(params.system);
    let (look_behind, look_ahead) = decoder_type.temporal_context();

    let num_frames = end_frame.saturating_sub(start_frame);
    log_decode_summary(&params, decoder_type, num_frames, trigger.threads);

    if num_frames == 0 {
        return Ok(DecodeOutcome::Completed(Vec::new()));
    }

    let field_count = source.field_count();
    let extended_start = start_frame as i64 - look_behind as i64;
    let extended_end = end_frame as i64 + look_ahead as i64;
    let fields = load_extended_fields(source, &params, extended_start, extended_end, field_count)?;

    let worker_count = if trigger.threads == 0 {
        std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(1)
    } else {
        trigger.threads
    }
    .min(num_frames as usize)
    .max(1);

    let next_frame = AtomicU64::new(0);
    let output: Vec<Mutex<ComponentFrame>> =
        (0..num_frames).map(|_| Mutex::new(ComponentFrame::new_black(&params))).collect();

    let decode_result = crossbeam::thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let next_frame = &next_frame;
            let output = &output;
            let fields = &fields;
            handles.push(scope.spawn(move |_| -> Result<()> {
                log::debug!("worker {worker_id} constructing kernel");
                let mut kernel = DecoderKernel::build(decoder_type, params, trigger)?;
                loop {
                    if cancellation.is_cancelled() {
                        log::debug!("worker {worker_id} observed cancellation");
                        break;
                    }
                    let local_idx = next_frame.fetch_add(1, Ordering::SeqCst);
                    if local_idx >= num_frames {
                        break;
                    }
                    let window = build_window(fields, local_idx, look_behind, look_ahead);
                    let target = (look_behind * 2)..(look_behind * 2 + 2);
                    let frame = kernel.decode_frame(&window, target).map_err(|e| {
                        log::error!("decode of frame {} failed: {e}", start_frame + local_idx);
                        cancellation.cancel();
                        e
                    })?;
                    *output[local_idx as usize].lock().unwrap() = frame;

                    let done = local_idx + 1;
                    if done % trigger.progress_every == 0 || done == num_frames {
                        progress(done, num_frames);
                    }
                }
                Ok(())
            }));
        }
        for handle in handles {
            handle.join().expect("decoder worker panicked")?;
        }
        Ok(())
    });

    match decode_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e),
        Err(_) => panic!("decode worker thread panicked"),
    }

    if cancellation.is_cancelled() {
        return Ok(DecodeOutcome::Cancelled);
    }

    let frames = output.into_iter().map(|m| m.into_inner().unwrap()).collect();
    Ok(DecodeOutcome::Completed(frames))
}

/// Runs [`decode`] and, once it completes, streams the result through
/// `backend`: `initialize`, one `write_frame` per output frame in
/// order, each frame's audio passed through untouched in between, then
/// `finalize`. A cancelled decode is propagated as-is, without ever
/// touching `backend`.
pub fn decode_to_backend(
    source: &dyn VideoFieldRepresentation,
    trigger: &TriggerConfig,
    start_frame: u64,
    end_frame: u64,
    cancellation: &CancellationFlag,
    progress: &(dyn Fn(u64, u64) + Send + Sync),
    backend: &mut dyn OutputBackend,
) -> Result<DecodeOutcome> {
    let outcome = decode(source, trigger, start_frame, end_frame, cancellation, progress)?;
    let frames = match outcome {
        DecodeOutcome::Cancelled => return Ok(DecodeOutcome::Cancelled),
        DecodeOutcome::Completed(frames) => frames,
    };

    let mut params = source.get_video_parameters().ok_or(Error::MissingVideoParameters)?;
    let config = OutputConfig {
        pixel_format: trigger.output_format,
        output_y4m: trigger.output_y4m,
        padding_amount: trigger.output_padding,
    };
    backend.initialize(&trigger.output_path, &mut params, config)?;

    for (idx, frame) in frames.iter().enumerate() {
        backend.write_frame(frame)?;
        for parity in 0..2u64 {
            let field_id = (start_frame + idx as u64) * 2 + parity;
            passthrough_audio(source, field_id, backend)?;
        }
    }
    backend.finalize()?;

    Ok(DecodeOutcome::Completed(frames))
}

/// Loads `[extended_start, extended_end)` frames' worth of fields,
/// substituting black fields (phase-seeded from field 0) for any that
/// fall outside `[0, field_count)`.
fn load_extended_fields(
    source: &dyn VideoFieldRepresentation,
    params: &VideoParameters,
    extended_start_frame: i64,
    extended_end_frame: i64,
    field_count: u64,
) -> Result<Vec<SourceField>> {
    let phase_seed = source.get_field_phase_hint(0);
    let field_start = extended_start_frame * 2;
    let field_end = extended_end_frame * 2;

    let mut fields = Vec::with_capacity((field_end - field_start).max(0) as usize);
    for fid in field_start..field_end {
        let is_first_field = fid.rem_euclid(2) == 0;
        if fid < 0 || fid as u64 >= field_count {
            fields.push(SourceField::black(fid.unsigned_abs(), is_first_field, phase_seed, params));
        } else {
            let field = SourceField::from_source(source, fid as FieldId, params)
                .ok_or(Error::MissingField(fid as u64))?;
            fields.push(field);
        }
    }
    Ok(fields)
}

/// Slices `fields` down to the window for output-relative frame
/// `local_idx`: `look_behind` frames before, the target's two fields,
/// `look_ahead` frames after — always at the same Z-position within
/// the slice, regardless of how much look-behind/look-ahead context a
/// particular kernel needs.
fn build_window(fields: &[SourceField], local_idx: u64, look_behind: usize, look_ahead: usize) -> Vec<SourceField> {
    let window_fields = (look_behind + 1 + look_ahead) * 2;
    let start = local_idx as usize * 2;
    fields[start..start + window_fields].to_vec()
}

fn log_decode_summary(
    params: &VideoParameters,
    decoder_type: crate::params::DecoderType,
    num_frames: u64,
    threads: usize,
) {
    log::info!(
        "decoding {num_frames} frames, system={:?}, decoder={decoder_type:?}, threads={}",
        params.system,
        if threads == 0 { "auto".to_string() } else { threads.to_string() },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldDescriptor;
    use crate::params::{DecoderType, VideoSystem};

    struct FakeSource {
        params: VideoParameters,
        field_count: u64,
    }

    impl VideoFieldRepresentation for FakeSource {
        fn get_video_parameters(&self) -> Option<VideoParameters> {
            Some(self.params)
        }

        fn field_count(&self) -> u64 {
            self.field_count
        }

        fn field_range(&self) -> (FieldId, FieldId) {
            (0, self.field_count)
        }

        fn has_field(&self, id: FieldId) -> bool {
            id < self.field_count
        }

        fn get_descriptor(&self, id: FieldId) -> Option<FieldDescriptor> {
            if id >= self.field_count {
                return None;
            }
            Some(FieldDescriptor {
                is_first_field: id % 2 == 0,
                width: self.params.field_width,
                height: self.params.field_height,
            })
        }

        fn get_field(&self, id: FieldId) -> Vec<u16> {
            let _ = id;
            vec![self.params.black_16b_ire; self.params.field_width * self.params.field_height]
        }

        fn get_field_phase_hint(&self, id: FieldId) -> Option<u8> {
            let _ = id;
            Some(1)
        }

        fn get_active_line_hint(&self) -> Option<(usize, usize)> {
            Some((self.params.first_active_frame_line, self.params.last_active_frame_line))
        }
    }

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
    fn decodes_requested_frame_range_to_black() {
        let source = FakeSource {
            params: params(),
            field_count: 12,
        };
        let mut trigger = TriggerConfig::default();
        trigger.decoder_type = DecoderType::Mono;
        trigger.threads = 1;
        let cancellation = CancellationFlag::new();
        let outcome = decode(&source, &trigger, 0, 6, &cancellation, &|_, _| {}).unwrap();
        match outcome {
            DecodeOutcome::Completed(frames) => {
                assert_eq!(frames.len(), 6);
                for frame in &frames {
                    assert!(frame.all_finite());
                }
            }
            DecodeOutcome::Cancelled => panic!("unexpected cancellation"),
        }
    }

    #[test]
    fn cancellation_before_decode_yields_cancelled_outcome() {
        let source = FakeSource {
            params: params(),
            field_count: 12,
        };
        let mut trigger = TriggerConfig::default();
        trigger.decoder_type = DecoderType::Mono;
        trigger.threads = 1;
        let cancellation = CancellationFlag::new();
        cancellation.cancel();
        let outcome = decode(&source, &trigger, 0, 6, &cancellation, &|_, _| {}).unwrap();
        assert!(matches!(outcome, DecodeOutcome::Cancelled));
    }

    #[test]
    fn decode_to_backend_drives_initialize_write_frame_and_finalize() {
        use crate::output::backend::RawFileBackend;
        use crate::params::OutputFormat;

        let source = FakeSource {
            params: params(),
            field_count: 12,
        };
        let dir = std::env::temp_dir();
        let path = dir.join(format!("tbc-chroma-decode-orchestrator-test-{}.raw", std::process::id()));
        let path_str = path.to_str().unwrap().to_string();

        let mut trigger = TriggerConfig::default();
        trigger.decoder_type = DecoderType::Mono;
        trigger.threads = 1;
        trigger.output_path = path_str.clone();
        trigger.output_format = OutputFormat::Gray16;
        trigger.output_padding = 1;

        let cancellation = CancellationFlag::new();
        let mut backend = RawFileBackend::new();
        let outcome = decode_to_backend(&source, &trigger, 0, 3, &cancellation, &|_, _| {}, &mut backend).unwrap();
        let DecodeOutcome::Completed(frames) = outcome else {
            panic!("unexpected cancellation")
        };
        assert_eq!(frames.len(), 3);

        let written = std::fs::read(&path).unwrap();
        assert!(!written.is_empty());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn decode_to_backend_propagates_cancellation_without_touching_backend() {
        use crate::output::backend::RawFileBackend;

        let source = FakeSource {
            params: params(),
            field_count: 12,
        };
        let mut trigger = TriggerConfig::default();
        trigger.decoder_type = DecoderType::Mono;
        trigger.threads = 1;
        trigger.output_path = "/nonexistent/should-never-be-opened.raw".to_string();

        let cancellation = CancellationFlag::new();
        cancellation.cancel();
        let mut backend = RawFileBackend::new();
        let outcome = decode_to_backend(&source, &trigger, 0, 6, &cancellation, &|_, _| {}, &mut backend).unwrap();
        assert!(matches!(outcome, DecodeOutcome::Cancelled));
        assert_eq!(backend.format_info(), "uninitialized");
    }
}
