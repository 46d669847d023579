//! `SourceField` adapter and the upstream `VideoFieldRepresentation`
//! interface.

use crate::params::VideoParameters;

/// Opaque 0-based field identifier, chronological within a source.
pub type FieldId = u64;

/// Parity + dimensions of a field, as reported by the source.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub is_first_field: bool,
    pub width: usize,
    pub height: usize,
}

/// A decoder-specific chroma-phase annotation (1-4 for NTSC/PAL comb
/// kernels, 1-2 for simpler burst-locked cases); `None` when the
/// source has no phase hint for this field.
pub type FieldPhaseHint = Option<u8>;

/// Interface to the upstream TBC-metadata reader. Only the contract
/// lives here; no concrete SQLite-backed implementation does.
pub trait VideoFieldRepresentation: Send + Sync {
    fn get_video_parameters(&self) -> Option<VideoParameters>;
    fn field_count(&self) -> u64;
    /// Half-open `[first, last)` range of valid field ids.
    fn field_range(&self) -> (FieldId, FieldId);
    fn has_field(&self, id: FieldId) -> bool;
    fn get_descriptor(&self, id: FieldId) -> Option<FieldDescriptor>;
    /// Full field of 16-bit composite (or luma, if Y/C-split) samples.
    fn get_field(&self, id: FieldId) -> Vec<u16>;
    /// Present only for Y/C-split sources; `None` for composite sources.
    fn get_chroma_field(&self, id: FieldId) -> Option<Vec<u16>> {
        let _ = id;
        None
    }
    fn get_field_phase_hint(&self, id: FieldId) -> FieldPhaseHint;
    fn get_active_line_hint(&self) -> Option<(usize, usize)>;
    fn has_audio(&self) -> bool {
        false
    }
    fn get_audio_samples(&self, id: FieldId) -> Vec<i16> {
        let _ = id;
        Vec::new()
    }
}

/// One field's raw composite samples plus descriptor.
#[derive(Debug, Clone)]
pub struct SourceField {
    pub seq_no: u64,
    pub is_first_field: bool,
    pub field_phase_id: Option<u8>,
    pub data: Vec<u16>,
    pub luma_data: Option<Vec<u16>>,
    pub chroma_data: Option<Vec<u16>>,
}

impl SourceField {
    /// A field carrying nothing but black samples, used to pad
    /// look-behind/look-ahead windows past the edges of the source
    /// `field_phase_id` is cloned from a real field (conventionally
    /// frame 1's) to preserve phase validity.
    pub fn black(
        seq_no: u64,
        is_first_field: bool,
        field_phase_id: Option<u8>,
        params: &VideoParameters,
    ) -> Self {
        let len = params.field_width * params.field_height;
        SourceField {
            seq_no,
            is_first_field,
            field_phase_id,
            data: vec![params.black_16b_ire; len],
            luma_data: None,
            chroma_data: None,
        }
    }

    /// Builds a `SourceField` from the upstream representation,
    /// applying the PAL subcarrier-locked 2-sample left shift to the
    /// second (Bottom-parity) field of a frame.
    pub fn from_source(
        source: &dyn VideoFieldRepresentation,
        id: FieldId,
        params: &VideoParameters,
    ) -> Option<Self> {
        let descriptor = source.get_descriptor(id)?;
        let mut data = source.get_field(id);
        let mut chroma_data = source.get_chroma_field(id);
        // When Y/C-split, `get_field` already returned luma; `data` doubles as `luma_data`.
        let luma_data = chroma_data.as_ref().map(|_| data.clone());
        let field_phase_id = source.get_field_phase_hint(id);

        if params.system == crate::params::VideoSystem::Pal
            && params.is_subcarrier_locked
            && !descriptor.is_first_field
        {
            shift_left_two(&mut data, params.field_width, params.black_16b_ire);
            if let Some(ref mut chroma) = chroma_data {
                shift_left_two(chroma, params.field_width, 0);
            }
        }

        Some(SourceField {
            seq_no: id + 1,
            is_first_field: descriptor.is_first_field,
            field_phase_id,
            data,
            luma_data,
            chroma_data,
        })
    }
}

/// Splits a frame's two fields (as stored consecutively in a decode
/// window) into `(top, bottom)` by parity: the Top-parity field
/// carries a frame's even lines.
pub fn split_top_bottom(fields: &[SourceField]) -> crate::error::Result<(&SourceField, &SourceField)> {
    debug_assert_eq!(fields.len(), 2);
    if fields[0].is_first_field {
        Ok((&fields[0], &fields[1]))
    } else {
        Ok((&fields[1], &fields[0]))
    }
}

/// For a given 0-based frame line, returns the field that carries it
/// and the line index within that field: even frame lines come from
/// the Top-parity field, odd lines from the Bottom-parity field.
pub fn frame_line_source<'a>(
    top: &'a SourceField,
    bottom: &'a SourceField,
    frame_line: usize,
) -> (&'a SourceField, usize) {
    if frame_line % 2 == 0 {
        (top, frame_line / 2)
    } else {
        (bottom, frame_line / 2)
    }
}

/// Shifts every line of a field left by two samples, dropping the
/// first two and padding the tail with `black`. PAL subcarrier-locked
/// bottom fields are phase-shifted by 2 samples before any
/// chroma-phase-sensitive processing.
fn shift_left_two(data: &mut [u16], width: usize, black: u16) {
    for line in data.chunks_mut(width) {
        if width <= 2 {
            continue;
        }
        line.copy_within(2.., 0);
        line[width - 2] = black;
        line[width - 1] = black;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_left_two_drops_head_and_pads_tail() {
        let mut data = vec![1u16, 2, 3, 4, 5, 6];
        shift_left_two(&mut data, 3, 0);
        // Two lines of width 3: [1,2,3] -> [3,0,0], [4,5,6] -> [6,0,0]
        assert_eq!(data, vec![3, 0, 0, 6, 0, 0]);
    }

    #[test]
    fn black_field_has_correct_length_and_value() {
        let params = VideoParameters {
            system: crate::params::VideoSystem::Pal,
            field_width: 10,
            field_height: 5,
            active_video_start: 1,
            active_video_end: 9,
            first_active_frame_line: 0,
            last_active_frame_line: 8,
            black_16b_ire: 1000,
            white_16b_ire: 5000,
            is_subcarrier_locked: false,
            is_widescreen: false,
            active_area_cropping_applied: false,
        };
        let field = SourceField::black(1, true, None, &params);
        assert_eq!(field.data.len(), 50);
        assert!(field.data.iter().all(|&s| s == 1000));
    }
}
