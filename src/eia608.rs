//! EIA-608 closed-caption decoder: a state machine independent of the
//! video pipeline, translating timestamped byte pairs read from TBC
//! metadata into timed caption cues.

const MAX_ROWS: usize = 15;

/// Caption display mode a decoder instance is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionMode {
    PopOn,
    RollUp,
    PaintOn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlCode {
    Rcl,
    Eoc,
    Edm,
    Enm,
    Cr,
    Ru2,
    Ru3,
    Ru4,
    Rdc,
}

/// One emitted or in-flight caption. `end_time < 0.0` marks a cue
/// still open (not yet closed by an EOC/EDM/CR/finalize).
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCue {
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

/// 15-row text buffer with a cursor, rows addressed 0-14.
#[derive(Debug, Clone)]
struct CaptionBuffer {
    rows: [String; MAX_ROWS],
    row: usize,
    col: usize,
}

impl Default for CaptionBuffer {
    fn default() -> Self {
        CaptionBuffer {
            rows: Default::default(),
            row: MAX_ROWS - 1,
            col: 0,
        }
    }
}

impl CaptionBuffer {
    fn clear(&mut self) {
        for row in &mut self.rows {
            row.clear();
        }
        self.row = MAX_ROWS - 1;
        self.col = 0;
    }

    fn set_cursor(&mut self, row: usize, col: usize) {
        self.row = row.min(MAX_ROWS - 1);
        self.col = col;
        self.pad_to_cursor();
    }

    fn next_row(&mut self) {
        if self.row < MAX_ROWS - 1 {
            self.row += 1;
        }
        self.col = 0;
    }

    /// Writes beyond the nominal 32-column limit are accepted: the
    /// target format (timed text cues) has no column constraint, so
    /// there's nothing to clamp against.
    fn write_char(&mut self, c: char) {
        self.pad_to_cursor();
        let row = &mut self.rows[self.row];
        if self.col >= row.chars().count() {
            row.push(c);
        } else {
            replace_char_at(row, self.col, c);
        }
        self.col += 1;
    }

    fn pad_to_cursor(&mut self) {
        let row = &mut self.rows[self.row];
        let len = row.chars().count();
        if len < self.col {
            row.extend(std::iter::repeat(' ').take(self.col - len));
        }
    }

    /// Trims each row and joins the non-empty ones with a single space.
    fn render(&self) -> String {
        self.rows
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn roll_up(&mut self) {
        for i in 0..MAX_ROWS - 1 {
            self.rows[i] = std::mem::take(&mut self.rows[i + 1]);
        }
        self.rows[MAX_ROWS - 1].clear();
        self.row = MAX_ROWS - 1;
        self.col = 0;
    }
}

fn replace_char_at(s: &mut String, index: usize, c: char) {
    let byte_start = s.char_indices().nth(index).map(|(i, _)| i).unwrap();
    let byte_end = s.char_indices().nth(index + 1).map(|(i, _)| i).unwrap_or(s.len());
    s.replace_range(byte_start..byte_end, &c.to_string());
}

const EOC_DEDUP_WINDOW: f64 = 0.1;

/// State machine consuming one `(byte1, byte2)` EIA-608 data pair at
/// a time and accumulating caption cues.
pub struct Eia608Decoder {
    mode: CaptionMode,
    displayed: CaptionBuffer,
    non_displayed: CaptionBuffer,
    rollup_rows: u8,
    current_time: f64,
    last_eoc_time: f64,
    active_cues: Vec<CaptionCue>,
    emitted_cues: Vec<CaptionCue>,
}

impl Default for Eia608Decoder {
    fn default() -> Self {
        Eia608Decoder {
            mode: CaptionMode::PopOn,
            displayed: CaptionBuffer::default(),
            non_displayed: CaptionBuffer::default(),
            rollup_rows: 2,
            current_time: 0.0,
            last_eoc_time: -1.0,
            active_cues: Vec::new(),
            emitted_cues: Vec::new(),
        }
    }
}

impl Eia608Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> CaptionMode {
        self.mode
    }

    /// Processes one data-channel-1 byte pair, already parity-stripped.
    pub fn process_bytes(&mut self, timestamp: f64, byte1: u8, byte2: u8) {
        self.current_time = timestamp;

        if (0x10..=0x1f).contains(&byte1) {
            if let Some(code) = decode_control_code(byte1, byte2) {
                self.handle_control_code(code);
                return;
            }
            if let Some((row, col)) = decode_pac(byte1, byte2) {
                let buffer = if self.mode == CaptionMode::PopOn { &mut self.non_displayed } else { &mut self.displayed };
                buffer.set_cursor(row, col);
            }
            return;
        }

        if (0x20..=0x7f).contains(&byte1) {
            self.handle_printable(byte1 as char);
        }
        if (0x20..=0x7f).contains(&byte2) {
            self.handle_printable(byte2 as char);
        }
    }

    /// Closes every open cue at `end_time`, emits them, and returns
    /// every cue this decoder has emitted.
    pub fn finalize(mut self, end_time: f64) -> Vec<CaptionCue> {
        self.current_time = end_time;
        self.close_all_cues();
        self.emitted_cues
    }

    fn handle_printable(&mut self, c: char) {
        match self.mode {
            CaptionMode::PopOn => self.non_displayed.write_char(c),
            CaptionMode::RollUp => {
                self.displayed.write_char(c);
                self.ensure_rollup_cue_started();
            }
            CaptionMode::PaintOn => {
                self.displayed.write_char(c);
                self.append_painton_char(c);
            }
        }
    }

    fn handle_control_code(&mut self, code: ControlCode) {
        match code {
            ControlCode::Rcl => {
                if self.mode != CaptionMode::PopOn {
                    self.non_displayed.clear();
                }
                self.mode = CaptionMode::PopOn;
            }
            ControlCode::Eoc => {
                if self.mode != CaptionMode::PopOn {
                    return;
                }
                if self.current_time - self.last_eoc_time < EOC_DEDUP_WINDOW {
                    return;
                }
                self.last_eoc_time = self.current_time;

                self.close_all_cues();
                std::mem::swap(&mut self.displayed, &mut self.non_displayed);
                self.open_popon_cue();
                self.non_displayed.clear();
            }
            ControlCode::Edm => {
                self.close_all_cues();
                self.displayed.clear();
            }
            ControlCode::Enm => self.non_displayed.clear(),
            ControlCode::Cr => match self.mode {
                CaptionMode::RollUp => self.roll_up(),
                CaptionMode::PopOn => self.non_displayed.next_row(),
                CaptionMode::PaintOn => self.displayed.next_row(),
            },
            ControlCode::Ru2 | ControlCode::Ru3 | ControlCode::Ru4 => {
                self.close_all_cues();
                self.mode = CaptionMode::RollUp;
                self.rollup_rows = match code {
                    ControlCode::Ru2 => 2,
                    ControlCode::Ru3 => 3,
                    _ => 4,
                };
            }
            ControlCode::Rdc => {
                self.close_all_cues();
                self.mode = CaptionMode::PaintOn;
            }
        }
    }

    fn open_popon_cue(&mut self) {
        let text = self.displayed.render();
        if text.is_empty() {
            return;
        }
        self.active_cues.push(CaptionCue {
            start_time: self.current_time,
            end_time: -1.0,
            text,
        });
    }

    fn ensure_rollup_cue_started(&mut self) {
        let text = self.displayed.render();
        match self.active_cues.first_mut() {
            Some(cue) => cue.text = text,
            None => self.active_cues.push(CaptionCue {
                start_time: self.current_time,
                end_time: -1.0,
                text,
            }),
        }
    }

    fn roll_up(&mut self) {
        if let Some(cue) = self.active_cues.first().cloned() {
            let mut closed = cue;
            closed.end_time = self.current_time;
            self.emit_cue(closed);
            self.active_cues.clear();
        }
        self.displayed.roll_up();
    }

    fn append_painton_char(&mut self, c: char) {
        if self.active_cues.is_empty() {
            self.active_cues.push(CaptionCue {
                start_time: self.current_time,
                end_time: -1.0,
                text: String::new(),
            });
        }
        self.active_cues[0].text.push(c);
    }

    fn close_all_cues(&mut self) {
        let closing: Vec<CaptionCue> = self
            .active_cues
            .drain(..)
            .map(|mut cue| {
                cue.end_time = self.current_time;
                cue
            })
            .collect();
        for cue in closing {
            self.emit_cue(cue);
        }
    }

    fn emit_cue(&mut self, cue: CaptionCue) {
        if cue.end_time <= cue.start_time {
            return;
        }
        let text = cue.text.trim();
        if text.is_empty() {
            return;
        }
        self.emitted_cues.push(CaptionCue {
            start_time: cue.start_time,
            end_time: cue.end_time,
            text: text.to_string(),
        });
    }
}

/// Two-byte miscellaneous control codes, data channel 1 (`0x14`) or
/// its field-2 alias (`0x1C`). Data channel 2 PACs use the same first
/// byte range as channel 1's control codes; this decoder does not
/// distinguish channels and so never recognizes channel 2 captions —
/// an acknowledged gap, not a bug to fix here.
fn decode_control_code(byte1: u8, byte2: u8) -> Option<ControlCode> {
    if byte1 != 0x14 && byte1 != 0x1c {
        return None;
    }
    if !(0x20..=0x2f).contains(&byte2) {
        return None;
    }
    match byte2 {
        0x20 => Some(ControlCode::Rcl),
        0x25 => Some(ControlCode::Ru2),
        0x26 => Some(ControlCode::Ru3),
        0x27 => Some(ControlCode::Ru4),
        0x29 => Some(ControlCode::Rdc),
        0x2c => Some(ControlCode::Edm),
        0x2d => Some(ControlCode::Cr),
        0x2e => Some(ControlCode::Enm),
        0x2f => Some(ControlCode::Eoc),
        _ => None,
    }
}

/// Preamble Address Code: positions the cursor at `(row, column)`.
/// `byte1` selects a row pair, bit 5 of `byte2` picks one of the pair;
/// an indent PAC (`byte2` bit 4 set) also sets the column.
fn decode_pac(byte1: u8, byte2: u8) -> Option<(usize, usize)> {
    if !(0x40..=0x7f).contains(&byte2) {
        return None;
    }
    let high = byte2 & 0x20 != 0;
    let base_row: i32 = match byte1 {
        0x11 => if high { 2 } else { 1 },
        0x12 => if high { 4 } else { 3 },
        0x15 => if high { 6 } else { 5 },
        0x16 => if high { 8 } else { 7 },
        0x17 => if high { 10 } else { 9 },
        0x10 => if high { 12 } else { 11 },
        0x13 => if high { 14 } else { 13 },
        0x14 => if high { 15 } else { 14 },
        _ => return None,
    };
    let row = (base_row - 1) as usize;
    let col = if byte2 & 0x10 != 0 { ((byte2 & 0x0e) >> 1) as usize * 4 } else { 0 };
    Some((row, col))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_text(decoder: &mut Eia608Decoder, t: f64, text: &str) {
        let bytes: Vec<u8> = text.bytes().collect();
        for pair in bytes.chunks(2) {
            let b1 = pair[0];
            let b2 = pair.get(1).copied().unwrap_or(0x00);
            decoder.process_bytes(t, b1, b2);
        }
    }

    #[test]
    fn pop_on_cue_lifecycle_emits_one_cue() {
        let mut decoder = Eia608Decoder::new();
        decoder.process_bytes(1.0, 0x14, 0x20); // RCL
        send_text(&mut decoder, 1.0, "Hello");
        decoder.process_bytes(1.0, 0x14, 0x2f); // EOC
        decoder.process_bytes(3.0, 0x14, 0x2c); // EDM
        let cues = decoder.finalize(4.0);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Hello");
        assert_eq!(cues[0].start_time, 1.0);
        assert_eq!(cues[0].end_time, 3.0);
    }

    #[test]
    fn duplicate_eoc_within_window_is_ignored() {
        let mut decoder = Eia608Decoder::new();
        decoder.process_bytes(1.0, 0x14, 0x20);
        send_text(&mut decoder, 1.0, "Hi");
        decoder.process_bytes(1.0, 0x14, 0x2f);
        decoder.process_bytes(1.05, 0x14, 0x2f); // duplicate EOC, same field pair
        decoder.process_bytes(2.0, 0x14, 0x2c);
        let cues = decoder.finalize(3.0);
        assert_eq!(cues.len(), 1);
    }

    #[test]
    fn roll_up_emits_cue_on_carriage_return() {
        let mut decoder = Eia608Decoder::new();
        decoder.process_bytes(0.0, 0x14, 0x25); // RU2
        send_text(&mut decoder, 0.0, "Line one");
        decoder.process_bytes(1.0, 0x14, 0x2d); // CR
        let cues = decoder.finalize(2.0);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Line one");
        assert_eq!(cues[0].end_time, 1.0);
    }

    #[test]
    fn paint_on_appends_characters_to_active_cue() {
        let mut decoder = Eia608Decoder::new();
        decoder.process_bytes(0.0, 0x14, 0x29); // RDC
        send_text(&mut decoder, 0.0, "ab");
        let cues = decoder.finalize(1.0);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "ab");
    }

    #[test]
    fn empty_text_cue_is_never_emitted() {
        let mut decoder = Eia608Decoder::new();
        decoder.process_bytes(0.0, 0x14, 0x20); // RCL
        decoder.process_bytes(0.0, 0x14, 0x2f); // EOC with nothing written
        let cues = decoder.finalize(1.0);
        assert!(cues.is_empty());
    }

    #[test]
    fn pac_positions_cursor_at_expected_row_and_column() {
        assert_eq!(decode_pac(0x11, 0x40), Some((0, 0)));
        assert_eq!(decode_pac(0x11, 0x60), Some((1, 0)));
        assert_eq!(decode_pac(0x14, 0x50), Some((13, 0)));
    }

    #[test]
    fn writes_beyond_column_32_are_accepted() {
        let mut buf = CaptionBuffer::default();
        buf.set_cursor(0, 40);
        buf.write_char('x');
        assert!(buf.rows[0].ends_with('x'));
    }
}
