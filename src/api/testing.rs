//! A `MachineCodeBuilder` that records its calls instead of producing a
//! loadable image. Used by this crate's own pipeline tests in place of a
//! real linker.

use std::fmt::Write as _;

use crate::api::{MachineCodeBuilder, SourceCodeLocation};

/// Accumulates the emitted byte image plus a human-readable log of every
/// `set_*` call, in call order. `result()` renders the log one line per
/// call, in call order.
#[derive(Default)]
pub struct RecordingBuilder {
    bytes: Vec<u8>,
    prepared_length: usize,
    written: usize,
    finished: bool,
    log: String,
}

impl RecordingBuilder {
    pub fn new() -> RecordingBuilder {
        RecordingBuilder::default()
    }

    /// The accumulated code image. Only meaningful after `finish_code`.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The `set_*` call log, one line per call, in the order `binemit`
    /// delivered them.
    pub fn result(&self) -> &str {
        &self.log
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// A compact hex dump of the code image, 16 bytes per line, with
    /// wholly-repeated lines run-length collapsed, so large padding runs
    /// (e.g. a nop-filled alignment region) don't flood a test failure
    /// message.
    #[cfg(feature = "testing_hooks")]
    pub fn dump_bytes_hex(&self) -> String {
        let mut out = String::new();
        let mut offset = 0;
        let mut chunks = self.bytes.chunks(16).peekable();
        while let Some(chunk) = chunks.next() {
            let repeat_count = count_identical_repeats(chunk, &mut chunks);
            if repeat_count > 1 && chunk.iter().all(|&b| b == chunk[0]) {
                let _ = writeln!(out, "{:04X} ... 0x{:02X} x {} ...", offset, chunk[0], repeat_count * chunk.len());
                offset += repeat_count * chunk.len();
                continue;
            }
            let _ = write!(out, "{:04X}", offset);
            for byte in chunk {
                let _ = write!(out, " {:02X}", byte);
            }
            let _ = writeln!(out);
            offset += chunk.len();
        }
        out
    }
}

#[cfg(feature = "testing_hooks")]
fn count_identical_repeats<'a, I>(first: &[u8], chunks: &mut std::iter::Peekable<I>) -> usize
where
    I: Iterator<Item = &'a [u8]>,
{
    let mut count = 1;
    while chunks.peek().map_or(false, |next| *next == first) {
        chunks.next();
        count += 1;
    }
    count
}

impl MachineCodeBuilder for RecordingBuilder {
    fn prepare_code(&mut self, code_length: usize) {
        self.prepared_length = code_length;
        self.written = 0;
        self.bytes = vec![0u8; code_length];
    }

    fn emit_code(&mut self, codes: &[u8]) {
        self.append_code(codes);
    }

    fn finish_code(&mut self) {
        self.finished = true;
        debug_assert_eq!(self.bytes.len(), self.prepared_length);
    }

    fn set_call_site(&mut self, offset: usize, name: &str) {
        let _ = writeln!(self.log, "call site +{:04X} {}", offset, name);
    }

    fn set_code_offset(&mut self, offset: usize, target_offset: usize) {
        let _ = writeln!(self.log, "code offset +{:04X} {}", offset, target_offset);
    }

    fn set_float32(&mut self, offset: usize, value: f32) {
        let _ = writeln!(self.log, "float32 +{:04X} {}f", offset, value);
    }

    fn set_float64(&mut self, offset: usize, value: f64) {
        let _ = writeln!(self.log, "float64 +{:04X} {}", offset, value);
    }

    fn set_int32(&mut self, offset: usize, value: i32) {
        let _ = writeln!(self.log, "int32 +{:04X} {}", offset, value);
    }

    fn set_int64(&mut self, offset: usize, value: i64) {
        let _ = writeln!(self.log, "int64 +{:04X} {}l", offset, value);
    }

    fn set_string(&mut self, offset: usize, utf16_bytes: &[u16]) {
        let rendered = String::from_utf16_lossy(utf16_bytes);
        let _ = writeln!(self.log, "string +{:04X} \"{}\"", offset, rendered);
    }

    fn set_source_code_location(&mut self, offset: usize, location: SourceCodeLocation) {
        let _ = writeln!(self.log, "location +{:04X} {}", offset, location.0);
    }
}

impl RecordingBuilder {
    fn append_code(&mut self, codes: &[u8]) {
        let start = self.written;
        let end = start + codes.len();
        debug_assert!(end <= self.bytes.len(), "emit_code overruns the prepared length");
        self.bytes[start..end].copy_from_slice(codes);
        self.written = end;
    }
}
