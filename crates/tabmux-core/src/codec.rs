//! Command boundary detection over a raw keystroke stream.
//!
//! The codec watches the bytes a user types into a session and reconstructs
//! the commands they submit, so they can be recorded in history. It is a
//! heuristic, not a shell protocol parser: it has no idea about multi-line
//! edits, reverse search, escape sequences (an arrow key leaves `[A` in the
//! buffer), heredocs, or pasted blocks with embedded carriage returns. Each
//! `\r` it sees is treated as one submitted command.
//!
//! The codec itself is stateless; the per-session state lives in a
//! [`LineBuffer`] owned by the session record.

const CARRIAGE_RETURN: u8 = b'\r';
const DELETE: u8 = 0x7f;
const SPACE: u8 = b' ';

/// A command reconstructed from input, already trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedLine(String);

impl CompletedLine {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Input typed since the last command boundary.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The pending input, lossily decoded.
    pub fn pending(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Feed a chunk of input, returning every line it completes in order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<CompletedLine> {
        data.iter()
            .filter_map(|&byte| consume_byte(self, byte))
            .collect()
    }

    /// Remove the last character, including all bytes of a UTF-8 sequence.
    fn pop_char(&mut self) {
        while let Some(byte) = self.bytes.pop() {
            // Stop once a non-continuation byte (ASCII or a lead byte) is gone.
            if byte & 0b1100_0000 != 0b1000_0000 {
                break;
            }
        }
    }
}

/// Advance the codec by one input byte.
///
/// Returns the completed command when `byte` is a carriage return and the
/// buffered input is non-blank.
pub fn consume_byte(line: &mut LineBuffer, byte: u8) -> Option<CompletedLine> {
    match byte {
        CARRIAGE_RETURN => {
            let text = String::from_utf8_lossy(&line.bytes).trim().to_string();
            line.clear();
            if text.is_empty() {
                None
            } else {
                Some(CompletedLine(text))
            }
        }
        DELETE => {
            line.pop_char();
            None
        }
        b if b >= SPACE => {
            line.bytes.push(b);
            None
        }
        _ => None,
    }
}
