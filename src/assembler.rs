//! Reassembles raw PTY output into complete text lines.

/// Append buffer that turns arbitrarily fragmented output into lines.
///
/// A line is complete once its `\n` arrives. The terminator and any `\r`
/// characters right before it are removed. Whatever follows the last `\n`
/// stays buffered until a later chunk completes it; an unterminated fragment
/// is never emitted.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let scan_from = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending[scan_from..]
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|i| scan_from + i)
        else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(|line| {
                let end = line.iter().rposition(|&b| b != b'\r').map_or(0, |i| i + 1);
                String::from_utf8_lossy(&line[..end]).into_owned()
            })
            .collect()
    }

    /// The buffered fragment that has not been terminated yet.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }
}
