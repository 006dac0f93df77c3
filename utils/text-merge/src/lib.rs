/// Accumulator for streamed assistant text where chunks may be exact
/// duplicates, growing replays of the whole message, stale prefixes or
/// suffixes, or deltas that partially overlap what was already received.
///
/// Example:
/// - buffer `"Hello"` + chunk `"Hello, world"` → `"Hello, world"`
/// - buffer `"abcXYZ"` + chunk `"XYZdef"` → `"abcXYZdef"`
/// - buffer `"Hello, world"` + chunk `"Hello"` → unchanged
///
/// No character is ever appended twice for chunks related by one of those
/// patterns; genuinely unrelated chunks are concatenated as-is.
#[derive(Debug, Default)]
pub struct StreamTextBuffer {
    buffer: String,
}

impl StreamTextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Merge one incoming chunk. The rules are ordered; the first match wins.
    pub fn push(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        if self.buffer.is_empty() {
            self.buffer.push_str(chunk);
            return;
        }
        if chunk == self.buffer {
            return;
        }
        if chunk.starts_with(self.buffer.as_str()) {
            // Full replay that supersedes the buffer, e.g. a backend whose
            // "delta" is actually the message so far.
            self.buffer.clear();
            self.buffer.push_str(chunk);
            return;
        }
        if self.buffer.starts_with(chunk) {
            // Stale prefix, already covered.
            return;
        }
        if self.buffer.ends_with(chunk) {
            // Stale suffix repeat.
            return;
        }
        if chunk.ends_with(self.buffer.as_str()) {
            self.buffer.clear();
            self.buffer.push_str(chunk);
            return;
        }
        let overlap = longest_overlap_len(&self.buffer, chunk);
        self.buffer.push_str(&chunk[overlap..]);
    }

    /// Yield the merged text and reset the buffer.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

/// Length of the longest suffix of `buffer` that is also a prefix of
/// `chunk`, scanning only char boundaries of `chunk`.
fn longest_overlap_len(buffer: &str, chunk: &str) -> usize {
    let max = buffer.len().min(chunk.len());
    for k in (1..=max).rev() {
        if chunk.is_char_boundary(k) && buffer.ends_with(&chunk[..k]) {
            return k;
        }
    }
    0
}
