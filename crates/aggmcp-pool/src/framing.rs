//! Newline-delimited JSON-RPC framing over a backend's stdout stream.
//!
//! The naive approach — append each chunk to a buffer, extract lines,
//! then clear the whole buffer — drops the tail of a partial line that
//! arrives in the same read as one or more complete lines (spec §9,
//! "subprocess stdout buffering"). The corrected rule kept here: find the
//! *last* newline in the accumulated buffer, split complete lines out of
//! everything up to it, and keep only the remainder — which may itself be
//! a partial line — as the new buffer.

#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: String,
}

impl LineFramer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a freshly-read chunk of stdout text and return every complete
    /// line it produced (possibly combined with bytes buffered from
    /// earlier chunks). Anything after the last newline — even if this
    /// chunk contained several complete lines before it — is retained for
    /// the next call instead of being discarded.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        // Rust string indices on `rfind` results always land on the byte
        // right after `\n`'s UTF-8 width (1 byte), so this split is valid.
        let tail = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);

        complete
            .split('\n')
            .map(str::trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Whatever is left in the buffer once the stream ends. A non-empty
    /// result here usually means the backend closed its pipe mid-message.
    #[must_use]
    pub fn drain_partial(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}
