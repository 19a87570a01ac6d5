/// Counters describing what a session has sent so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    payloads_sent: u64,
    payloads_failed: u64,
    lines_sent: u64,
    bytes_sent: u64,
}

impl SessionStats {
    /// Returns the number of payloads written successfully.
    pub const fn payloads_sent(&self) -> u64 {
        self.payloads_sent
    }

    /// Returns the number of payloads that failed to be written.
    pub const fn payloads_failed(&self) -> u64 {
        self.payloads_failed
    }

    /// Returns the number of lines, or data points, written successfully.
    pub const fn lines_sent(&self) -> u64 {
        self.lines_sent
    }

    /// Returns the number of bytes written successfully.
    pub const fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub(crate) fn track_send_succeeded(&mut self, lines: usize, bytes_len: usize) {
        self.payloads_sent += 1;
        self.lines_sent += lines as u64;
        self.bytes_sent += bytes_len as u64;
    }

    pub(crate) fn track_send_failed(&mut self) {
        self.payloads_failed += 1;
    }
}
