use std::fmt;

/// Running counters for one device link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub sent: u64,
    pub received: u64,
    pub write_failures: u64,
    pub timeouts: u64,
    pub bad_framing: u64,
    pub malformed: u64,
    pub stale_dropped: u64,
    pub bytes_out: u64,
    pub bytes_in: u64,
}

impl LinkStats {
    pub fn add_sent(&mut self, bytes: usize) {
        self.sent += 1;
        self.bytes_out += bytes as u64;
    }
    pub fn add_received(&mut self, bytes: usize) {
        self.received += 1;
        self.bytes_in += bytes as u64;
    }
    pub fn inc_write_failure(&mut self) {
        self.write_failures += 1;
    }
    pub fn inc_timeout(&mut self) {
        self.timeouts += 1;
    }
    pub fn inc_bad_framing(&mut self) {
        self.bad_framing += 1;
    }
    pub fn inc_malformed(&mut self) {
        self.malformed += 1;
    }
    pub fn add_stale(&mut self, n: usize) {
        self.stale_dropped += n as u64;
    }

    /// Exchanges that did not produce a usable packet.
    pub fn errors(&self) -> u64 {
        self.write_failures + self.timeouts + self.bad_framing + self.malformed
    }
}

impl fmt::Display for LinkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={} recv={} wfail={} timeouts={} framing={} malformed={} stale={} bytes_out={} bytes_in={}",
            self.sent,
            self.received,
            self.write_failures,
            self.timeouts,
            self.bad_framing,
            self.malformed,
            self.stale_dropped,
            self.bytes_out,
            self.bytes_in
        )
    }
}
