//! Credential extraction from the node's startup output.
//!
//! Anvil prints its pre-funded accounts twice, once as addresses with a
//! balance annotation and once as private keys, both indexed `(0)`, `(1)`, ...
//! Only account `(0)` is of interest.

use std::io::{self, BufRead};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, trace};

/// Printed by the node once the RPC server accepts connections.
pub const READY_MARKER: &str = "Listening on";

fn private_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\(0\)\s+(0x[a-fA-F0-9]{64})").expect("valid regex"))
}

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\(0\)\s+(0x[a-fA-F0-9]{40})\s+\(").expect("valid regex"))
}

/// What the scanner saw before it stopped reading.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub private_key: Option<String>,
    pub address: Option<String>,
    /// The ready marker was seen.
    pub ready: bool,
    pub lines_read: usize,
}

impl ScanOutcome {
    /// Feed one line. Fields already captured are never overwritten.
    pub fn observe(&mut self, line: &str) {
        self.lines_read += 1;

        if self.private_key.is_none() {
            if let Some(caps) = private_key_pattern().captures(line) {
                self.private_key = Some(caps[1].to_string());
                debug!(line = self.lines_read, "captured private key");
            }
        }

        if self.address.is_none() {
            if let Some(caps) = address_pattern().captures(line) {
                self.address = Some(caps[1].to_string());
                debug!(line = self.lines_read, address = %&caps[1], "captured address");
            }
        }

        if line.contains(READY_MARKER) {
            self.ready = true;
        }
    }
}

/// How long to wait for more output when the reader is caught up.
const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Follow `reader` line by line until the ready marker, the end of output, or
/// `deadline`, whichever comes first.
///
/// A read returning nothing only ends the scan once `producer_alive` says the
/// writer is gone; otherwise the scanner sleeps briefly and reads again, so a
/// silent writer is bounded by the deadline. Bytes that are not UTF-8 are
/// replaced rather than ending the scan.
pub fn scan<R: BufRead>(
    reader: &mut R,
    deadline: Instant,
    mut producer_alive: impl FnMut() -> bool,
) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    let mut pending: Vec<u8> = Vec::new();

    while Instant::now() < deadline {
        match reader.read_until(b'\n', &mut pending) {
            Ok(_) if pending.ends_with(b"\n") => {
                if take_line(&mut outcome, &mut pending) {
                    break;
                }
            }
            // Caught up with the writer, possibly mid-line.
            Ok(_) => {
                if producer_alive() {
                    thread::sleep(TAIL_POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
                    continue;
                }
                // Drain whatever the writer managed to flush before exiting.
                if matches!(reader.read_until(b'\n', &mut pending), Ok(n) if n > 0) {
                    continue;
                }
                if !pending.is_empty() {
                    take_line(&mut outcome, &mut pending);
                }
                debug!(lines = outcome.lines_read, "node output closed");
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "error reading node output");
                break;
            }
        }
    }

    outcome
}

/// Observe the buffered line and reset the buffer. Returns whether the ready
/// marker has been seen.
fn take_line(outcome: &mut ScanOutcome, pending: &mut Vec<u8>) -> bool {
    let line = String::from_utf8_lossy(pending);
    trace!(line = line.trim_end(), "node output");
    outcome.observe(&line);
    pending.clear();
    outcome.ready
}
