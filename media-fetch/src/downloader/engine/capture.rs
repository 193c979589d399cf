//! Interception of the engine's diagnostic output.
//!
//! The engine runs with `--ignore-errors` and keeps going past internal
//! errors, so the error signal is the last error-level line it printed rather
//! than its exit status. Warnings and debug chatter are demoted to trace level.
//!
//! A size-limit abort is printed as an informational `[download]` line, not
//! an error, so lines carrying an abort notice are kept regardless of prefix.

use tracing::trace;

const ERROR_PREFIX: &str = "ERROR:";
const WARNING_PREFIX: &str = "WARNING:";

/// Lowercase substrings of non-error lines that still explain a failed fetch.
const ABORT_NOTICES: &[&str] = &["larger than max-filesize"];

fn is_abort_notice(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    ABORT_NOTICES.iter().any(|marker| lower.contains(marker))
}

/// Keeps the first and last error-level line seen on the engine's output,
/// plus the last abort notice.
#[derive(Debug, Default)]
pub struct ErrorCapture {
    first: Option<String>,
    last: Option<String>,
    abort: Option<String>,
    suppressed: usize,
}

impl ErrorCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if is_abort_notice(line) {
            self.abort = Some(line.to_string());
        }

        if line.starts_with(ERROR_PREFIX) {
            if self.first.is_none() {
                self.first = Some(line.to_string());
            }
            self.last = Some(line.to_string());
            return;
        }
        if self.abort.as_deref() == Some(line) {
            return;
        }

        self.suppressed += 1;
        if line.starts_with(WARNING_PREFIX) {
            trace!(target: "media_fetch::engine", "{line}");
        } else {
            trace!(target: "media_fetch::engine", debug = true, "{line}");
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last.as_deref()
    }

    pub fn first_error(&self) -> Option<&str> {
        self.first.as_deref()
    }

    /// Number of non-error lines dropped.
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    /// The error to report: an abort notice wins over the last error line,
    /// since it names why no output was kept.
    pub fn into_error(self) -> Option<String> {
        self.abort.or(self.last)
    }

    /// Fold a capture of another stream into this one.
    pub fn absorb(&mut self, other: ErrorCapture) {
        if self.first.is_none() {
            self.first = other.first;
        }
        if other.last.is_some() {
            self.last = other.last;
        }
        if other.abort.is_some() {
            self.abort = other.abort;
        }
        self.suppressed += other.suppressed;
    }
}
