use std::io::{self, Write};

use tracing::debug;

use blobsweep_types::BlobRef;

use crate::tally::Tally;

/// Receives per-blob verdicts as the pipeline consumes them.
pub trait ProgressObserver {
    /// Called once per blob, after the tally has been updated.
    fn blob_checked(&mut self, blob_ref: &BlobRef, valid: bool, tally: &Tally);

    /// Called once when the stream has ended, successfully or not.
    fn finished(&mut self, tally: &Tally);
}

fn blobs(n: u64) -> &'static str {
    if n == 1 {
        "blob"
    } else {
        "blobs"
    }
}

/// Progress lines overwritten in place with `\r`, plus one line per
/// invalid blob and a final summary.
#[derive(Debug)]
pub struct ConsoleReporter<W: Write> {
    out: W,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: std::fmt::Arguments<'_>) {
        // Progress output is best effort.
        if let Err(e) = self.out.write_fmt(text).and_then(|()| self.out.flush()) {
            debug!(error = %e, "progress output failed");
        }
    }
}

impl<W: Write> ProgressObserver for ConsoleReporter<W> {
    fn blob_checked(&mut self, blob_ref: &BlobRef, valid: bool, tally: &Tally) {
        if !valid {
            self.write(format_args!("found invalid blob: {blob_ref}\n"));
        }
        if tally.is_clean() {
            self.write(format_args!(" verified {} {}...\r", tally.valid, blobs(tally.valid)));
        } else {
            self.write(format_args!(
                " {} invalid {}, {} valid {}...\r",
                tally.invalid,
                blobs(tally.invalid),
                tally.valid,
                blobs(tally.valid)
            ));
        }
    }

    fn finished(&mut self, tally: &Tally) {
        if tally.is_clean() {
            self.write(format_args!("verified all {} blobs\n", tally.valid));
        } else {
            self.write(format_args!(
                "CORRUPTION DETECTED: {} of {} blobs failed validation. Their refs are listed above.\n",
                tally.invalid,
                tally.total()
            ));
        }
    }
}
