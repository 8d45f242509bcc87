use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use blobsweep_store::Storage;

use crate::error::{VerifyError, VerifyResult};
use crate::options::VerifyOptions;
use crate::report::ProgressObserver;
use crate::tally::Tally;

/// How a run ended, from worst to best.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every blob read back matched its ref.
    AllValid,
    /// The run completed and at least one blob did not match.
    CorruptionDetected,
    /// The run could not complete.
    Failed,
}

impl Outcome {
    /// Process exit status for this outcome.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::AllValid => 0,
            Self::Failed => 1,
            Self::CorruptionDetected => 2,
        }
    }
}

/// What a completed sweep found.
#[derive(Debug)]
pub struct VerifyReport {
    pub tally: Tally,
    /// Set if streaming stopped early. The tally still covers every blob
    /// received before that.
    pub stream_error: Option<VerifyError>,
}

impl VerifyReport {
    /// A streaming failure outranks any count of corrupt blobs.
    pub fn outcome(&self) -> Outcome {
        if self.stream_error.is_some() {
            Outcome::Failed
        } else if self.tally.is_clean() {
            Outcome::AllValid
        } else {
            Outcome::CorruptionDetected
        }
    }
}

/// Stream every blob out of `storage` and check each against its ref.
///
/// One producer task streams into a bounded channel; this task consumes,
/// validates, tallies, and notifies `observer`. Corrupt blobs are counted
/// and never stop the run. A storage that cannot stream fails before
/// anything is read.
pub async fn verify(
    storage: Arc<dyn Storage>,
    options: &VerifyOptions,
    observer: &mut dyn ProgressObserver,
) -> VerifyResult<VerifyReport> {
    let handler = storage.handler_type().to_string();
    let streamer = storage
        .into_streamer()
        .ok_or_else(|| VerifyError::Unsupported {
            handler: handler.clone(),
        })?;

    info!(handler = %handler, "verifying blobs");
    let (tx, mut rx) = mpsc::channel(options.channel_capacity.max(1));
    let cancel = CancellationToken::new();
    let producer = tokio::spawn(async move { streamer.stream_blobs(cancel, tx, "").await });

    let mut tally = Tally::new();
    while let Some(item) = rx.recv().await {
        let blob_ref = *item.blob.blob_ref();
        let valid = match item.blob.valid_contents() {
            Ok(()) => {
                tally.record_valid();
                true
            }
            Err(e) => {
                debug!(blob = %blob_ref, error = %e, "invalid blob");
                tally.record_invalid(blob_ref);
                false
            }
        };
        observer.blob_checked(&blob_ref, valid, &tally);
    }

    let stream_error = match producer.await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(VerifyError::Stream(e)),
        Err(e) => Some(VerifyError::ProducerFailed(e.to_string())),
    };
    observer.finished(&tally);
    info!(
        valid = tally.valid,
        invalid = tally.invalid,
        failed = stream_error.is_some(),
        "verification finished"
    );
    Ok(VerifyReport { tally, stream_error })
}
