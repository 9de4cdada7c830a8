use std::fmt;
use std::time::Duration;

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Discards every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

/// Snapshot of a streaming download.
///
/// `total` is the announced `Content-Length`; a missing or zero length means
/// the size is unknown and no percentage is reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
    pub elapsed: Duration,
}

impl TransferProgress {
    pub fn new(downloaded: u64, total: Option<u64>, elapsed: Duration) -> Self {
        Self {
            downloaded,
            total: total.filter(|total| *total > 0),
            elapsed,
        }
    }

    pub fn percent(&self) -> Option<f64> {
        self.total
            .map(|total| self.downloaded as f64 / total as f64 * 100.0)
    }

    pub fn mib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.downloaded as f64 / secs / MIB
        } else {
            0.0
        }
    }
}

impl fmt::Display for TransferProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let downloaded = self.downloaded as f64 / MIB;
        match (self.percent(), self.total) {
            (Some(percent), Some(total)) => write!(
                f,
                "Progress: {percent:.1}% ({downloaded:.1}/{:.1} MB) @ {:.1} MB/s",
                total as f64 / MIB,
                self.mib_per_sec()
            ),
            _ => write!(
                f,
                "Downloaded: {downloaded:.1} MB @ {:.1} MB/s",
                self.mib_per_sec()
            ),
        }
    }
}

impl From<TransferProgress> for ProgressEvent {
    fn from(progress: TransferProgress) -> Self {
        Self {
            message: format!("  {progress}"),
            elapsed: None,
        }
    }
}
