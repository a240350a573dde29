use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use super::state::{lock_encoder, SharedEncoder};
use crate::capture::CaptureEngine;
use crate::error::{DeleteRetryExhausted, EncodeError};

/// What happened during a teardown. Teardown itself never fails.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub flush_error: Option<EncodeError>,
    pub close_error: Option<EncodeError>,
    /// `None` when no delete was requested
    pub delete: Option<Result<(), DeleteRetryExhausted>>,
}

impl TeardownReport {
    /// The first encoder failure, if any
    pub fn encoder_error(self) -> Option<EncodeError> {
        self.flush_error.or(self.close_error)
    }
}

/// Releases an engine/encoder pair in a fixed order
#[derive(Debug, Clone)]
pub struct ResourceReclaimer {
    delete_attempts: u32,
    retry_delay: Duration,
}

impl Default for ResourceReclaimer {
    fn default() -> Self {
        Self {
            delete_attempts: 3,
            retry_delay: Duration::from_millis(200),
        }
    }
}

impl ResourceReclaimer {
    pub fn new(delete_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            delete_attempts: delete_attempts.max(1),
            retry_delay,
        }
    }

    /// Unsubscribe, stop, flush, close, dispose, then optionally delete
    /// `output`.
    pub async fn teardown(
        &self,
        engine: &mut dyn CaptureEngine,
        encoder: Option<SharedEncoder>,
        output: Option<&Path>,
        delete_file: bool,
    ) -> TeardownReport {
        let mut report = TeardownReport::default();

        engine.unsubscribe();
        if !engine.is_stopped() {
            engine.stop();
        }

        if let Some(encoder) = encoder {
            let mut encoder = lock_encoder(&encoder);
            report.flush_error = encoder.flush().err();
            report.close_error = encoder.close().err();
        }

        engine.dispose().await;
        debug!("Released {} engine", engine.name());

        if delete_file {
            if let Some(path) = output {
                report.delete = Some(self.delete_with_retry(path).await);
            }
        }

        report
    }

    /// Remove `path`, retrying with a fixed delay. A missing file counts as
    /// removed.
    pub async fn delete_with_retry(&self, path: &Path) -> Result<(), DeleteRetryExhausted> {
        let mut attempt = 1;
        loop {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    debug!("Deleted {}", path.display());
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(source) if attempt >= self.delete_attempts => {
                    warn!(
                        "Giving up on deleting {} after {} attempts, file left in place: {}",
                        path.display(),
                        attempt,
                        source
                    );
                    return Err(DeleteRetryExhausted {
                        path: path.to_path_buf(),
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    debug!("Delete attempt {} for {} failed: {}", attempt, path.display(), e);
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::audio::{AudioFormat, AudioFrame, Encoder};
    use crate::capture::CaptureSubscriber;
    use crate::error::CaptureError;

    type Calls = Arc<Mutex<Vec<String>>>;

    fn record(calls: &Calls, call: impl Into<String>) {
        calls.lock().unwrap().push(call.into());
    }

    struct RecordingEngine {
        calls: Calls,
        stopped: bool,
        /// Checked at dispose time, to show the delete comes last
        output: Option<PathBuf>,
    }

    #[async_trait]
    impl CaptureEngine for RecordingEngine {
        fn name(&self) -> &str {
            "recording"
        }

        async fn start(
            &mut self,
            _device_index: usize,
            _format: AudioFormat,
            _subscriber: Arc<dyn CaptureSubscriber>,
        ) -> Result<(), CaptureError> {
            Ok(())
        }

        fn unsubscribe(&mut self) {
            record(&self.calls, "unsubscribe");
        }

        fn stop(&mut self) {
            self.stopped = true;
            record(&self.calls, "stop");
        }

        fn is_stopped(&self) -> bool {
            self.stopped
        }

        async fn dispose(&mut self) {
            record(&self.calls, "dispose");
            if self.output.as_ref().is_some_and(|path| path.exists()) {
                record(&self.calls, "file present at dispose");
            }
        }
    }

    struct RecordingEncoder {
        calls: Calls,
        path: PathBuf,
        fail_flush: bool,
    }

    impl Encoder for RecordingEncoder {
        fn write(&mut self, _frame: AudioFrame<'_>) -> Result<(), EncodeError> {
            Ok(())
        }

        fn flush(&mut self) -> Result<(), EncodeError> {
            record(&self.calls, "flush");
            if self.fail_flush {
                return Err(EncodeError::Encode("disk full".into()));
            }
            Ok(())
        }

        fn close(&mut self) -> Result<(), EncodeError> {
            record(&self.calls, "close");
            Ok(())
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }

    fn fixture(path: &Path, stopped: bool, fail_flush: bool) -> (Calls, RecordingEngine, SharedEncoder) {
        let calls = Calls::default();
        let engine = RecordingEngine {
            calls: Arc::clone(&calls),
            stopped,
            output: Some(path.to_path_buf()),
        };
        let encoder: Box<dyn Encoder> = Box::new(RecordingEncoder {
            calls: Arc::clone(&calls),
            path: path.to_path_buf(),
            fail_flush,
        });
        (calls, engine, Arc::new(Mutex::new(encoder)))
    }

    #[tokio::test]
    async fn test_teardown_order_with_delete() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("recording_1.mp3");
        std::fs::write(&path, b"partial").unwrap();
        let (calls, mut engine, encoder) = fixture(&path, false, false);

        let report = ResourceReclaimer::default()
            .teardown(&mut engine, Some(encoder), Some(&path), true)
            .await;

        assert_eq!(
            *calls.lock().unwrap(),
            ["unsubscribe", "stop", "flush", "close", "dispose", "file present at dispose"]
        );
        assert!(matches!(report.delete, Some(Ok(()))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_teardown_keeps_file_and_skips_redundant_stop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("recording_1.mp3");
        std::fs::write(&path, b"take").unwrap();
        let (calls, mut engine, encoder) = fixture(&path, true, true);

        let report = ResourceReclaimer::default()
            .teardown(&mut engine, Some(encoder), Some(&path), false)
            .await;

        assert_eq!(
            *calls.lock().unwrap(),
            ["unsubscribe", "flush", "close", "dispose", "file present at dispose"]
        );
        assert!(report.delete.is_none());
        assert!(path.exists());
        assert!(matches!(report.encoder_error(), Some(EncodeError::Encode(_))));
    }

    #[tokio::test]
    async fn test_delete_gives_up_after_bounded_attempts() {
        let temp_dir = TempDir::new().unwrap();
        // remove_file cannot remove a directory, so every attempt fails
        let stuck = temp_dir.path().join("stuck.mp3");
        std::fs::create_dir(&stuck).unwrap();
        let delay = Duration::from_millis(20);

        let started = Instant::now();
        let result = ResourceReclaimer::new(3, delay).delete_with_retry(&stuck).await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(err.path, stuck);
        assert!(started.elapsed() >= delay * 2, "Waits between attempts");
        assert!(stuck.exists(), "Orphan left in place");
    }

    #[tokio::test]
    async fn test_delete_missing_file_counts_as_removed() {
        let temp_dir = TempDir::new().unwrap();
        let reclaimer = ResourceReclaimer::new(3, Duration::from_secs(1));

        let started = Instant::now();
        let result = reclaimer.delete_with_retry(&temp_dir.path().join("gone.mp3")).await;

        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(1), "No retries for a missing file");
    }

    #[test]
    fn test_at_least_one_attempt() {
        assert_eq!(ResourceReclaimer::new(0, Duration::ZERO).delete_attempts, 1);
    }
}
