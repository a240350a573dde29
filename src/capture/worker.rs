// Dedicated capture thread shared by the engine implementations
//
// The thread body owns the device handle. The engine keeps the signal
// sender, a stopped flag and the join handle. When the body returns, the
// worker marks itself stopped and emits the terminal notification.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::Subscription;
use crate::error::CaptureError;

/// Signals sent to the capture thread
pub(crate) enum WorkerSignal {
    Stop,
    Fault(String),
}

/// How the capture thread ended
pub(crate) enum WorkerExit {
    /// Capture ran and ended, with an optional runtime error
    Finished(Option<CaptureError>),
    /// The device never opened; no terminal notification is sent
    NeverStarted,
}

/// Handed to the thread body
pub(crate) struct WorkerContext {
    subscription: Subscription,
    signals: Receiver<WorkerSignal>,
    faults: Sender<WorkerSignal>,
}

impl WorkerContext {
    pub fn subscription(&self) -> Subscription {
        self.subscription.clone()
    }

    /// Sender for reporting device faults from other threads
    pub fn fault_sender(&self) -> Sender<WorkerSignal> {
        self.faults.clone()
    }

    /// Block until stop is requested or a fault is reported
    pub fn wait(&self) -> Option<CaptureError> {
        match self.signals.recv() {
            Ok(signal) => Self::into_error(signal),
            Err(_) => None,
        }
    }

    /// Check for a signal, waiting up to `timeout`. `Some` means capture must end.
    pub fn poll(&self, timeout: Duration) -> Option<Option<CaptureError>> {
        if timeout.is_zero() {
            match self.signals.try_recv() {
                Ok(signal) => Some(Self::into_error(signal)),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(None),
            }
        } else {
            match self.signals.recv_timeout(timeout) {
                Ok(signal) => Some(Self::into_error(signal)),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => Some(None),
            }
        }
    }

    fn into_error(signal: WorkerSignal) -> Option<CaptureError> {
        match signal {
            WorkerSignal::Stop => None,
            WorkerSignal::Fault(reason) => Some(CaptureError::Runtime(reason)),
        }
    }
}

pub(crate) struct CaptureWorker {
    subscription: Subscription,
    signals: Option<Sender<WorkerSignal>>,
    stopped: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureWorker {
    pub fn new() -> Self {
        Self {
            subscription: Subscription::detached(),
            signals: None,
            stopped: Arc::new(AtomicBool::new(true)),
            thread: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.thread.is_some()
    }

    /// Spawn the capture thread running `body`
    pub fn spawn<F>(&mut self, name: &str, subscription: Subscription, body: F) -> io::Result<()>
    where
        F: FnOnce(&WorkerContext) -> WorkerExit + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let context = WorkerContext {
            subscription: subscription.clone(),
            signals: rx,
            faults: tx.clone(),
        };
        let stopped = Arc::clone(&self.stopped);
        stopped.store(false, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let exit = body(&context);
                stopped.store(true, Ordering::SeqCst);
                match exit {
                    WorkerExit::Finished(error) => {
                        if let Some(error) = &error {
                            warn!("Capture thread ended with error: {}", error);
                        } else {
                            debug!("Capture thread finished");
                        }
                        context.subscription.deliver_stopped(error);
                    }
                    WorkerExit::NeverStarted => debug!("Capture thread exited before opening the device"),
                }
            });

        match handle {
            Ok(handle) => {
                self.subscription = subscription;
                self.signals = Some(tx);
                self.thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.stopped.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    pub fn unsubscribe(&self) {
        self.subscription.clear();
    }

    pub fn stop(&self) {
        if let Some(signals) = &self.signals {
            // The thread may already be gone; a closed channel is fine.
            let _ = signals.send(WorkerSignal::Stop);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop the thread if needed and wait for it to exit
    pub async fn join(&mut self) {
        self.stop();
        self.signals = None;
        let Some(handle) = self.thread.take() else {
            return;
        };
        match tokio::task::spawn_blocking(move || handle.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!("Capture thread panicked"),
            Err(e) => warn!("Failed to join capture thread: {}", e),
        }
    }
}
