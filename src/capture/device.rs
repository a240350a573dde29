// Host input devices via cpal
//
// cpal streams are not Send on every platform, so the stream is built, played
// and dropped entirely on the capture thread. The control side only talks to
// that thread through the worker's signal channel.

use std::sync::Arc;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::worker::{CaptureWorker, WorkerContext, WorkerExit, WorkerSignal};
use super::{CaptureEngine, CaptureSubscriber, Subscription};
use crate::audio::{AudioFormat, AudioFrame, BitDepth};
use crate::error::CaptureError;

/// An enumerated input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub index: usize,
    pub name: String,
}

/// List input devices of the default host, in enumeration order
pub fn list_input_devices() -> Result<Vec<InputDevice>, CaptureError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|_| CaptureError::DeviceUnavailable)?;

    Ok(devices
        .enumerate()
        .map(|(index, device)| InputDevice {
            index,
            name: device.name().unwrap_or_else(|_| format!("Input {index}")),
        })
        .collect())
}

/// Capture engine backed by a host input device
pub struct DeviceEngine {
    worker: CaptureWorker,
}

impl DeviceEngine {
    pub fn new() -> Self {
        Self {
            worker: CaptureWorker::new(),
        }
    }
}

impl Default for DeviceEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn open_error(index: usize, reason: impl ToString) -> CaptureError {
    CaptureError::DeviceOpen {
        index,
        reason: reason.to_string(),
    }
}

/// Build and play the input stream for `device_index`. Runs on the capture thread.
fn open_stream(
    device_index: usize,
    format: AudioFormat,
    context: &WorkerContext,
) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let mut devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|_| CaptureError::DeviceUnavailable)?
        .collect();

    if devices.is_empty() {
        return Err(CaptureError::DeviceUnavailable);
    }
    if device_index >= devices.len() {
        return Err(open_error(
            device_index,
            format!("only {} input devices present", devices.len()),
        ));
    }
    let device = devices.swap_remove(device_index);
    let device_name = device.name().unwrap_or_else(|_| format!("Input {device_index}"));

    let config = StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate_hz),
        buffer_size: cpal::BufferSize::Default,
    };
    let sample_format = match format.bit_depth {
        BitDepth::Sixteen => SampleFormat::I16,
        BitDepth::ThirtyTwo => SampleFormat::I32,
    };

    let frames = context.subscription();
    let faults = context.fault_sender();
    let stream = device
        .build_input_stream_raw(
            &config,
            sample_format,
            move |data: &cpal::Data, _: &cpal::InputCallbackInfo| {
                frames.deliver_frame(AudioFrame::from_bytes(data.bytes()));
            },
            move |err: cpal::StreamError| {
                let _ = faults.send(WorkerSignal::Fault(err.to_string()));
            },
            None,
        )
        .map_err(|e| open_error(device_index, e))?;

    stream.play().map_err(|e| open_error(device_index, e))?;

    info!("Capturing from '{}' at {}", device_name, format);
    Ok(stream)
}

#[async_trait]
impl CaptureEngine for DeviceEngine {
    fn name(&self) -> &str {
        "device"
    }

    async fn start(
        &mut self,
        device_index: usize,
        format: AudioFormat,
        subscriber: Arc<dyn CaptureSubscriber>,
    ) -> Result<(), CaptureError> {
        if self.worker.is_started() {
            return Err(open_error(device_index, "engine already started"));
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        self.worker
            .spawn("tapedeck-capture", Subscription::new(subscriber), move |context| {
                let stream = match open_stream(device_index, format, context) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return WorkerExit::NeverStarted;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                let error = context.wait();
                drop(stream);
                WorkerExit::Finished(error)
            })
            .map_err(|e| open_error(device_index, e))?;

        match ready_rx.await {
            Ok(result) => result,
            Err(_) => {
                warn!("Capture thread exited before reporting device state");
                Err(open_error(device_index, "capture thread exited unexpectedly"))
            }
        }
    }

    fn unsubscribe(&mut self) {
        self.worker.unsubscribe();
    }

    fn stop(&mut self) {
        self.worker.stop();
    }

    fn is_stopped(&self) -> bool {
        self.worker.is_stopped()
    }

    async fn dispose(&mut self) {
        self.worker.join().await;
    }
}
