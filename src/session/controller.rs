// Session state machine
//
// All session state lives in `SessionController`, driven by a single tokio
// task. Handles talk to it through a command channel, capture threads through
// the notice channel. Teardown and finalization run only on this task.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Local;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::backend::RecorderBackend;
use super::events::{CaptureNotice, Command, FinalizedRecording, LevelReading, SessionEvent};
use super::pipeline::PipelineSink;
use super::reclaimer::{ResourceReclaimer, TeardownReport};
use super::state::{ElapsedClock, Session, SessionState, SharedEncoder};
use crate::audio::AudioFormat;
use crate::config::Settings;
use crate::error::{EncodeError, RecorderClosed, SessionError, SessionWarning};
use crate::library::{recording_path, Finalizer, TrackMetadata, VocabularyStore};

/// Times a start re-resolves its output path when the file is taken
const PATH_CLAIM_ATTEMPTS: u32 = 8;

/// Cloneable control surface of a running recorder
#[derive(Debug, Clone)]
pub struct RecorderHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl RecorderHandle {
    fn send(&self, command: Command) -> Result<(), RecorderClosed> {
        self.commands.send(command).map_err(|_| RecorderClosed)
    }

    /// Start recording on the selected device
    pub fn start(&self) -> Result<(), RecorderClosed> {
        self.send(Command::Start { device: None })
    }

    /// Start recording on `device`, which becomes the selected device
    pub fn start_on(&self, device: usize) -> Result<(), RecorderClosed> {
        self.send(Command::Start {
            device: Some(device),
        })
    }

    pub fn stop(&self) -> Result<(), RecorderClosed> {
        self.send(Command::Stop)
    }

    /// Move recording to `device`, or select it for the next start when idle
    pub fn switch_device(&self, device: usize) -> Result<(), RecorderClosed> {
        self.send(Command::SwitchDevice(device))
    }

    /// Save any active recording, then shut down
    pub fn close(&self) -> Result<(), RecorderClosed> {
        self.send(Command::Close)
    }

    /// Metadata used when the current recording is finalized
    pub fn set_metadata(&self, metadata: TrackMetadata) -> Result<(), RecorderClosed> {
        self.send(Command::SetMetadata(metadata))
    }
}

/// A spawned recorder: its handle, event stream and level feed
pub struct Recorder {
    handle: RecorderHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    levels: watch::Receiver<LevelReading>,
    task: JoinHandle<()>,
}

impl Recorder {
    /// Validate `settings` and spawn the control loop on the current runtime
    pub fn spawn(settings: Settings, backend: Arc<dyn RecorderBackend>) -> Result<Self, SessionError> {
        settings.validate()?;
        let format = settings.audio_format()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (level_tx, level_rx) = watch::channel(LevelReading::default());

        let vocabulary = match VocabularyStore::open(settings.vocabulary_path()) {
            Ok(store) => store,
            Err(e) => {
                warn!("{}", e);
                let _ = event_tx.send(SessionEvent::Warning(SessionWarning::Vocabulary(e)));
                VocabularyStore::empty(settings.vocabulary_path())
            }
        };
        let save_dir = settings.save_dir();
        let finalizer = Finalizer::new(save_dir.clone(), settings.calendar, vocabulary);

        let controller = SessionController {
            selected_device: settings.device_index,
            settings,
            format,
            save_dir,
            backend,
            reclaimer: ResourceReclaimer::default(),
            finalizer,
            session: None,
            published: SessionState::Idle,
            metadata: TrackMetadata::default(),
            pending_start: None,
            shutdown_pending: false,
            exiting: false,
            events: event_tx,
            levels: Arc::new(level_tx),
            notices: notice_tx,
        };
        let task = tokio::spawn(controller.run(command_rx, notice_rx));

        Ok(Self {
            handle: RecorderHandle {
                commands: command_tx,
            },
            events: event_rx,
            levels: level_rx,
            task,
        })
    }

    pub fn handle(&self) -> RecorderHandle {
        self.handle.clone()
    }

    /// Next event, or `None` once the control loop has exited and all events
    /// were read
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn levels(&self) -> watch::Receiver<LevelReading> {
        self.levels.clone()
    }

    /// Wait for the control loop to exit
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        let Recorder { handle, task, .. } = self;
        drop(handle);
        task.await
    }
}

struct SessionController {
    settings: Settings,
    format: AudioFormat,
    save_dir: PathBuf,
    backend: Arc<dyn RecorderBackend>,
    reclaimer: ResourceReclaimer,
    finalizer: Finalizer,

    /// The active session, if any
    session: Option<Session>,
    /// Last state reported through `StateChanged`
    published: SessionState,

    selected_device: usize,
    metadata: TrackMetadata,

    /// Start deferred until the current session has wound down
    pending_start: Option<usize>,
    /// Close requested while a session was active
    shutdown_pending: bool,
    exiting: bool,

    events: mpsc::UnboundedSender<SessionEvent>,
    levels: Arc<watch::Sender<LevelReading>>,
    notices: mpsc::UnboundedSender<CaptureNotice>,
}

impl SessionController {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut notices: mpsc::UnboundedReceiver<CaptureNotice>,
    ) {
        info!(
            "Recorder ready: {} at {}kbps, saving to {}",
            self.format,
            self.settings.mp3_bitrate_kbps,
            self.save_dir.display()
        );

        if self.settings.auto_start_recording {
            self.start(None).await;
        }

        let mut commands_open = true;
        while !self.exiting {
            tokio::select! {
                // Commands first, so requests already queued are seen before a
                // stop notice that raced them
                biased;
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All recorder handles dropped, closing");
                        commands_open = false;
                        self.close();
                    }
                },
                Some(notice) = notices.recv() => self.on_capture_stopped(notice).await,
                else => break,
            }
        }

        debug!("Recorder control loop exited");
    }

    fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|session| session.state)
            .unwrap_or(SessionState::Idle)
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine; the recorder keeps working.
        let _ = self.events.send(event);
    }

    fn publish_state(&mut self, state: SessionState) {
        if self.published != state {
            debug!("Session state: {} -> {}", self.published, state);
            self.published = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { device } => match self.state() {
                SessionState::Recording => self.replace(device).await,
                SessionState::Stopping => {
                    let device = device.unwrap_or(self.selected_device);
                    debug!("Start deferred until the current session stops");
                    self.pending_start = Some(device);
                }
                _ => self.start(device).await,
            },
            Command::Stop => self.stop(),
            Command::SwitchDevice(device) => self.switch_device(device),
            Command::Close => self.close(),
            Command::SetMetadata(metadata) => self.metadata = metadata,
        }
    }

    /// Open a new session on `device` (or the selected device)
    async fn start(&mut self, device: Option<usize>) {
        let device_index = device.unwrap_or(self.selected_device);
        self.selected_device = device_index;
        self.publish_state(SessionState::Starting);

        match self.open_session(device_index).await {
            Ok(session) => {
                info!(
                    "Recording on device {} at {} to {}",
                    device_index,
                    session.format,
                    session.output_path.display()
                );
                let path = session.output_path.clone();
                self.session = Some(session);
                self.publish_state(SessionState::Recording);
                self.emit(SessionEvent::Started { path, device_index });
            }
            Err(e) => {
                error!("Failed to start recording: {}", e);
                self.emit(SessionEvent::Failed(e));
                self.publish_state(SessionState::Error);
                self.publish_state(SessionState::Idle);
            }
        }
    }

    /// Resolve the output path and open encoder and engine, rolling back on
    /// any failure
    async fn open_session(&mut self, device_index: usize) -> Result<Session, SessionError> {
        std::fs::create_dir_all(&self.save_dir).map_err(|source| SessionError::SaveDirectory {
            path: self.save_dir.clone(),
            source,
        })?;

        let id = Uuid::new_v4();
        let mut output_path = recording_path(&self.save_dir, &Local::now());
        let mut engine = self.backend.create_engine();

        let mut claims = 1;
        let encoder: SharedEncoder = loop {
            match self
                .backend
                .create_encoder(&output_path, self.format, self.settings.mp3_bitrate_kbps)
            {
                Ok(encoder) => break Arc::new(Mutex::new(encoder)),
                // Someone created the file after the path was resolved
                Err(EncodeError::Exists { path }) if claims < PATH_CLAIM_ATTEMPTS => {
                    debug!("{} was taken, resolving a new recording path", path.display());
                    claims += 1;
                    output_path = recording_path(&self.save_dir, &Local::now());
                }
                Err(e) => {
                    // The path may belong to someone else; never delete it here.
                    let report = self.reclaimer.teardown(engine.as_mut(), None, None, false).await;
                    self.report_teardown(report);
                    return Err(e.into());
                }
            }
        };

        let clock = Arc::new(ElapsedClock::new(self.format));
        self.levels.send_replace(LevelReading::default());
        let sink = Arc::new(PipelineSink::new(
            id,
            self.format,
            Arc::clone(&encoder),
            Arc::clone(&clock),
            Arc::clone(&self.levels),
            self.notices.clone(),
        ));

        if let Err(e) = engine.start(device_index, self.format, sink).await {
            let report = self
                .reclaimer
                .teardown(engine.as_mut(), Some(encoder), Some(&output_path), true)
                .await;
            self.report_teardown(report);
            return Err(e.into());
        }

        Ok(Session {
            id,
            state: SessionState::Recording,
            device_index,
            format: self.format,
            output_path,
            clock,
            engine,
            encoder: Some(encoder),
        })
    }

    /// Ask the engine to stop; teardown waits for its terminal notification
    fn stop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            debug!("Stop ignored, not recording");
            return;
        };
        if session.state != SessionState::Recording {
            debug!("Stop ignored, session is {}", session.state);
            return;
        }

        info!("Stopping recording {}", session.id);
        session.state = SessionState::Stopping;
        session.engine.stop();
        self.publish_state(SessionState::Stopping);
    }

    fn switch_device(&mut self, device: usize) {
        match self.state() {
            SessionState::Recording => {
                info!("Switching recording to device {}", device);
                self.pending_start = Some(device);
                self.selected_device = device;
                self.stop();
            }
            SessionState::Stopping if self.pending_start.is_some() => {
                debug!("Device switch already in progress, ignoring switch to {}", device);
            }
            _ => {
                info!("Selected input device {}", device);
                self.selected_device = device;
            }
        }
    }

    fn close(&mut self) {
        match self.state() {
            SessionState::Recording | SessionState::Stopping => {
                info!("Close requested, saving the current recording first");
                self.shutdown_pending = true;
                self.pending_start = None;
                self.stop();
            }
            _ => self.shutdown(),
        }
    }

    fn shutdown(&mut self) {
        info!("Recorder shutting down");
        self.exiting = true;
        self.emit(SessionEvent::ShutdownRequested);
    }

    async fn on_capture_stopped(&mut self, notice: CaptureNotice) {
        let current = self.session.as_ref().map(|session| session.id);
        if current != Some(notice.session_id) {
            debug!("Ignoring stop notice for stale session {}", notice.session_id);
            return;
        }
        let Some(session) = self.session.take() else {
            return;
        };

        if session.state == SessionState::Recording {
            info!("Capture ended by the device");
            self.publish_state(SessionState::Stopping);
        }

        let finalized = match notice.error {
            None => self.finish(session).await,
            Some(e) => {
                error!("Recording failed: {}", e);
                let mut session = session;
                let report = self
                    .reclaimer
                    .teardown(session.engine.as_mut(), session.encoder.take(), None, false)
                    .await;
                self.report_teardown(report);
                self.emit(SessionEvent::Failed(e.into()));
                self.publish_state(SessionState::Error);
                self.publish_state(SessionState::Idle);
                false
            }
        };

        self.after_idle(finalized).await;
    }

    /// Tear down and finalize `session`. Returns whether it was saved.
    async fn finish(&mut self, mut session: Session) -> bool {
        let report = self
            .reclaimer
            .teardown(session.engine.as_mut(), session.encoder.take(), None, false)
            .await;
        self.report_teardown(report);

        let metadata = self.metadata.clone();
        let outcome = self
            .finalizer
            .run(&session.output_path, &metadata, Local::now().date_naive());
        for warning in outcome.warnings {
            self.emit(SessionEvent::Warning(warning.into()));
        }

        self.emit(SessionEvent::Finalized(FinalizedRecording {
            path: outcome.path,
            tagged: outcome.tagged,
            duration: session.clock.elapsed(),
            device_index: session.device_index,
            metadata,
        }));
        self.publish_state(SessionState::Idle);
        true
    }

    /// `start()` while recording: finish the active session synchronously,
    /// then open the new one
    async fn replace(&mut self, device: Option<usize>) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        info!("Restarting recording, finishing session {}", session.id);
        session.state = SessionState::Stopping;
        self.publish_state(SessionState::Stopping);
        self.finish(session).await;
        self.start(device).await;
    }

    /// Work deferred until the session reached idle
    async fn after_idle(&mut self, finalized: bool) {
        if self.shutdown_pending {
            self.shutdown_pending = false;
            self.shutdown();
            return;
        }
        if let Some(device) = self.pending_start.take() {
            self.start(Some(device)).await;
            return;
        }
        if finalized && self.settings.close_after_save {
            self.shutdown();
        }
    }

    /// Encoder failures become one warning; an orphaned temp file is only
    /// logged (by the reclaimer)
    fn report_teardown(&self, report: TeardownReport) {
        if let Some(e) = report.encoder_error() {
            warn!("Encoder shutdown failed: {}", e);
            self.emit(SessionEvent::Warning(SessionWarning::Encoder(e)));
        }
    }
}
