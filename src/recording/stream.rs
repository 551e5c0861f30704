//! Recording stream state machine
//!
//! `Idle -> Configured -> Recording -> Idle`, plus `Configured -> Configured`
//! on reconfiguration. Every transition runs under one control mutex. The
//! current state lives in a separate lock so the drain thread can poll it
//! while `stop()` holds the control mutex and waits for that thread. The
//! drain thread writes it once, to Idle, when a fault ends the recording.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::JoinHandle;

use super::codec::{CodecBackend, InputSurface};
use super::config::{RecordingStats, StreamConfig};
use super::drain::{drain_pass, run_drain_loop};
use super::session::EncodeSession;
use crate::errors::RecordingError;
use crate::pool::DataProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Configured,
    Recording,
}

type DrainOutcome = (EncodeSession, Result<(), RecordingError>);

#[derive(Default)]
struct Control {
    config: Option<StreamConfig>,
    session: Option<EncodeSession>,
    drain_thread: Option<JoinHandle<DrainOutcome>>,
    input_surface: Option<InputSurface>,
    reconfigure_count: u64,
    /// Error that ended the drain thread, kept for the next start/stop
    fault: Option<RecordingError>,
}

/// A single-video-track recording stream.
///
/// Owns the encoder/muxer lifecycle: `configure` builds them, `start` hands
/// them to a drain thread, `stop` takes them back, flushes the encoder with
/// end of stream and finalizes the container.
pub struct RecordingStream {
    backend: Arc<dyn CodecBackend>,
    state: Arc<RwLock<StreamState>>,
    control: Mutex<Control>,
    provider: RwLock<Option<Arc<dyn DataProvider>>>,
}

impl RecordingStream {
    pub fn new(backend: Arc<dyn CodecBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(RwLock::new(StreamState::Idle)),
            control: Mutex::new(Control::default()),
            provider: RwLock::new(None),
        }
    }

    /// Install the frame source used when not recording from an input surface.
    ///
    /// Takes effect at the next `start()`.
    pub fn set_data_provider(&self, provider: Arc<dyn DataProvider>) {
        *self.provider.write().unwrap_or_else(|e| e.into_inner()) = Some(provider);
    }

    pub fn clear_data_provider(&self) {
        *self.provider.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn state(&self) -> StreamState {
        read_state(&self.state)
    }

    pub fn is_recording(&self) -> bool {
        self.state() == StreamState::Recording
    }

    /// Number of times a changed configuration forced encoder/muxer teardown
    pub fn reconfigure_count(&self) -> u64 {
        self.lock_control().reconfigure_count
    }

    pub fn config(&self) -> Option<StreamConfig> {
        let mut control = self.lock_control();
        self.reap_faulted_drain(&mut control);
        control.config.clone()
    }

    /// The encoder's producer surface, while configured or recording in
    /// surface mode.
    pub fn input_surface(&self) -> Option<InputSurface> {
        let mut control = self.lock_control();
        self.reap_faulted_drain(&mut control);
        control.input_surface.clone()
    }

    /// Build the encoder and muxer for `config`.
    ///
    /// Allowed from Idle and Configured. Re-applying the active
    /// configuration is a no-op; a different one releases the current
    /// encoder and muxer first. On failure the stream is left Idle.
    pub fn configure(&self, config: StreamConfig) -> Result<(), RecordingError> {
        config.validate().map_err(RecordingError::Config)?;
        let mut control = self.lock_control();
        self.reap_faulted_drain(&mut control);
        if let Some(fault) = control.fault.take() {
            log::warn!("Discarding previous recording fault on reconfigure: {}", fault);
        }

        match self.state() {
            StreamState::Recording => {
                return Err(RecordingError::invalid_state(
                    "stream can only be configured when not recording",
                ));
            }
            StreamState::Configured => {
                if control.config.as_ref() == Some(&config) {
                    log::info!("Stream configuration unchanged, skipping reconfigure");
                    return Ok(());
                }
                log::info!("Stream configuration changed, rebuilding encoder and muxer");
                if let Some(mut session) = control.session.take() {
                    if let Err(e) = session.release() {
                        log::warn!("Error releasing previous encode session: {}", e);
                    }
                }
                control.config = None;
                control.input_surface = None;
                control.reconfigure_count += 1;
                self.set_state(StreamState::Idle);
            }
            StreamState::Idle => {}
        }

        let session = EncodeSession::open(self.backend.as_ref(), &config)?;
        control.input_surface = session.input_surface();
        control.session = Some(session);
        control.config = Some(config);
        self.set_state(StreamState::Configured);
        Ok(())
    }

    /// Start draining the encoder on a dedicated thread.
    ///
    /// Calling start on a recording stream has no effect. If the previous
    /// recording ended on a drain fault, that error is returned once.
    pub fn start(&self) -> Result<(), RecordingError> {
        let mut control = self.lock_control();
        self.reap_faulted_drain(&mut control);
        if let Some(fault) = control.fault.take() {
            return Err(fault);
        }

        match self.state() {
            StreamState::Recording => {
                log::warn!("Recording stream is already started");
                return Ok(());
            }
            StreamState::Idle => {
                return Err(RecordingError::invalid_state(
                    "recording stream is not configured yet",
                ));
            }
            StreamState::Configured => {}
        }

        let session = control
            .session
            .take()
            .ok_or_else(|| RecordingError::invalid_state("configured stream has no encode session"))?;
        let provider = self.current_provider();
        if provider.is_none() && !session.config().uses_producer_surface {
            log::warn!("No data provider installed, nothing will be recorded");
        }

        self.set_state(StreamState::Recording);
        let state = Arc::clone(&self.state);
        let spawned = std::thread::Builder::new()
            .name("crabcorder-drain".to_string())
            .spawn(move || {
                run_drain_loop(
                    session,
                    provider.as_deref(),
                    || read_state(&state) == StreamState::Recording,
                    || write_state(&state, StreamState::Idle),
                )
            });

        match spawned {
            Ok(handle) => {
                control.drain_thread = Some(handle);
                log::info!("Recording started");
                Ok(())
            }
            Err(e) => {
                // The session went down with the closure and released itself
                control.config = None;
                control.input_surface = None;
                self.set_state(StreamState::Idle);
                Err(RecordingError::unavailable(format!(
                    "failed to spawn drain thread: {}",
                    e
                )))
            }
        }
    }

    /// Stop recording and finalize the output file.
    ///
    /// Blocks until the drain thread exits, flushes the encoder with end of
    /// stream, then releases encoder and muxer. The capture source should be
    /// halted first. Calling stop when not recording logs and returns
    /// `Ok(None)`, unless the drain thread already ended the recording on
    /// a fault, in which case that error is returned. The stream is Idle
    /// afterwards even on error.
    pub fn stop(&self) -> Result<Option<RecordingStats>, RecordingError> {
        let mut control = self.lock_control();
        self.reap_faulted_drain(&mut control);
        if let Some(fault) = control.fault.take() {
            return Err(fault);
        }

        match self.state() {
            StreamState::Recording => {}
            StreamState::Configured => {
                log::warn!("Recording stream is configured but not started");
                return Ok(None);
            }
            StreamState::Idle => {
                log::warn!("Recording stream is idle, nothing to stop");
                return Ok(None);
            }
        }
        self.set_state(StreamState::Idle);
        control.config = None;
        control.input_surface = None;

        let handle = control
            .drain_thread
            .take()
            .ok_or_else(|| RecordingError::invalid_state("recording stream has no drain thread"))?;
        let (mut session, loop_result) = handle
            .join()
            .map_err(|_| RecordingError::protocol("drain thread panicked"))?;

        let provider = self.current_provider();
        let drain_result = loop_result
            .and_then(|_| drain_pass(&mut session, provider.as_deref(), true, &|| true));
        let release_result = session.release();
        let stats = session.stats().clone();
        drop(session);

        drain_result?;
        release_result?;

        log::info!(
            "Recording stopped: {} frames queued, {} samples, {} bytes -> {}",
            stats.frames_queued,
            stats.samples_written,
            stats.bytes_written,
            stats.output_path
        );
        Ok(Some(stats))
    }

    fn set_state(&self, next: StreamState) {
        write_state(&self.state, next);
    }

    /// Collect a drain thread that halted the stream on its own.
    ///
    /// The thread released its session before flipping the state, so only
    /// the error is kept.
    fn reap_faulted_drain(&self, control: &mut Control) {
        if self.state() == StreamState::Recording {
            return;
        }
        let Some(handle) = control.drain_thread.take() else {
            return;
        };
        control.config = None;
        control.input_surface = None;
        match handle.join() {
            Ok((_session, Err(e))) => control.fault = Some(e),
            Ok((_session, Ok(()))) => {}
            Err(_) => control.fault = Some(RecordingError::protocol("drain thread panicked")),
        }
    }

    fn current_provider(&self) -> Option<Arc<dyn DataProvider>> {
        self.provider
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for RecordingStream {
    fn drop(&mut self) {
        if !self.is_recording() {
            let mut control = self.lock_control();
            self.reap_faulted_drain(&mut control);
            if let Some(fault) = control.fault.take() {
                log::warn!("Recording stream dropped after drain fault: {}", fault);
            }
            return;
        }
        if let Err(e) = self.stop() {
            log::warn!("Error stopping recording stream in drop: {}", e);
        }
    }
}

fn read_state(state: &RwLock<StreamState>) -> StreamState {
    *state.read().unwrap_or_else(|e| e.into_inner())
}

fn write_state(state: &RwLock<StreamState>, next: StreamState) {
    let mut state = state.write().unwrap_or_else(|e| e.into_inner());
    log::debug!("Stream state {:?} -> {:?}", *state, next);
    *state = next;
}
