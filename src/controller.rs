//! Capture session state machine.
//!
//! A session moves `Idle -> Configured -> Acquiring -> Complete -> Stopped`.
//! Any failure moves it to `Aborted`; the sensor is closed before the error
//! is returned and no frame is produced.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::buffer::{FrameBuffer, FramePool};
use crate::completion::{self, CompletionSignal};
use crate::config::{CaptureConfig, TransferMode, BYTES_PER_PIXEL};
use crate::error::{SessionError, TransferError};
use crate::persist::ImageSink;
use crate::sensor::SensorHandle;
use crate::traits::SensorDriver;

/// Lifecycle of one capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing opened yet.
    Idle,
    /// Sensor opened and mode registers applied.
    Configured,
    /// Buffer reserved and acquisition started.
    Acquiring,
    /// Frame fully transferred.
    Complete,
    /// Sensor stopped and closed; the frame is ready for hand-off.
    Stopped,
    /// The session failed; no frame was produced.
    Aborted,
}

/// Runs one capture session against a sensor driver.
///
/// The controller owns the driver, the buffer pool and the session
/// configuration; nothing is shared with other sessions.
pub struct CaptureController<D: SensorDriver> {
    driver: D,
    pool: FramePool,
    config: CaptureConfig,
    wait_limit: Option<Duration>,
    state: SessionState,
}

impl<D: SensorDriver> CaptureController<D> {
    /// Create an idle controller.
    pub fn new(driver: D, pool: FramePool, config: CaptureConfig) -> Self {
        Self {
            driver,
            pool,
            config,
            wait_limit: None,
            state: SessionState::Idle,
        }
    }

    /// Bound the event-driven wait. Without a limit the controller waits
    /// until the driver signals or abandons the transfer.
    #[must_use]
    pub fn with_wait_limit(mut self, limit: Duration) -> Self {
        self.wait_limit = Some(limit);
        self
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session configuration.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// The buffer pool.
    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    /// The underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Consume the controller, returning the driver.
    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Capture one frame, leaving the session `Stopped`.
    ///
    /// The returned buffer holds a complete frame of the active preset.
    pub fn capture(&mut self) -> Result<FrameBuffer, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState(self.state));
        }

        let result = self.run_session();
        if let Err(err) = &result {
            warn!("Capture session aborted: {err}");
            self.state = SessionState::Aborted;
        }
        result
    }

    /// Persist a captured frame and release its buffer.
    pub fn deliver<S: ImageSink>(
        &mut self,
        frame: FrameBuffer,
        sink: &mut S,
        path: &Path,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Stopped {
            return Err(SessionError::InvalidState(self.state));
        }

        let preset = self.config.preset;
        let started = Instant::now();
        let written = sink.write_grayscale_image(
            path,
            preset.width(),
            preset.height(),
            BYTES_PER_PIXEL,
            &frame,
        );
        self.pool.release(frame);
        written?;

        info!(path = %path.display(), elapsed = ?started.elapsed(), "Frame written");
        Ok(())
    }

    /// Capture one frame and persist it to `path`.
    pub fn run<S: ImageSink>(&mut self, sink: &mut S, path: &Path) -> Result<(), SessionError> {
        let frame = self.capture()?;
        self.deliver(frame, sink, path)
    }

    fn run_session(&mut self) -> Result<FrameBuffer, SessionError> {
        let Self {
            driver,
            pool,
            config,
            wait_limit,
            state,
        } = self;

        let mut sensor = SensorHandle::open(driver, config)?;
        sensor.apply_mode_registers(config)?;
        *state = SessionState::Configured;

        let buffer = match pool.reserve(config.frame_size()) {
            Ok(buffer) => buffer,
            Err(err) => {
                sensor.close();
                return Err(err.into());
            }
        };
        info!(size = buffer.len(), "Initialized buffer");

        *state = SessionState::Acquiring;
        let acquired = match config.transfer {
            TransferMode::Blocking => acquire_blocking(&mut sensor, buffer),
            TransferMode::EventDriven => acquire_event_driven(&mut sensor, buffer, *wait_limit),
        };
        let buffer = match acquired {
            Ok(buffer) => buffer,
            Err(err) => {
                if let Err(stop_err) = sensor.stop() {
                    debug!("Stop after failed transfer: {stop_err}");
                }
                sensor.close();
                return Err(err);
            }
        };
        *state = SessionState::Complete;

        sensor.stop()?;
        sensor.close();
        *state = SessionState::Stopped;
        info!(preset = %config.preset, "Frame captured");
        Ok(buffer)
    }
}

fn acquire_blocking<D: SensorDriver>(
    sensor: &mut SensorHandle<'_, D>,
    mut buffer: FrameBuffer,
) -> Result<FrameBuffer, SessionError> {
    info!(mode = "blocking", "Starting capture");
    sensor.start()?;
    sensor.capture_blocking(&mut buffer)?;
    Ok(buffer)
}

fn acquire_event_driven<D: SensorDriver>(
    sensor: &mut SensorHandle<'_, D>,
    buffer: FrameBuffer,
    wait_limit: Option<Duration>,
) -> Result<FrameBuffer, SessionError> {
    info!(mode = "event-driven", "Starting capture");
    // Armed and registered before start so a fast completion is never missed.
    let (signal, notifier) = completion::arm();
    sensor.capture_async(buffer, notifier)?;
    sensor.start()?;
    Ok(await_completion(&signal, wait_limit)?)
}

/// Yield until the transfer completes, is abandoned, or the limit expires.
fn await_completion(
    signal: &CompletionSignal,
    limit: Option<Duration>,
) -> Result<FrameBuffer, TransferError> {
    let started = Instant::now();
    loop {
        if let Some(buffer) = signal.try_take()? {
            debug!(elapsed = ?started.elapsed(), "Transfer complete");
            return Ok(buffer);
        }
        if let Some(limit) = limit {
            if started.elapsed() >= limit {
                return Err(TransferError::Timeout(limit));
            }
        }
        thread::yield_now();
    }
}
