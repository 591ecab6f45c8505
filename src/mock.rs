//! Simulated sensor for testing and development without hardware.

use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::buffer::FrameBuffer;
use crate::completion::{CompletionNotifier, SignalState};
use crate::config::Resolution;
use crate::error::{DriverError, Result};
use crate::traits::{ControlCommand, DeviceCapabilities, Register, SensorDriver};

/// A driver call recorded by [`MockSensor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    /// `open` with the given preset.
    Open(Resolution),
    /// `control` with the given command.
    Control(ControlCommand),
    /// `write_register`.
    Write(Register, u8),
    /// `read_register`.
    Read(Register),
    /// `capture_blocking` with the given buffer length.
    CaptureBlocking(usize),
    /// `capture_async` with the given buffer length.
    CaptureAsync(usize),
    /// `close`.
    Close,
}

/// Test pattern types for simulated frame generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Every pixel set to the given value.
    Solid(u8),
}

/// How a registered event-driven transfer completes once acquisition starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncCompletion {
    /// Completes inside the `Start` call, before it returns.
    Inline,
    /// Completes on a worker thread after the given delay.
    Worker(Duration),
    /// The notifier is dropped without firing.
    Abandon,
    /// Never completes while the device stays open.
    Hang,
}

/// Mock sensor for testing without hardware.
pub struct MockSensor {
    capabilities: DeviceCapabilities,
    pattern: TestPattern,
    completion: AsyncCompletion,
    fail_open: bool,
    fail_auto_exposure: bool,
    fail_stop_when_idle: bool,
    fail_capture: bool,
    orientation_readback: Option<u8>,
    ignored_registers: Vec<Register>,
    registers: HashMap<Register, u8>,
    preset: Option<Resolution>,
    streaming: bool,
    pending: Option<(FrameBuffer, CompletionNotifier)>,
    worker: Option<JoinHandle<()>>,
    signal_state_at_start: Option<SignalState>,
    calls: Vec<DriverCall>,
    close_count: u32,
}

impl Default for MockSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSensor {
    /// Create a new mock sensor with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Simulated HM01B0".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            pattern: TestPattern::Gradient,
            completion: AsyncCompletion::Inline,
            fail_open: false,
            fail_auto_exposure: false,
            fail_stop_when_idle: false,
            fail_capture: false,
            orientation_readback: None,
            ignored_registers: Vec::new(),
            registers: HashMap::new(),
            preset: None,
            streaming: false,
            pending: None,
            worker: None,
            signal_state_at_start: None,
            calls: Vec::new(),
            close_count: 0,
        }
    }

    /// Set the frame pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Set how event-driven transfers complete.
    #[must_use]
    pub fn with_async_completion(mut self, completion: AsyncCompletion) -> Self {
        self.completion = completion;
        self
    }

    /// Make `open` fail.
    #[must_use]
    pub fn with_open_failure(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Make the orientation register always read back `value`.
    #[must_use]
    pub fn with_orientation_readback(mut self, value: u8) -> Self {
        self.orientation_readback = Some(value);
        self
    }

    /// Silently drop writes to `register`.
    #[must_use]
    pub fn with_ignored_register(mut self, register: Register) -> Self {
        self.ignored_registers.push(register);
        self
    }

    /// Make the auto exposure init command fail.
    #[must_use]
    pub fn with_auto_exposure_failure(mut self) -> Self {
        self.fail_auto_exposure = true;
        self
    }

    /// Make `Stop` fail while acquisition is not running.
    #[must_use]
    pub fn with_stop_failure_when_idle(mut self) -> Self {
        self.fail_stop_when_idle = true;
        self
    }

    /// Make blocking captures fail after writing part of the frame.
    #[must_use]
    pub fn with_capture_failure(mut self) -> Self {
        self.fail_capture = true;
        self
    }

    /// Set the capabilities for this mock sensor.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Every driver call so far, in order.
    pub fn calls(&self) -> &[DriverCall] {
        &self.calls
    }

    /// Current register value, if it has been written.
    pub fn register(&self, register: Register) -> Option<u8> {
        self.registers.get(&register).copied()
    }

    /// Number of `close` calls.
    pub fn close_count(&self) -> u32 {
        self.close_count
    }

    /// Signal state observed when `Start` launched the registered transfer.
    pub fn signal_state_at_start(&self) -> Option<SignalState> {
        self.signal_state_at_start
    }

    /// Whether the device is open.
    pub fn is_open(&self) -> bool {
        self.preset.is_some()
    }

    fn require_open(&self) -> Result<Resolution> {
        self.preset.ok_or(DriverError::NotOpen)
    }

    fn launch_pending(&mut self, width: u32) {
        let Some((mut buffer, notifier)) = self.pending.take() else {
            return;
        };
        self.signal_state_at_start = Some(notifier.state());

        let pattern = self.pattern;
        match self.completion {
            AsyncCompletion::Inline => {
                fill_test_frame(&mut buffer, width, pattern);
                notifier.signal(buffer);
            }
            AsyncCompletion::Worker(delay) => {
                self.worker = Some(thread::spawn(move || {
                    thread::sleep(delay);
                    fill_test_frame(&mut buffer, width, pattern);
                    notifier.signal(buffer);
                }));
            }
            AsyncCompletion::Abandon => {
                debug!("Dropping simulated transfer");
            }
            AsyncCompletion::Hang => {
                self.pending = Some((buffer, notifier));
            }
        }
    }
}

impl SensorDriver for MockSensor {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn open(&mut self, preset: Resolution) -> Result<()> {
        self.calls.push(DriverCall::Open(preset));
        if self.fail_open {
            return Err(DriverError::Open("simulated open failure".to_owned()));
        }
        self.preset = Some(preset);
        Ok(())
    }

    fn control(&mut self, command: ControlCommand) -> Result<()> {
        self.calls.push(DriverCall::Control(command));
        let preset = self.require_open()?;

        match command {
            ControlCommand::Start => {
                self.streaming = true;
                self.launch_pending(preset.width());
            }
            ControlCommand::Stop => {
                if !self.streaming && self.fail_stop_when_idle {
                    return Err(DriverError::Stream("not streaming".to_owned()));
                }
                self.streaming = false;
            }
            ControlCommand::AutoExposureInit => {
                if self.fail_auto_exposure {
                    return Err(DriverError::Stream("AEG init rejected".to_owned()));
                }
            }
        }
        Ok(())
    }

    fn write_register(&mut self, register: Register, value: u8) -> Result<()> {
        self.calls.push(DriverCall::Write(register, value));
        self.require_open()?;
        if !self.ignored_registers.contains(&register) {
            self.registers.insert(register, value);
        }
        Ok(())
    }

    fn read_register(&mut self, register: Register) -> Result<u8> {
        self.calls.push(DriverCall::Read(register));
        self.require_open()?;
        if register == Register::Orientation {
            if let Some(value) = self.orientation_readback {
                return Ok(value);
            }
        }
        Ok(self.registers.get(&register).copied().unwrap_or(0))
    }

    fn capture_blocking(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.calls.push(DriverCall::CaptureBlocking(buffer.len()));
        let preset = self.require_open()?;
        if !self.streaming {
            return Err(DriverError::Stream("acquisition not started".to_owned()));
        }
        if self.fail_capture {
            let half = buffer.len() / 2;
            if let Some(partial) = buffer.get_mut(..half) {
                partial.fill(0xff);
            }
            return Err(DriverError::Stream("simulated transfer failure".to_owned()));
        }
        fill_test_frame(buffer, preset.width(), self.pattern);
        Ok(())
    }

    fn capture_async(&mut self, buffer: FrameBuffer, notifier: CompletionNotifier) -> Result<()> {
        self.calls.push(DriverCall::CaptureAsync(buffer.len()));
        self.require_open()?;
        if self.pending.is_some() {
            return Err(DriverError::TransferPending);
        }
        self.pending = Some((buffer, notifier));
        Ok(())
    }

    fn close(&mut self) {
        self.calls.push(DriverCall::Close);
        self.close_count += 1;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Simulated transfer thread panicked");
            }
        }
        self.pending = None;
        self.streaming = false;
        self.preset = None;
    }
}

/// Fill a grayscale frame with a test pattern.
pub fn fill_test_frame(buffer: &mut [u8], width: u32, pattern: TestPattern) {
    match pattern {
        TestPattern::Gradient => {
            let width = width.max(1) as usize;
            for row in buffer.chunks_mut(width) {
                for (x, pixel) in row.iter_mut().enumerate() {
                    #[allow(clippy::cast_possible_truncation)]
                    let value = ((x * 255) / width) as u8;
                    *pixel = value;
                }
            }
        }
        TestPattern::Solid(value) => buffer.fill(value),
    }
}
