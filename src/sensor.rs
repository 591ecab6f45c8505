//! Session-scoped handle over an opened sensor.

use std::thread;

use tracing::{debug, info, warn};

use crate::buffer::FrameBuffer;
use crate::completion::CompletionNotifier;
use crate::config::{CaptureConfig, Resolution};
use crate::error::{DriverError, OpenError, SensorError, TransferError};
use crate::traits::{ControlCommand, Register, SensorDriver};

/// An opened, configured sensor.
///
/// The handle borrows the driver exclusively for one session. Closing
/// consumes it; dropping an unclosed handle closes the device.
pub struct SensorHandle<'d, D: SensorDriver> {
    driver: &'d mut D,
    preset: Resolution,
    orientation: u8,
    streaming: bool,
    closed: bool,
}

impl<'d, D: SensorDriver> SensorHandle<'d, D> {
    /// Open the device, set and verify the orientation, then initialise
    /// auto exposure.
    ///
    /// The orientation read-back must match the written value. The device is
    /// closed again on any failure after the underlying open succeeded.
    pub fn open(driver: &'d mut D, config: &CaptureConfig) -> Result<Self, OpenError> {
        info!(preset = %config.preset, "Opening Himax camera");
        driver
            .open(config.preset)
            .map_err(OpenError::DeviceOpenFailed)?;

        let mut handle = Self {
            driver,
            preset: config.preset,
            orientation: 0,
            streaming: false,
            closed: false,
        };

        handle
            .driver
            .control(ControlCommand::Start)
            .map_err(OpenError::Setup)?;
        handle
            .driver
            .write_register(Register::Orientation, config.orientation)
            .map_err(OpenError::Setup)?;
        thread::sleep(config.settle);
        let read = handle
            .driver
            .read_register(Register::Orientation)
            .map_err(OpenError::Setup)?;

        if read != config.orientation {
            return Err(OpenError::OrientationMismatch {
                written: config.orientation,
                read,
            });
        }
        handle.orientation = read;
        debug!(orientation = read, "Orientation verified");

        if let Err(err) = handle.driver.control(ControlCommand::AutoExposureInit) {
            warn!("Auto exposure init failed: {err}");
        }

        Ok(handle)
    }

    /// Write the preset- and transfer-specific registers.
    ///
    /// Read-back values are only logged; a mismatch does not fail the session.
    pub fn apply_mode_registers(&mut self, config: &CaptureConfig) -> Result<(), SensorError> {
        if let Some(value) = config.qvga_window {
            let read = self.write_observed(Register::QvgaWindowEnable, value)?;
            info!("qvga window enabled {read}");
        }
        if let Some(value) = config.pixel_shift {
            let read = self.write_observed(Register::PixelShiftEnable, value)?;
            info!("vsync hsync pixel shift enabled {read}");
        }
        Ok(())
    }

    fn write_observed(&mut self, register: Register, value: u8) -> Result<u8, DriverError> {
        self.driver.write_register(register, value)?;
        let read = self.driver.read_register(register)?;
        if read == value {
            debug!(?register, value, "Register write confirmed");
        } else {
            warn!(?register, written = value, read, "Register read-back differs");
        }
        Ok(read)
    }

    /// Start acquisition. Starting twice without a stop is rejected.
    pub fn start(&mut self) -> Result<(), SensorError> {
        if self.streaming {
            return Err(SensorError::AlreadyStreaming);
        }
        self.driver.control(ControlCommand::Start)?;
        self.streaming = true;
        Ok(())
    }

    /// Stop acquisition. Stopping an already stopped sensor succeeds.
    pub fn stop(&mut self) -> Result<(), SensorError> {
        let result = self.driver.control(ControlCommand::Stop);
        if !self.streaming {
            if let Err(err) = result {
                debug!("Stop on idle sensor reported: {err}");
            }
            return Ok(());
        }
        result?;
        self.streaming = false;
        Ok(())
    }

    /// Fill `buffer` with one frame, returning once it is complete.
    pub fn capture_blocking(&mut self, buffer: &mut FrameBuffer) -> Result<(), TransferError> {
        self.driver.capture_blocking(buffer)?;
        Ok(())
    }

    /// Register an event-driven transfer; it runs once acquisition starts.
    pub fn capture_async(
        &mut self,
        buffer: FrameBuffer,
        notifier: CompletionNotifier,
    ) -> Result<(), TransferError> {
        self.driver.capture_async(buffer, notifier)?;
        Ok(())
    }

    /// Release the device.
    pub fn close(mut self) {
        self.release();
    }

    /// Active resolution preset.
    pub fn preset(&self) -> Resolution {
        self.preset
    }

    /// Verified orientation code.
    pub fn orientation(&self) -> u8 {
        self.orientation
    }

    /// Whether acquisition is running.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn release(&mut self) {
        if !self.closed {
            self.driver.close();
            self.closed = true;
            self.streaming = false;
            debug!("Sensor closed");
        }
    }
}

impl<D: SensorDriver> Drop for SensorHandle<'_, D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, CaptureMode, TransferMode};
    use crate::mock::{DriverCall, MockSensor};
    use std::time::Duration;

    fn config(preset: Resolution, transfer: TransferMode) -> CaptureConfig {
        resolve(CaptureMode::new(preset, transfer)).with_settle(Duration::ZERO)
    }

    #[test]
    fn test_open_verifies_orientation() {
        let mut driver = MockSensor::new();
        let handle = SensorHandle::open(
            &mut driver,
            &config(Resolution::Full, TransferMode::Blocking),
        )
        .expect("open failed");
        assert_eq!(handle.orientation(), 3);
        assert_eq!(handle.preset(), Resolution::Full);
        assert!(!handle.is_streaming());
        handle.close();

        assert_eq!(
            driver.calls(),
            &[
                DriverCall::Open(Resolution::Full),
                DriverCall::Control(ControlCommand::Start),
                DriverCall::Write(Register::Orientation, 3),
                DriverCall::Read(Register::Orientation),
                DriverCall::Control(ControlCommand::AutoExposureInit),
                DriverCall::Close,
            ]
        );
    }

    #[test]
    fn test_open_orientation_mismatch_closes_device() {
        let mut driver = MockSensor::new().with_orientation_readback(0);
        let result = SensorHandle::open(
            &mut driver,
            &config(Resolution::Full, TransferMode::Blocking),
        );
        assert!(matches!(
            result,
            Err(OpenError::OrientationMismatch {
                written: 3,
                read: 0
            })
        ));
        drop(result);
        assert_eq!(driver.close_count(), 1);
    }

    #[test]
    fn test_open_failure_never_closes() {
        let mut driver = MockSensor::new().with_open_failure();
        let result = SensorHandle::open(
            &mut driver,
            &config(Resolution::Full, TransferMode::Blocking),
        );
        assert!(matches!(result, Err(OpenError::DeviceOpenFailed(_))));
        drop(result);
        assert_eq!(driver.close_count(), 0);
    }

    #[test]
    fn test_auto_exposure_failure_is_not_fatal() {
        let mut driver = MockSensor::new().with_auto_exposure_failure();
        let handle = SensorHandle::open(
            &mut driver,
            &config(Resolution::Full, TransferMode::Blocking),
        );
        assert!(handle.is_ok());
    }

    #[test]
    fn test_mode_registers_for_reduced_blocking() {
        let mut driver = MockSensor::new();
        let cfg = config(Resolution::Reduced, TransferMode::Blocking);
        let mut handle = SensorHandle::open(&mut driver, &cfg).expect("open failed");
        handle.apply_mode_registers(&cfg).expect("apply failed");
        handle.close();

        assert_eq!(driver.register(Register::QvgaWindowEnable), Some(1));
        assert_eq!(driver.register(Register::PixelShiftEnable), Some(0));
    }

    #[test]
    fn test_mode_register_mismatch_is_observational() {
        let mut driver = MockSensor::new().with_ignored_register(Register::QvgaWindowEnable);
        let cfg = config(Resolution::Reduced, TransferMode::EventDriven);
        let mut handle = SensorHandle::open(&mut driver, &cfg).expect("open failed");
        assert!(handle.apply_mode_registers(&cfg).is_ok());
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut driver = MockSensor::new();
        let cfg = config(Resolution::Full, TransferMode::Blocking);
        let mut handle = SensorHandle::open(&mut driver, &cfg).expect("open failed");
        handle.start().expect("first start failed");
        assert!(matches!(handle.start(), Err(SensorError::AlreadyStreaming)));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut driver = MockSensor::new().with_stop_failure_when_idle();
        let cfg = config(Resolution::Full, TransferMode::Blocking);
        let mut handle = SensorHandle::open(&mut driver, &cfg).expect("open failed");
        handle.start().expect("start failed");
        handle.stop().expect("first stop failed");
        handle.stop().expect("second stop failed");
        assert!(!handle.is_streaming());
    }

    #[test]
    fn test_drop_closes_exactly_once() {
        let mut driver = MockSensor::new();
        let cfg = config(Resolution::Full, TransferMode::Blocking);
        {
            let _handle = SensorHandle::open(&mut driver, &cfg).expect("open failed");
        }
        assert_eq!(driver.close_count(), 1);
    }
}
