//! Core traits and types for the sensor driver abstraction.

use crate::buffer::FrameBuffer;
use crate::completion::CompletionNotifier;
use crate::config::Resolution;
use crate::error::Result;

/// Sensor registers touched by a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Image orientation (bit 0 mirror, bit 1 flip).
    Orientation,
    /// QVGA cropping window enable.
    QvgaWindowEnable,
    /// VSYNC/HSYNC pixel shift enable.
    PixelShiftEnable,
}

impl Register {
    /// HM01B0 register address.
    #[must_use]
    pub const fn address(self) -> u16 {
        match self {
            Self::Orientation => 0x0101,
            Self::QvgaWindowEnable => 0x3010,
            Self::PixelShiftEnable => 0x3022,
        }
    }
}

/// Control commands understood by the sensor driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Start the sensor (wake for register access, or begin acquisition).
    Start,
    /// Stop acquisition.
    Stop,
    /// Initialise auto exposure and gain.
    AutoExposureInit,
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Abstraction over the sensor/bus driver.
///
/// Implementations own the physical transport. Register values are single
/// bytes, matching the sensor's 8-bit register file.
pub trait SensorDriver {
    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Open the device configured for the given resolution preset.
    fn open(&mut self, preset: Resolution) -> Result<()>;

    /// Issue a control command.
    fn control(&mut self, command: ControlCommand) -> Result<()>;

    /// Write a sensor register.
    fn write_register(&mut self, register: Register, value: u8) -> Result<()>;

    /// Read a sensor register.
    fn read_register(&mut self, register: Register) -> Result<u8>;

    /// Capture one frame into `buffer`, returning once it is completely filled.
    fn capture_blocking(&mut self, buffer: &mut [u8]) -> Result<()>;

    /// Register an event-driven transfer into `buffer`.
    ///
    /// The transfer runs once acquisition is started. The driver hands the
    /// filled buffer back through `notifier`; dropping the notifier without
    /// firing it reports the transfer as abandoned.
    fn capture_async(&mut self, buffer: FrameBuffer, notifier: CompletionNotifier) -> Result<()>;

    /// Release the device.
    fn close(&mut self);
}
