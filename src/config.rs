//! Capture configuration resolution.
//!
//! A [`CaptureMode`] is picked once at startup; [`resolve`] turns it into the
//! concrete register values the session writes.

use std::fmt;
use std::time::Duration;

/// Sensor row width shared by both presets.
pub const FRAME_WIDTH: u32 = 324;

/// Grayscale depth of a captured frame.
pub const BYTES_PER_PIXEL: u8 = 1;

/// Orientation code written at open (mirror + flip).
pub const DEFAULT_ORIENTATION: u8 = 3;

/// Delay between writing the orientation register and reading it back.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(1);

/// Value written to the QVGA window-enable register in the reduced preset.
pub const QVGA_WINDOW_ENABLE: u8 = 1;

/// Value written to the pixel-shift register for blocking transfers.
pub const PIXEL_SHIFT_DISABLE: u8 = 0;

/// Fixed resolution presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    /// 324x324.
    #[default]
    Full,
    /// 324x244 (QVGA window).
    Reduced,
}

impl Resolution {
    /// Frame width in pixels.
    #[must_use]
    pub const fn width(self) -> u32 {
        FRAME_WIDTH
    }

    /// Frame height in pixels.
    #[must_use]
    pub const fn height(self) -> u32 {
        match self {
            Self::Full => 324,
            Self::Reduced => 244,
        }
    }

    /// Frame size in bytes at one byte per pixel.
    #[must_use]
    pub const fn frame_size(self) -> usize {
        (self.width() * self.height()) as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width(), self.height())
    }
}

/// How frame data is moved into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// The capture call returns once the frame is in the buffer.
    #[default]
    Blocking,
    /// The capture call returns immediately; completion is notified.
    EventDriven,
}

/// Mode selection made once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureMode {
    /// Resolution preset.
    pub preset: Resolution,
    /// Transfer mode.
    pub transfer: TransferMode,
}

impl CaptureMode {
    /// Create a mode selection.
    #[must_use]
    pub const fn new(preset: Resolution, transfer: TransferMode) -> Self {
        Self { preset, transfer }
    }
}

/// Concrete sensor settings for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Resolution preset.
    pub preset: Resolution,
    /// Transfer mode.
    pub transfer: TransferMode,
    /// Orientation code, verified by read-back at open.
    pub orientation: u8,
    /// Value for the QVGA window-enable register, if it is to be written.
    pub qvga_window: Option<u8>,
    /// Value for the pixel-shift register, if it is to be written.
    pub pixel_shift: Option<u8>,
    /// Settle interval before the orientation read-back.
    pub settle: Duration,
}

impl CaptureConfig {
    /// Override the settle interval.
    #[must_use]
    pub const fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Frame buffer size for this configuration.
    #[must_use]
    pub const fn frame_size(&self) -> usize {
        self.preset.frame_size()
    }
}

/// Derive the sensor settings for a mode selection.
#[must_use]
pub const fn resolve(mode: CaptureMode) -> CaptureConfig {
    let qvga_window = match mode.preset {
        Resolution::Reduced => Some(QVGA_WINDOW_ENABLE),
        Resolution::Full => None,
    };
    let pixel_shift = match mode.transfer {
        TransferMode::Blocking => Some(PIXEL_SHIFT_DISABLE),
        TransferMode::EventDriven => None,
    };

    CaptureConfig {
        preset: mode.preset,
        transfer: mode.transfer,
        orientation: DEFAULT_ORIENTATION,
        qvga_window,
        pixel_shift,
        settle: DEFAULT_SETTLE,
    }
}
