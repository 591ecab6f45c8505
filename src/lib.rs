//! Himax-Capture: single-frame capture control for a Himax HM01B0 image sensor
//!
//! This library sequences one capture session: open and verify the sensor,
//! reserve a frame buffer, run a blocking or event-driven transfer, stop the
//! sensor and hand the frame to a persistence sink. Hardware access goes
//! through the [`SensorDriver`] trait, backed by V4L2 in production and by
//! [`MockSensor`] in tests.

pub mod buffer;
pub mod completion;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod mock;
pub mod persist;
pub mod sensor;
pub mod traits;
pub mod validation;

pub use buffer::{FrameBuffer, FramePool};
pub use completion::{CompletionNotifier, CompletionSignal, SignalState};
pub use config::{resolve, CaptureConfig, CaptureMode, Resolution, TransferMode};
pub use controller::{CaptureController, SessionState};
pub use device::V4L2Sensor;
pub use error::{
    AllocError, DriverError, OpenError, PersistError, SensorError, SessionError, TransferError,
};
pub use mock::MockSensor;
pub use persist::{ImageSink, PgmFileSink};
pub use sensor::SensorHandle;
pub use traits::{ControlCommand, DeviceCapabilities, Register, SensorDriver};
