//! Error types for sensor capture sessions.

use std::time::Duration;

use thiserror::Error;

use crate::traits::Register;

/// Failure reported by the underlying sensor driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The device node could not be opened or queried.
    #[error("Device open failed: {0}")]
    Open(String),
    /// The device is missing a capability the session needs.
    #[error("Device lacks capability: {0}")]
    MissingCapability(&'static str),
    /// The driver adjusted the requested frame size.
    #[error("Driver rejected {requested_width}x{requested_height} (offered {actual_width}x{actual_height})")]
    FormatRejected {
        /// Requested width in pixels.
        requested_width: u32,
        /// Requested height in pixels.
        requested_height: u32,
        /// Width the driver settled on.
        actual_width: u32,
        /// Height the driver settled on.
        actual_height: u32,
    },
    /// A register could not be accessed.
    #[error("Register {register:?} access failed: {reason}")]
    Register {
        /// Register being accessed.
        register: Register,
        /// Driver-provided reason.
        reason: String,
    },
    /// An operation was issued while the device was closed.
    #[error("Device is not open")]
    NotOpen,
    /// A transfer is already registered with the driver.
    #[error("A transfer is already pending")]
    TransferPending,
    /// The device delivered fewer bytes than a full frame.
    #[error("Short frame: expected {expected} bytes, got {actual}")]
    ShortFrame {
        /// Full frame size in bytes.
        expected: usize,
        /// Bytes delivered.
        actual: usize,
    },
    /// Streaming I/O failed.
    #[error("Stream error: {0}")]
    Stream(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while opening and configuring the sensor.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The underlying open call failed.
    #[error("Failed to open camera: {0}")]
    DeviceOpenFailed(#[source] DriverError),
    /// The orientation register did not read back the written value.
    #[error("Failed to rotate camera image: wrote {written}, read back {read}")]
    OrientationMismatch {
        /// Value written to the orientation register.
        written: u8,
        /// Value read back after the settle interval.
        read: u8,
    },
    /// Register traffic during open failed.
    #[error("Sensor setup failed: {0}")]
    Setup(#[source] DriverError),
}

/// Failure of a control or register operation on an opened sensor.
#[derive(Debug, Error)]
pub enum SensorError {
    /// Acquisition was started twice without a stop in between.
    #[error("Acquisition already running")]
    AlreadyStreaming,
    /// Driver failure.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Failure to reserve the frame buffer.
#[derive(Debug, Error)]
pub enum AllocError {
    /// The allocator could not satisfy the request.
    #[error("Out of memory: requested {requested} bytes")]
    OutOfMemory {
        /// Requested size in bytes.
        requested: usize,
    },
}

/// Failure of a frame transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The driver reported a transfer failure.
    #[error("Transfer failed: {0}")]
    Driver(#[from] DriverError),
    /// The completion notifier was dropped without firing.
    #[error("Transfer abandoned before completion")]
    Abandoned,
    /// The bounded wait expired before completion.
    #[error("Transfer did not complete within {0:?}")]
    Timeout(Duration),
}

/// Failure to persist a captured frame.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Only 8- and 16-bit grayscale are supported.
    #[error("Unsupported pixel depth: {0} bytes")]
    UnsupportedDepth(u8),
    /// The buffer does not hold exactly one frame.
    #[error("Buffer holds {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Expected size in bytes.
        expected: usize,
        /// Actual buffer length.
        actual: usize,
    },
    /// Encoder failure.
    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A captured frame did not match the expected size or test pattern.
#[derive(Debug, Error)]
#[error("Frame validation failed: {0}")]
pub struct ValidationError(pub String);

/// Any failure that aborts a capture session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Open or orientation verification failed.
    #[error(transparent)]
    Open(#[from] OpenError),
    /// Control or register operation failed.
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),
    /// Buffer reservation failed.
    #[error("Failed to reserve frame buffer: {0}")]
    Alloc(#[from] AllocError),
    /// Frame transfer failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),
    /// Persisting the frame failed.
    #[error("Failed to write image: {0}")]
    Persist(#[from] PersistError),
    /// The operation is not valid in the session's current state.
    #[error("Invalid session state: {0:?}")]
    InvalidState(crate::controller::SessionState),
}

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_messages_name_failure_kind() {
        let open = SessionError::from(OpenError::OrientationMismatch {
            written: 3,
            read: 0,
        });
        assert_eq!(
            open.to_string(),
            "Failed to rotate camera image: wrote 3, read back 0"
        );

        let alloc = SessionError::from(AllocError::OutOfMemory { requested: 104_976 });
        assert_eq!(
            alloc.to_string(),
            "Failed to reserve frame buffer: Out of memory: requested 104976 bytes"
        );
    }

    #[test]
    fn test_driver_error_converts_into_transfer_error() {
        let err: TransferError = DriverError::NotOpen.into();
        assert!(matches!(err, TransferError::Driver(DriverError::NotOpen)));
    }
}
