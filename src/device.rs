//! V4L2 sensor driver implementation using the v4l crate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::control::{Control, Value};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::buffer::FrameBuffer;
use crate::completion::CompletionNotifier;
use crate::config::Resolution;
use crate::error::{DriverError, Result};
use crate::traits::{ControlCommand, DeviceCapabilities, Register, SensorDriver};

const V4L2_CID_AUTOGAIN: u32 = 0x0098_0912;
const V4L2_CID_HFLIP: u32 = 0x0098_0914;
const V4L2_CID_VFLIP: u32 = 0x0098_0915;
const V4L2_CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const V4L2_EXPOSURE_AUTO: i64 = 0;

/// Driver-private control range (`V4L2_CID_USER_BASE | 0x1000`). Himax
/// registers without a standard control sit at this base plus the low byte
/// of their register address.
const HIMAX_CID_BASE: u32 = 0x0098_1900;

/// 8-bit grayscale pixel format.
const GREY: [u8; 4] = *b"GREY";

const STREAM_BUFFERS: u32 = 2;

/// Geometry of the negotiated capture format.
#[derive(Debug, Clone, Copy, Default)]
struct Layout {
    width: usize,
    stride: usize,
    size: usize,
}

/// HM01B0 sensor exposed through a V4L2 capture node.
pub struct V4L2Sensor {
    index: u32,
    device: Option<Device>,
    capabilities: DeviceCapabilities,
    layout: Layout,
    pending: Option<(FrameBuffer, CompletionNotifier)>,
    transfer: Option<JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
}

impl V4L2Sensor {
    /// Sensor at `/dev/video{index}`. The device is opened by [`SensorDriver::open`].
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self {
            index,
            device: None,
            capabilities: DeviceCapabilities::default(),
            layout: Layout::default(),
            pending: None,
            transfer: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn device(&self) -> Result<&Device> {
        self.device.as_ref().ok_or(DriverError::NotOpen)
    }

    fn set_control(&self, register: Register, id: u32, value: Value) -> Result<()> {
        self.device()?
            .set_control(Control { id, value })
            .map_err(|err| register_error(register, &err))
    }

    fn get_control(&self, register: Register, id: u32) -> Result<i64> {
        let control = self
            .device()?
            .control(id)
            .map_err(|err| register_error(register, &err))?;

        match control.value {
            Value::Integer(value) => Ok(value),
            Value::Boolean(value) => Ok(i64::from(value)),
            other => Err(DriverError::Register {
                register,
                reason: format!("unexpected control value {other:?}"),
            }),
        }
    }

    fn launch_transfer(&mut self) -> Result<()> {
        let Some((mut buffer, notifier)) = self.pending.take() else {
            return Ok(());
        };
        let index = self.index;
        let layout = self.layout;
        let cancelled = Arc::new(AtomicBool::new(false));
        self.cancelled = Arc::clone(&cancelled);

        let handle = thread::Builder::new()
            .name("himax-transfer".into())
            .spawn(move || {
                let result = if cancelled.load(Ordering::Acquire) {
                    Err(DriverError::Stream("transfer cancelled".to_owned()))
                } else {
                    Device::new(index as usize)
                        .map_err(DriverError::from)
                        .and_then(|device| read_frame(&device, layout, &mut buffer))
                };
                finish_transfer(&cancelled, result, buffer, notifier);
            })?;

        self.transfer = Some(handle);
        Ok(())
    }
}

impl SensorDriver for V4L2Sensor {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn open(&mut self, preset: Resolution) -> Result<()> {
        let device = Device::new(self.index as usize)
            .map_err(|err| DriverError::Open(err.to_string()))?;

        let caps = device
            .query_caps()
            .map_err(|err| DriverError::Open(err.to_string()))?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };
        if !capabilities.can_capture {
            return Err(DriverError::MissingCapability("video capture"));
        }
        if !capabilities.can_stream {
            return Err(DriverError::MissingCapability("streaming"));
        }

        let mut fmt = device.format()?;
        fmt.width = preset.width();
        fmt.height = preset.height();
        fmt.fourcc = FourCC::new(&GREY);
        let fmt = device.set_format(&fmt)?;

        if fmt.fourcc.repr != GREY {
            return Err(DriverError::MissingCapability("8-bit GREY format"));
        }
        if fmt.width != preset.width() || fmt.height != preset.height() {
            return Err(DriverError::FormatRejected {
                requested_width: preset.width(),
                requested_height: preset.height(),
                actual_width: fmt.width,
                actual_height: fmt.height,
            });
        }

        info!(
            device = self.index,
            driver = %capabilities.driver,
            card = %capabilities.card,
            "Opened V4L2 sensor"
        );
        self.layout = Layout {
            width: fmt.width as usize,
            stride: (fmt.stride as usize).max(fmt.width as usize),
            size: preset.frame_size(),
        };
        self.capabilities = capabilities;
        self.device = Some(device);
        Ok(())
    }

    fn control(&mut self, command: ControlCommand) -> Result<()> {
        self.device()?;
        match command {
            ControlCommand::Start => self.launch_transfer(),
            ControlCommand::Stop => {
                if self.transfer.as_ref().is_some_and(|handle| !handle.is_finished()) {
                    debug!("Stop issued while a transfer is still in flight");
                    self.cancelled.store(true, Ordering::Release);
                }
                Ok(())
            }
            ControlCommand::AutoExposureInit => {
                let device = self.device()?;
                device.set_control(Control {
                    id: V4L2_CID_AUTOGAIN,
                    value: Value::Boolean(true),
                })?;
                device.set_control(Control {
                    id: V4L2_CID_EXPOSURE_AUTO,
                    value: Value::Integer(V4L2_EXPOSURE_AUTO),
                })?;
                Ok(())
            }
        }
    }

    fn write_register(&mut self, register: Register, value: u8) -> Result<()> {
        debug!(?register, address = register.address(), value, "Register write");
        match register {
            Register::Orientation => {
                let (mirror, flip) = split_orientation(value);
                self.set_control(register, V4L2_CID_HFLIP, Value::Boolean(mirror))?;
                self.set_control(register, V4L2_CID_VFLIP, Value::Boolean(flip))
            }
            _ => self.set_control(
                register,
                private_control_id(register),
                Value::Integer(i64::from(value)),
            ),
        }
    }

    fn read_register(&mut self, register: Register) -> Result<u8> {
        match register {
            Register::Orientation => {
                let mirror = self.get_control(register, V4L2_CID_HFLIP)? != 0;
                let flip = self.get_control(register, V4L2_CID_VFLIP)? != 0;
                Ok(join_orientation(mirror, flip))
            }
            _ => {
                let value = self.get_control(register, private_control_id(register))?;
                u8::try_from(value).map_err(|_| DriverError::Register {
                    register,
                    reason: format!("value {value} does not fit a register"),
                })
            }
        }
    }

    fn capture_blocking(&mut self, buffer: &mut [u8]) -> Result<()> {
        read_frame(self.device()?, self.layout, buffer)
    }

    fn capture_async(&mut self, buffer: FrameBuffer, notifier: CompletionNotifier) -> Result<()> {
        self.device()?;
        if self.pending.is_some() {
            return Err(DriverError::TransferPending);
        }
        self.pending = Some((buffer, notifier));
        Ok(())
    }

    /// Release the device.
    ///
    /// An unfinished transfer is cancelled and its thread detached. A thread
    /// already blocked dequeuing keeps its own descriptor open until a frame
    /// arrives or the process exits; that frame is discarded.
    fn close(&mut self) {
        self.pending = None;
        self.cancelled.store(true, Ordering::Release);
        if let Some(handle) = self.transfer.take() {
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!("Transfer thread panicked");
                }
            } else {
                warn!("Closing with a transfer still in flight");
            }
        }
        if self.device.take().is_some() {
            debug!(device = self.index, "Closed V4L2 sensor");
        }
    }
}

/// Hand a finished transfer back unless it was cancelled meanwhile.
///
/// Dropping the notifier without firing reports the transfer as abandoned.
fn finish_transfer(
    cancelled: &AtomicBool,
    result: Result<()>,
    buffer: FrameBuffer,
    notifier: CompletionNotifier,
) {
    match result {
        Ok(()) if cancelled.load(Ordering::Acquire) => {
            debug!("Discarding frame from a cancelled transfer");
        }
        Ok(()) => notifier.signal(buffer),
        Err(err) => warn!("Async transfer failed: {err}"),
    }
}

/// Dequeue one frame and copy it row by row into `buffer`.
fn read_frame(device: &Device, layout: Layout, buffer: &mut [u8]) -> Result<()> {
    if buffer.len() != layout.size {
        return Err(DriverError::ShortFrame {
            expected: layout.size,
            actual: buffer.len(),
        });
    }

    let mut stream = Stream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
        .map_err(|err| DriverError::Stream(err.to_string()))?;
    let (data, meta) = stream
        .next()
        .map_err(|err| DriverError::Stream(err.to_string()))?;
    debug!(sequence = meta.sequence, bytes = meta.bytesused, "Frame dequeued");

    let used = data.get(..meta.bytesused as usize).unwrap_or(data);
    copy_rows(used, layout.width, layout.stride, buffer)
}

/// Copy `width`-byte rows spaced `stride` bytes apart into a packed buffer.
fn copy_rows(src: &[u8], width: usize, stride: usize, dst: &mut [u8]) -> Result<()> {
    let expected = dst.len();
    for (row, line) in dst.chunks_mut(width.max(1)).enumerate() {
        let start = row * stride;
        let source = src
            .get(start..start + line.len())
            .ok_or(DriverError::ShortFrame {
                expected,
                actual: src.len(),
            })?;
        line.copy_from_slice(source);
    }
    Ok(())
}

const fn split_orientation(value: u8) -> (bool, bool) {
    (value & 0b01 != 0, value & 0b10 != 0)
}

fn join_orientation(mirror: bool, flip: bool) -> u8 {
    u8::from(mirror) | (u8::from(flip) << 1)
}

fn private_control_id(register: Register) -> u32 {
    HIMAX_CID_BASE + u32::from(register.address() & 0xff)
}

fn register_error(register: Register, err: &std::io::Error) -> DriverError {
    DriverError::Register {
        register,
        reason: err.to_string(),
    }
}
