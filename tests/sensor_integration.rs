//! Integration tests against a real HM01B0 V4L2 capture node.
//!
//! These tests require:
//! - The `integration` feature flag: `cargo test --features integration`
//! - A capture node whose sysfs name contains "hm01b0" or "himax", or
//!   `HIMAX_TEST_DEVICE=<index>` pointing at one
//! - Access to /dev/video* devices (may require sudo or video group membership)
//!
//! The node must accept 324x324 and 324x244 GREY formats and expose
//! HFLIP/VFLIP plus the driver-private window and pixel-shift controls.
//!
//! Tests will fail if no sensor is available.

#![cfg(feature = "integration")]

use himax_capture::config::{resolve, CaptureMode, Resolution, TransferMode};
use himax_capture::controller::{CaptureController, SessionState};
use himax_capture::device::V4L2Sensor;
use himax_capture::sensor::SensorHandle;
use himax_capture::traits::{ControlCommand, Register, SensorDriver};
use himax_capture::validation::validate_frame_size;
use himax_capture::{FramePool, PgmFileSink};
use serial_test::serial;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Find the first HM01B0 capture node.
///
/// Uses sysfs to check the device name before opening, avoiding
/// unnecessary opens of unrelated cameras.
fn find_sensor() -> Option<u32> {
    if let Some(index) = std::env::var("HIMAX_TEST_DEVICE")
        .ok()
        .and_then(|value| value.parse().ok())
    {
        return Some(index);
    }

    let video4linux = Path::new("/sys/class/video4linux");
    if !video4linux.exists() {
        return None;
    }

    (0..10).find(|index| {
        let name_path = video4linux.join(format!("video{index}")).join("name");
        fs::read_to_string(&name_path).is_ok_and(|name| {
            let name = name.to_lowercase();
            name.contains("hm01b0") || name.contains("himax")
        })
    })
}

/// Macro to fail test if no sensor is available.
///
/// Integration tests MUST have a sensor attached - they should fail, not
/// silently skip.
macro_rules! require_sensor {
    () => {
        match find_sensor() {
            Some(idx) => idx,
            None => {
                panic!(
                    "HM01B0 capture node not available.\n\
                     Set HIMAX_TEST_DEVICE=<index> or attach the sensor.\n\
                     Or run unit tests only: cargo test --lib"
                );
            }
        }
    };
}

#[test]
#[serial]
fn test_sensor_open() {
    let index = require_sensor!();

    let mut sensor = V4L2Sensor::new(index);
    sensor.open(Resolution::Full).expect("Failed to open sensor");
    let caps = sensor.capabilities().clone();

    assert!(caps.can_capture, "sensor should support capture");
    assert!(caps.can_stream, "sensor should support streaming");

    println!("Opened sensor:");
    println!("  Driver: {}", caps.driver);
    println!("  Card: {}", caps.card);
    println!("  Bus: {}", caps.bus_info);
    sensor.close();
}

#[test]
#[serial]
fn test_sensor_orientation_round_trip() {
    let index = require_sensor!();

    let mut sensor = V4L2Sensor::new(index);
    sensor.open(Resolution::Full).expect("Failed to open sensor");
    sensor
        .control(ControlCommand::Start)
        .expect("Failed to start sensor");

    for value in [0u8, 3] {
        sensor
            .write_register(Register::Orientation, value)
            .expect("Failed to write orientation");
        let read = sensor
            .read_register(Register::Orientation)
            .expect("Failed to read orientation");
        assert_eq!(read, value, "Orientation read-back mismatch");
    }
    sensor.close();
}

#[test]
#[serial]
fn test_sensor_handle_verifies_orientation() {
    let index = require_sensor!();

    let config = resolve(CaptureMode::new(Resolution::Reduced, TransferMode::Blocking))
        .with_settle(Duration::from_millis(100));
    let mut sensor = V4L2Sensor::new(index);
    let mut handle = SensorHandle::open(&mut sensor, &config).expect("Failed to open handle");
    assert_eq!(handle.orientation(), 3);

    handle
        .apply_mode_registers(&config)
        .expect("Failed to apply mode registers");
    handle.close();
}

#[test]
#[serial]
fn test_sensor_blocking_capture() {
    let index = require_sensor!();

    let config = resolve(CaptureMode::new(Resolution::Reduced, TransferMode::Blocking))
        .with_settle(Duration::from_millis(100));
    let mut controller = CaptureController::new(V4L2Sensor::new(index), FramePool::new(), config);

    let frame = controller.capture().expect("Failed to capture frame");
    assert_eq!(controller.state(), SessionState::Stopped);
    validate_frame_size(&frame, Resolution::Reduced).expect("Unexpected frame size");

    println!("Captured {} bytes", frame.len());
}

#[test]
#[serial]
fn test_sensor_event_driven_capture_to_file() {
    let index = require_sensor!();

    let config = resolve(CaptureMode::new(Resolution::Full, TransferMode::EventDriven))
        .with_settle(Duration::from_millis(100));
    let mut controller = CaptureController::new(V4L2Sensor::new(index), FramePool::new(), config)
        .with_wait_limit(Duration::from_secs(5));

    let dir = tempfile::tempdir().expect("tempdir failed");
    let output = dir.path().join("img_captured.ppm");
    controller
        .run(&mut PgmFileSink, &output)
        .expect("Failed to capture frame");

    let image = image::open(&output).expect("Failed to decode frame").to_luma8();
    assert_eq!(image.dimensions(), (324, 324));
}
