//! Frame validation utilities for test pattern verification.
//!
//! Checks that captured grayscale frames have the preset's size and carry the
//! pattern the simulated sensor was told to produce.

use crate::config::Resolution;
use crate::error::ValidationError;

/// Minimum left-to-right luminance rise for a frame to count as a gradient.
const MIN_GRADIENT_RISE: u8 = 50;

/// Validates that a frame holds exactly one frame of `preset`.
///
/// # Errors
///
/// Returns `ValidationError` if the length differs from width x height.
pub fn validate_frame_size(frame: &[u8], preset: Resolution) -> Result<(), ValidationError> {
    let expected = preset.frame_size();
    if frame.len() == expected {
        Ok(())
    } else {
        Err(ValidationError(format!(
            "Frame holds {} bytes, expected {expected} for {preset}",
            frame.len()
        )))
    }
}

/// Validates that a frame contains a horizontal gradient pattern.
///
/// Samples the centre row every 10 pixels and checks that luminance never
/// drops by more than one step and rises by a significant amount overall.
///
/// # Errors
///
/// Returns `ValidationError` if:
/// - The centre row is outside the frame
/// - The luminance doesn't increase monotonically
/// - The total luminance change is too small (solid frame)
pub fn validate_gradient(frame: &[u8], width: u32, height: u32) -> Result<(), ValidationError> {
    let width = width as usize;
    let center_y = height as usize / 2;
    let row = frame
        .get(center_y * width..(center_y + 1) * width)
        .ok_or_else(|| ValidationError(format!("Row {center_y} is outside the frame")))?;

    let mut prev: Option<u8> = None;
    for (x, &luminance) in row.iter().enumerate().step_by(10) {
        if let Some(prev) = prev {
            // Allow small decreases due to rounding
            if luminance.saturating_add(1) < prev {
                return Err(ValidationError(format!(
                    "Gradient not monotonically increasing at x={x}: \
                     luminance {luminance} < previous {prev}"
                )));
            }
        }
        prev = Some(luminance);
    }

    let first = row.first().copied().unwrap_or(0);
    let last = row.last().copied().unwrap_or(0);
    let rise = last.saturating_sub(first);
    if rise < MIN_GRADIENT_RISE {
        return Err(ValidationError(format!(
            "Insufficient luminance change for gradient: {rise} \
             (expected at least {MIN_GRADIENT_RISE})"
        )));
    }

    Ok(())
}

/// Validates that every pixel is within `tolerance` of `value`.
///
/// # Errors
///
/// Returns `ValidationError` naming the first pixel outside the tolerance.
pub fn validate_uniform(frame: &[u8], value: u8, tolerance: u8) -> Result<(), ValidationError> {
    match frame
        .iter()
        .position(|&pixel| pixel.abs_diff(value) > tolerance)
    {
        None => Ok(()),
        Some(index) => Err(ValidationError(format!(
            "Pixel {index} is {}, expected {value}±{tolerance}",
            frame.get(index).copied().unwrap_or_default()
        ))),
    }
}
