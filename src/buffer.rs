//! Frame buffer reservation.

use std::ops::{Deref, DerefMut};

use tracing::{debug, trace};

use crate::error::AllocError;

/// A fixed-size grayscale frame buffer, one byte per pixel.
///
/// The length is set at reservation and never changes.
#[derive(Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    data: Box<[u8]>,
}

impl FrameBuffer {
    /// Buffer size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer has zero length.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Deref for FrameBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for FrameBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Reserves and releases frame buffers.
///
/// An optional capacity models a bounded memory region; requests larger than
/// it fail the same way an exhausted heap does.
#[derive(Debug, Clone, Default)]
pub struct FramePool {
    capacity: Option<usize>,
    reservations: usize,
}

impl FramePool {
    /// Pool backed by the global heap with no extra bound.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            capacity: None,
            reservations: 0,
        }
    }

    /// Pool that refuses any single reservation larger than `capacity` bytes.
    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            reservations: 0,
        }
    }

    /// Reserve a zeroed buffer of exactly `size` bytes.
    pub fn reserve(&mut self, size: usize) -> Result<FrameBuffer, AllocError> {
        if self.capacity.is_some_and(|capacity| size > capacity) {
            return Err(AllocError::OutOfMemory { requested: size });
        }

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| AllocError::OutOfMemory { requested: size })?;
        data.resize(size, 0);

        self.reservations += 1;
        debug!(size, "Reserved frame buffer");
        Ok(FrameBuffer {
            data: data.into_boxed_slice(),
        })
    }

    /// Number of successful reservations made from this pool.
    #[must_use]
    pub const fn reservations(&self) -> usize {
        self.reservations
    }

    /// Return a buffer once its frame has been consumed.
    #[allow(clippy::unused_self)]
    pub fn release(&self, buffer: FrameBuffer) {
        trace!(size = buffer.len(), "Released frame buffer");
        drop(buffer);
    }
}
