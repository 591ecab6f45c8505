//! One-shot completion signal for event-driven transfers.
//!
//! [`arm`] creates a pending signal and the notifier handed to the driver.
//! The notifier carries the filled buffer back, so the controller cannot
//! touch frame data until it observes the signal.

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::buffer::FrameBuffer;
use crate::error::TransferError;

/// Observable state of a completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    /// The transfer has not completed.
    Pending,
    /// The transfer completed and the buffer is waiting to be taken.
    Signaled,
}

/// Controller side of the signal.
#[derive(Debug)]
pub struct CompletionSignal {
    receiver: Receiver<FrameBuffer>,
}

/// Driver side of the signal. Firing consumes it, so it fires at most once.
#[derive(Debug)]
pub struct CompletionNotifier {
    sender: Sender<FrameBuffer>,
}

/// Create a signal in the pending state together with its notifier.
#[must_use]
pub fn arm() -> (CompletionSignal, CompletionNotifier) {
    let (sender, receiver) = crossbeam_channel::bounded(1);
    (CompletionSignal { receiver }, CompletionNotifier { sender })
}

impl CompletionSignal {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> SignalState {
        if self.receiver.is_empty() {
            SignalState::Pending
        } else {
            SignalState::Signaled
        }
    }

    /// Take the buffer if the transfer has completed.
    ///
    /// Returns `Ok(None)` while pending and [`TransferError::Abandoned`] once
    /// the notifier has been dropped without firing.
    pub fn try_take(&self) -> Result<Option<FrameBuffer>, TransferError> {
        match self.receiver.try_recv() {
            Ok(buffer) => Ok(Some(buffer)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransferError::Abandoned),
        }
    }
}

impl CompletionNotifier {
    /// State of the signal this notifier fires.
    #[must_use]
    pub fn state(&self) -> SignalState {
        if self.sender.is_empty() {
            SignalState::Pending
        } else {
            SignalState::Signaled
        }
    }

    /// Hand the filled buffer back and mark the signal as signaled.
    ///
    /// Safe to call from a driver thread or callback context; it never blocks.
    pub fn signal(self, buffer: FrameBuffer) {
        // The controller may have given up waiting; the frame is then discarded.
        let _ = self.sender.try_send(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FramePool;

    #[test]
    fn test_armed_signal_is_pending() {
        let (signal, notifier) = arm();
        assert_eq!(signal.state(), SignalState::Pending);
        assert_eq!(notifier.state(), SignalState::Pending);
        assert!(signal.try_take().expect("try_take failed").is_none());
    }

    #[test]
    fn test_signal_delivers_buffer() {
        let (signal, notifier) = arm();
        let mut buffer = FramePool::new().reserve(16).expect("reserve failed");
        buffer.fill(7);

        notifier.signal(buffer);
        assert_eq!(signal.state(), SignalState::Signaled);

        let buffer = signal
            .try_take()
            .expect("try_take failed")
            .expect("buffer should be ready");
        assert_eq!(buffer.len(), 16);
        assert!(buffer.iter().all(|&byte| byte == 7));
    }

    #[test]
    fn test_dropped_notifier_abandons_transfer() {
        let (signal, notifier) = arm();
        drop(notifier);
        assert!(matches!(signal.try_take(), Err(TransferError::Abandoned)));
    }

    #[test]
    fn test_signal_from_another_thread() {
        let (signal, notifier) = arm();
        let buffer = FramePool::new().reserve(8).expect("reserve failed");
        let worker = std::thread::spawn(move || notifier.signal(buffer));
        worker.join().expect("worker panicked");

        assert!(signal.try_take().expect("try_take failed").is_some());
    }
}
