//! Recording transport for unit tests.
//!
//! Copies every submitted message into a [`Frame`], completes or holds the
//! completion according to its mode, and records close requests.

use parking_lot::Mutex;

use super::Transport;
use crate::completion::PendingSend;
use crate::error::{Result, RpcError};
use crate::protocol::{Frame, OutboundMessage};

/// How submitted sends are completed.
#[derive(Debug, Clone)]
pub(crate) enum Mode {
    /// Complete with `Ok(())` immediately.
    Flush,
    /// Complete with the given error immediately, recording nothing.
    Reject(RpcError),
    /// Keep the completion until `flush_held` or drop.
    Hold,
}

pub(crate) struct RecordingTransport {
    mode: Mutex<Mode>,
    sent: Mutex<Vec<Frame>>,
    held: Mutex<Vec<PendingSend>>,
    closes: Mutex<Vec<Result<()>>>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::with_mode(Mode::Flush)
    }

    pub(crate) fn with_mode(mode: Mode) -> Self {
        Self {
            mode: Mutex::new(mode),
            sent: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            closes: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_mode(&self, mode: Mode) {
        *self.mode.lock() = mode;
    }

    pub(crate) fn sent(&self) -> Vec<Frame> {
        self.sent.lock().clone()
    }

    pub(crate) fn closes(&self) -> Vec<Result<()>> {
        self.closes.lock().clone()
    }

    /// Complete every held send with `result`.
    pub(crate) fn flush_held(&self, result: Result<()>) -> usize {
        let held: Vec<PendingSend> = std::mem::take(&mut *self.held.lock());
        let count = held.len();
        for pending in held {
            pending.complete(result.clone());
        }
        count
    }

    /// Drop every held send without completing it.
    pub(crate) fn drop_held(&self) {
        let held = std::mem::take(&mut *self.held.lock());
        drop(held);
    }
}

impl Transport for RecordingTransport {
    fn send_message(&self, message: OutboundMessage<'_>, completion: PendingSend) {
        let mode = self.mode.lock().clone();
        match mode {
            Mode::Reject(err) => completion.complete(Err(err)),
            Mode::Flush => {
                self.sent.lock().push(Frame::from_outbound(&message));
                completion.complete(Ok(()));
            }
            Mode::Hold => {
                self.sent.lock().push(Frame::from_outbound(&message));
                self.held.lock().push(completion);
            }
        }
    }

    fn close(&self, reason: Result<()>) {
        self.closes.lock().push(reason);
    }
}
