//! Per-send completion records.
//!
//! Every send attempt owns exactly one [`PendingSend`]. Completing it consumes
//! it, so a flush callback cannot fire twice. If a transport drops a record
//! without completing it, the drop completes it with
//! [`RpcError::ConnectionClosed`], so the callback cannot be lost either.

use crate::error::{Result, RpcError};
use crate::protocol::MessageType;

/// Flush completion callback. Receives `Ok(())` once the message is flushed,
/// or the error that prevented it.
pub type FlushCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// Completion record for one outgoing message.
#[must_use = "a PendingSend must be completed or handed to a transport"]
pub struct PendingSend {
    message_type: MessageType,
    callback: Option<FlushCallback>,
}

impl PendingSend {
    /// Create a record that invokes `callback` on completion.
    pub fn new<F>(message_type: MessageType, callback: F) -> Self
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        Self {
            message_type,
            callback: Some(Box::new(callback)),
        }
    }

    /// Create a record with no callback. Used for CONNECT, whose outcome is
    /// observed through CONNECT_ACK instead.
    pub fn detached(message_type: MessageType) -> Self {
        Self {
            message_type,
            callback: None,
        }
    }

    /// Message type of the send this record tracks.
    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// True when a callback is attached.
    #[inline]
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Complete the send, invoking the callback if any.
    pub fn complete(mut self, result: Result<()>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl Drop for PendingSend {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            tracing::warn!(
                "{:?} send dropped without completion",
                self.message_type
            );
            callback(Err(RpcError::ConnectionClosed));
        }
    }
}

impl std::fmt::Debug for PendingSend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSend")
            .field("message_type", &self.message_type)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<Result<()>>>>, impl FnOnce(Result<()>) + Send + 'static) {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        (results, move |r| sink.lock().push(r))
    }

    #[test]
    fn test_complete_invokes_callback_once() {
        let (results, callback) = recorder();
        let pending = PendingSend::new(MessageType::Ping, callback);
        assert!(pending.has_callback());

        pending.complete(Ok(()));

        assert_eq!(*results.lock(), vec![Ok(())]);
    }

    #[test]
    fn test_complete_with_error() {
        let (results, callback) = recorder();
        PendingSend::new(MessageType::Ping, callback).complete(Err(RpcError::QueueFull));
        assert_eq!(*results.lock(), vec![Err(RpcError::QueueFull)]);
    }

    #[test]
    fn test_drop_completes_with_connection_closed() {
        let (results, callback) = recorder();
        drop(PendingSend::new(MessageType::ApplicationMessage, callback));
        assert_eq!(
            *results.lock(),
            vec![Err(RpcError::ConnectionClosed)]
        );
    }

    #[test]
    fn test_detached_has_no_callback() {
        let pending = PendingSend::detached(MessageType::Connect);
        assert!(!pending.has_callback());
        assert_eq!(pending.message_type(), MessageType::Connect);
        pending.complete(Err(RpcError::ConnectionClosed));
    }

    #[test]
    fn test_exactly_once_across_threads() {
        let fired = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let fired = fired.clone();
                let pending = PendingSend::new(MessageType::Ping, move |_| {
                    fired.fetch_add(1, Ordering::SeqCst);
                });
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        pending.complete(Ok(()));
                    } else {
                        drop(pending);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 16);
    }
}
