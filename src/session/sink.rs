use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::SessionError;
use crate::StreamEvent;

/// Lifecycle of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Active = 0,
    Closing = 1,
    Closed = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Active,
            1 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// State shared between a session and every producer it started
#[derive(Debug)]
pub(crate) struct SessionShared {
    pub(crate) id: u64,
    state: AtomicU8,
}

impl SessionShared {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            state: AtomicU8::new(SessionState::Active as u8),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state() != SessionState::Active
    }

    /// `Active -> Closing`. Only the first caller gets `true`.
    pub(crate) fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Active as u8,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn finish_close(&self) {
        self.state.store(SessionState::Closed as u8, Ordering::Release);
    }
}

/// Producer handle onto a session's event queue.
///
/// Cloned into the poller and every tailer; the session's writer task is the
/// single consumer.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    shared: Arc<SessionShared>,
}

impl EventSink {
    pub(crate) fn new(
        tx: mpsc::Sender<StreamEvent>,
        shared: Arc<SessionShared>,
    ) -> Self {
        Self { tx, shared }
    }

    /// Sink feeding a bare receiver, for driving producers without a session
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx, Arc::new(SessionShared::new(0))), rx)
    }

    pub fn session_id(&self) -> u64 {
        self.shared.id
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed() || self.tx.is_closed()
    }

    /// Queues `event`, waiting if the queue is full.
    ///
    /// Fails once the session left `Active` or its writer is gone.
    pub async fn send(
        &self,
        event: StreamEvent,
    ) -> std::result::Result<(), SessionError> {
        if self.shared.is_closed() {
            return Err(SessionError::Closed(self.shared.id));
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| SessionError::Closed(self.shared.id))
    }
}
