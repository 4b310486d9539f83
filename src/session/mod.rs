//! One client connection's event multiplexer.
//!
//! A [`Session`] starts the status poller, one tailer per log file and a
//! single change watcher shared by those tailers. The poller and tailers
//! push [`StreamEvent`]s onto one bounded queue; a single writer task drains
//! it, encodes frames and writes them to the outbound stream, so the
//! transport never sees concurrent writers.
//!
//! Lifecycle: `Active -> Closing -> Closed`. Client disconnect, a failed
//! write or server shutdown all funnel into [`Session::close`], which runs
//! its cleanup exactly once.

mod sink;
pub use sink::*;

use std::pin::Pin;
use std::sync::Arc;
use std::sync::Weak;
use std::task::Context;
use std::task::Poll;

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;

use crate::metrics::ACTIVE_SESSIONS;
use crate::metrics::EVENTS_DELIVERED;
use crate::run_tailer;
use crate::ChangeWatcher;
use crate::FileTailer;
use crate::LogFileDescriptor;
use crate::ProbeRegistry;
use crate::ServiceConfig;
use crate::SessionConfig;
use crate::StatusPoller;
use crate::StreamEvent;

/// Why a session left `Active`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientDisconnected,
    SinkFailure,
    ServerShutdown,
}

/// Everything a session needs from the server; shared by all sessions
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<SessionConfig>,
    pub services: Arc<Vec<ServiceConfig>>,
    pub registry: Arc<ProbeRegistry>,
}

pub struct Session {
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
    watcher: Mutex<Option<ChangeWatcher>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Starts a session and returns the outbound byte stream for the transport.
    ///
    /// Must be called within a tokio runtime. Dropping the returned stream
    /// counts as client disconnect.
    pub fn start(
        id: u64,
        ctx: &SessionContext,
        shutdown: watch::Receiver<()>,
    ) -> SessionStream {
        let config = &ctx.config;
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer_capacity);

        let shared = Arc::new(SessionShared::new(id));
        let sink = EventSink::new(event_tx, shared.clone());
        let session = Arc::new(Session {
            shared,
            cancel: CancellationToken::new(),
            watcher: Mutex::new(Some(ChangeWatcher::new(
                config.watch_mode,
                config.fallback_poll_interval(),
            ))),
            tasks: Mutex::new(Vec::with_capacity(ctx.services.len() + 2)),
        });
        ACTIVE_SESSIONS.inc();
        info!("session {} opened", id);

        let writer = tokio::spawn(run_writer(
            Arc::downgrade(&session),
            event_rx,
            outbound_tx,
            session.cancel.clone(),
            shutdown,
        ));
        session.track(writer);

        let poller = StatusPoller::new(
            ctx.registry.clone(),
            ctx.services.iter().map(|s| s.service).collect(),
            config.update_interval(),
        );
        session.track(tokio::spawn(poller.run(sink.clone(), session.cancel.clone())));

        for service in ctx.services.iter() {
            session.attach(service, config.max_read_chunk_bytes, sink.clone());
        }

        SessionStream {
            inner: ReceiverStream::new(outbound_rx),
            session,
        }
    }

    /// Arms the watcher before the first read so appends made during the
    /// initial read still trigger a follow-up.
    fn attach(
        &self,
        service: &ServiceConfig,
        max_read_chunk_bytes: usize,
        sink: EventSink,
    ) {
        let changed = Arc::new(Notify::new());
        {
            let mut watcher = self.watcher.lock();
            let Some(watcher) = watcher.as_mut() else {
                // lost the race with close()
                return;
            };
            watcher.watch(&service.log_path, changed.clone());
        }

        let tailer = FileTailer::new(
            LogFileDescriptor {
                path: service.log_path.clone(),
                service: service.service,
            },
            max_read_chunk_bytes,
        );
        self.track(tokio::spawn(run_tailer(tailer, changed, sink, self.cancel.clone())));
        trace!("session {} attached {}", self.shared.id, service.log_path.display());
    }

    fn track(
        &self,
        handle: JoinHandle<()>,
    ) {
        let mut tasks = self.tasks.lock();
        if self.shared.is_closed() {
            handle.abort();
        }
        tasks.push(handle);
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Files whose changes this session is still watching
    pub fn watcher_count(&self) -> usize {
        self.watcher.lock().as_ref().map(|w| w.watched_files()).unwrap_or(0)
    }

    /// True once every background task this session started has ended
    pub fn all_tasks_finished(&self) -> bool {
        self.tasks.lock().iter().all(|h| h.is_finished())
    }

    /// Tears the session down. Idempotent: only the first call does any work.
    pub fn close(
        &self,
        reason: CloseReason,
    ) {
        if !self.shared.begin_close() {
            trace!("session {} already closing ({:?} ignored)", self.shared.id, reason);
            return;
        }
        info!("session {} closing: {:?}", self.shared.id, reason);

        // producers observe the flag before the cancellation
        self.cancel.cancel();

        if let Some(watcher) = self.watcher.lock().take() {
            watcher.close();
        }
        for handle in self.tasks.lock().iter() {
            handle.abort();
        }

        self.shared.finish_close();
        ACTIVE_SESSIONS.dec();
        debug!("session {} closed", self.shared.id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close(CloseReason::ClientDisconnected);
    }
}

/// Single consumer of the session queue and only writer of the outbound stream
async fn run_writer(
    session: Weak<Session>,
    mut events: mpsc::Receiver<StreamEvent>,
    outbound: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    mut shutdown: watch::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = shutdown.changed() => {
                close_session(&session, CloseReason::ServerShutdown);
                break;
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if cancel.is_cancelled() {
            break;
        }

        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("failed to encode {} event: {}", event.kind(), e);
                continue;
            }
        };

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            written = outbound.send(frame) => written,
        };
        if written.is_err() {
            debug!("outbound stream dropped by transport");
            close_session(&session, CloseReason::SinkFailure);
            break;
        }
        EVENTS_DELIVERED.with_label_values(&[event.kind()]).inc();
    }
    // dropping `outbound` here ends the client stream
}

fn close_session(
    session: &Weak<Session>,
    reason: CloseReason,
) {
    if let Some(session) = session.upgrade() {
        session.close(reason);
    }
}

/// Outbound byte stream handed to the transport.
///
/// Yields one complete SSE frame per item and ends when the session closes.
pub struct SessionStream {
    inner: ReceiverStream<Bytes>,
    session: Arc<Session>,
}

impl SessionStream {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Stream for SessionStream {
    type Item = std::result::Result<Bytes, std::convert::Infallible>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|frame| frame.map(Ok))
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        self.session.close(CloseReason::ClientDisconnected);
    }
}
