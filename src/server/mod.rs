//! HTTP surface: the event stream endpoint plus a liveness route.


use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::info;
use warp::filters::BoxedFilter;
use warp::http::header::CACHE_CONTROL;
use warp::http::header::CONNECTION;
use warp::http::header::CONTENT_TYPE;
use warp::http::HeaderValue;
use warp::http::Response;
use warp::hyper::Body;
use warp::Filter;
use warp::Reply;

use crate::constants::CACHE_CONTROL_NO_CACHE;
use crate::constants::CONNECTION_KEEP_ALIVE;
use crate::constants::CONTENT_TYPE_EVENT_STREAM;
use crate::constants::X_ACCEL_BUFFERING;
use crate::Error;
use crate::ProbeRegistry;
use crate::Result;
use crate::Session;
use crate::SessionContext;
use crate::SessionStream;
use crate::StreamConfig;

/// Opens one [`Session`] per stream request
pub struct StreamEndpoint {
    ctx: SessionContext,
    shutdown: watch::Receiver<()>,
    next_session_id: AtomicU64,
    sessions: DashMap<u64, Weak<Session>>,
}

impl StreamEndpoint {
    pub fn new(
        ctx: SessionContext,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        Self {
            ctx,
            shutdown,
            next_session_id: AtomicU64::new(1),
            sessions: DashMap::new(),
        }
    }

    pub fn from_config(
        config: &StreamConfig,
        shutdown: watch::Receiver<()>,
    ) -> Self {
        let registry = ProbeRegistry::from_config(&config.services, config.stream.probe_timeout());
        Self::new(
            SessionContext {
                config: Arc::new(config.stream.clone()),
                services: Arc::new(config.services.clone()),
                registry: Arc::new(registry),
            },
            shutdown,
        )
    }

    /// Starts a session and returns its outbound stream
    pub fn open(&self) -> SessionStream {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let stream = Session::start(id, &self.ctx, self.shutdown.clone());
        let session = stream.session();
        self.sessions.insert(session.id(), Arc::downgrade(session));
        self.prune();
        stream
    }

    /// Sessions that are still `Active`
    pub fn live_sessions(&self) -> usize {
        self.prune();
        self.sessions.len()
    }

    fn prune(&self) {
        self.sessions
            .retain(|_, session| session.upgrade().map(|s| !s.is_closed()).unwrap_or(false));
    }
}

/// Wraps a session stream in a non-buffered, cache-disabled SSE response
pub fn event_stream_response(stream: SessionStream) -> Response<Body> {
    let mut response = Response::new(Body::wrap_stream(stream));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_EVENT_STREAM));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_NO_CACHE));
    headers.insert(CONNECTION, HeaderValue::from_static(CONNECTION_KEEP_ALIVE));
    headers.insert(X_ACCEL_BUFFERING, HeaderValue::from_static("no"));
    response
}

/// `GET /<stream_path>` opening one session per request
pub fn stream_route(
    endpoint: Arc<StreamEndpoint>,
    segments: &[String],
) -> BoxedFilter<(Response<Body>,)> {
    let path = segments
        .iter()
        .fold(warp::any().boxed(), |filter, segment| {
            filter.and(warp::path(segment.clone())).boxed()
        });

    path.and(warp::path::end())
        .and(warp::get())
        .map(move || event_stream_response(endpoint.open()))
        .boxed()
}

/// `GET /healthz`
pub fn health_route() -> BoxedFilter<(String,)> {
    warp::path!("healthz")
        .and(warp::get())
        .map(|| "ok".to_string())
        .boxed()
}

pub fn routes(
    endpoint: Arc<StreamEndpoint>,
    segments: &[String],
) -> BoxedFilter<(warp::reply::Response,)> {
    stream_route(endpoint, segments)
        .map(Reply::into_response)
        .or(health_route().map(Reply::into_response))
        .unify()
        .boxed()
}

/// Serves until the shutdown signal fires. Live sessions observe the same
/// signal and end their streams, which lets the graceful shutdown complete.
pub async fn serve(
    config: &StreamConfig,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    let endpoint = Arc::new(StreamEndpoint::from_config(config, shutdown.clone()));
    let segments = config.server.stream_segments();
    let routes = routes(endpoint, &segments).with(warp::log("status_stream::http"));

    let (addr, server): (SocketAddr, _) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(config.server.listen_address, async move {
            let _ = shutdown.changed().await;
        })
        .map_err(|e| Error::Fatal(format!("failed to bind {}: {}", config.server.listen_address, e)))?;

    info!("streaming on http://{}/{}", addr, segments.join("/"));
    server.await;
    info!("http server stopped");
    Ok(())
}
