use std::net::SocketAddr;
use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;


lazy_static! {
    pub static ref ACTIVE_SESSIONS: IntGauge =
        IntGauge::new("active_sessions", "Number of open stream sessions")
            .expect("metric can not be created");

    pub static ref EVENTS_DELIVERED: IntCounterVec = IntCounterVec::new(
        Opts::new("events_delivered", "Frames written to client streams"),
        &["event_type"]
    )
    .expect("metric can not be created");

    pub static ref PROBE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("probe_failures", "Health probes that reported a service down"),
        &["service"]
    )
    .expect("metric can not be created");

    pub static ref TAIL_RESETS: IntCounterVec = IntCounterVec::new(
        Opts::new("tail_resets", "Tail cursors reset after truncation or rotation"),
        &["service"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(ACTIVE_SESSIONS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(EVENTS_DELIVERED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(PROBE_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(TAIL_RESETS.clone()))
        .expect("collector can be registered");
}

/// Serves `/metrics` until the shutdown signal fires
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    REGISTER.call_once(|| register_custom_metrics(&REGISTRY));

    let metrics_route = warp::path!("metrics")
        .map(|| REGISTRY.clone())
        .and_then(metrics_handler);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    match warp::serve(metrics_route).try_bind_with_graceful_shutdown(addr, async move {
        let _ = shutdown_signal.changed().await;
    }) {
        Ok((bound, server)) => {
            info!("metrics server listening on {}", bound);
            server.await;
        }
        Err(e) => error!("metrics server failed to bind {}: {}", addr, e),
    }
}

async fn metrics_handler(registry: Registry) -> Result<impl Reply, Rejection> {
    Ok(render(&registry))
}

fn render(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
