use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio::time::timeout;
use tokio::time::Instant;

use super::*;
use crate::HealthProbe;
use crate::MockHealthProbe;
use crate::ProbeError;

struct DelayedProbe {
    delay: Duration,
    up: bool,
}

#[async_trait]
impl HealthProbe for DelayedProbe {
    async fn check(&self) -> std::result::Result<(), ProbeError> {
        tokio::time::sleep(self.delay).await;
        if self.up {
            Ok(())
        } else {
            Err(ProbeError::UnexpectedResponse {
                expected: "hello world".into(),
            })
        }
    }
}

struct CountingProbe(Arc<AtomicUsize>);

#[async_trait]
impl HealthProbe for CountingProbe {
    async fn check(&self) -> std::result::Result<(), ProbeError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn mock(up: bool) -> MockHealthProbe {
    let mut probe = MockHealthProbe::new();
    probe.expect_check().returning(move || {
        if up {
            Ok(())
        } else {
            Err(ProbeError::Command {
                program: "pg_isready".into(),
                reason: "no response".into(),
            })
        }
    });
    probe
}

fn snapshot_of(event: StreamEvent) -> StatusSnapshot {
    match event {
        StreamEvent::StatusUpdate { statuses } => statuses,
        other => panic!("expected status update, got {other:?}"),
    }
}

#[tokio::test]
async fn poll_all_should_cover_every_service_even_when_probes_fail() {
    let mut registry = ProbeRegistry::new(Duration::from_secs(1));
    registry.register(ServiceId::ApiServer, mock(true));
    registry.register(ServiceId::Postgres, mock(false));
    let services = vec![ServiceId::ApiServer, ServiceId::Postgres, ServiceId::Redis];

    let poller = StatusPoller::new(Arc::new(registry), services.clone(), Duration::from_secs(10));
    let snapshot = poller.poll_all().await;

    assert_eq!(snapshot.len(), services.len());
    assert!(snapshot.is_up(ServiceId::ApiServer));
    assert!(!snapshot.is_up(ServiceId::Postgres));
    // no probe registered
    assert!(!snapshot.is_up(ServiceId::Redis));
}

#[tokio::test(start_paused = true)]
async fn poll_all_should_take_as_long_as_the_slowest_probe() {
    let mut registry = ProbeRegistry::new(Duration::from_secs(30));
    registry.register(
        ServiceId::ApiServer,
        DelayedProbe {
            delay: Duration::from_secs(3),
            up: true,
        },
    );
    registry.register(
        ServiceId::SyncServer,
        DelayedProbe {
            delay: Duration::from_secs(3),
            up: false,
        },
    );
    registry.register(
        ServiceId::Redis,
        DelayedProbe {
            delay: Duration::from_secs(1),
            up: true,
        },
    );

    let poller = StatusPoller::new(
        Arc::new(registry),
        vec![ServiceId::ApiServer, ServiceId::SyncServer, ServiceId::Redis],
        Duration::from_secs(10),
    );

    let started = Instant::now();
    let snapshot = poller.poll_all().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(3));
    assert!(elapsed < Duration::from_secs(4), "probes ran sequentially: {elapsed:?}");
    assert!(snapshot.is_up(ServiceId::ApiServer));
    assert!(!snapshot.is_up(ServiceId::SyncServer));
    assert!(snapshot.is_up(ServiceId::Redis));
}

#[tokio::test(start_paused = true)]
async fn run_should_emit_immediately_then_once_per_interval() {
    let mut registry = ProbeRegistry::new(Duration::from_secs(1));
    registry.register(ServiceId::ApiServer, mock(true));
    registry.register(ServiceId::SyncServer, mock(false));

    let poller = StatusPoller::new(
        Arc::new(registry),
        vec![ServiceId::ApiServer, ServiceId::SyncServer],
        Duration::from_secs(10),
    );
    let (sink, mut rx) = EventSink::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(poller.run(sink, cancel.clone()));

    let started = Instant::now();
    let first = snapshot_of(rx.recv().await.unwrap());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(first.is_up(ServiceId::ApiServer));
    assert!(!first.is_up(ServiceId::SyncServer));

    let second = snapshot_of(rx.recv().await.unwrap());
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(first, second);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn run_should_not_overlap_slow_poll_cycles() {
    let mut registry = ProbeRegistry::new(Duration::from_secs(60));
    registry.register(
        ServiceId::Postgres,
        DelayedProbe {
            delay: Duration::from_secs(15),
            up: true,
        },
    );

    let poller = StatusPoller::new(Arc::new(registry), vec![ServiceId::Postgres], Duration::from_secs(10));
    let (sink, mut rx) = EventSink::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(poller.run(sink, cancel.clone()));

    let started = Instant::now();
    rx.recv().await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(15));

    rx.recv().await.unwrap();
    // 15s probe + 10s pause + 15s probe
    assert!(started.elapsed() >= Duration::from_secs(40));

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn run_should_stop_scheduling_after_cancellation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = ProbeRegistry::new(Duration::from_secs(1));
    registry.register(ServiceId::Redis, CountingProbe(calls.clone()));

    let poller = StatusPoller::new(Arc::new(registry), vec![ServiceId::Redis], Duration::from_secs(10));
    let (sink, mut rx) = EventSink::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(poller.run(sink, cancel.clone()));

    rx.recv().await.unwrap();
    cancel.cancel();
    timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn run_should_discard_in_flight_poll_on_cancellation() {
    let mut registry = ProbeRegistry::new(Duration::from_secs(60));
    registry.register(
        ServiceId::ApiServer,
        DelayedProbe {
            delay: Duration::from_secs(5),
            up: true,
        },
    );

    let poller = StatusPoller::new(Arc::new(registry), vec![ServiceId::ApiServer], Duration::from_secs(10));
    let (sink, mut rx) = EventSink::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(poller.run(sink, cancel.clone()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert!(rx.recv().await.is_none());
}

#[test]
fn accept_should_reject_stale_generations() {
    let mut poller = StatusPoller::new(
        Arc::new(ProbeRegistry::default()),
        vec![ServiceId::Redis],
        Duration::from_secs(10),
    );

    assert!(poller.accept(1));
    assert!(poller.accept(3));
    assert!(!poller.accept(2));
    assert!(!poller.accept(3));
}

#[tokio::test(start_paused = true)]
async fn run_should_pause_a_full_interval_after_every_delivery() {
    let mut registry = ProbeRegistry::new(Duration::from_secs(1));
    registry.register(ServiceId::Redis, mock(true));

    let poller = StatusPoller::new(Arc::new(registry), vec![ServiceId::Redis], Duration::from_secs(10));
    let (sink, mut rx) = EventSink::channel(8);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(poller.run(sink, cancel.clone()));

    rx.recv().await.unwrap();
    let mut last = Instant::now();
    for _ in 0..3 {
        rx.recv().await.unwrap();
        let now = Instant::now();
        assert!(now - last >= Duration::from_secs(10), "polls overlapped: {:?}", now - last);
        last = now;
    }

    cancel.cancel();
    handle.await.unwrap();
}
