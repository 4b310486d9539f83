//! Periodic, concurrent health polling for one session.

#[cfg(test)]
mod poller_test;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use crate::EventSink;
use crate::ProbeRegistry;
use crate::ServiceId;
use crate::StatusSnapshot;
use crate::StreamEvent;

pub struct StatusPoller {
    registry: Arc<ProbeRegistry>,
    services: Vec<ServiceId>,
    interval: Duration,
    /// Generation of the last snapshot handed to the sink
    delivered_generation: u64,
}

impl StatusPoller {
    pub fn new(
        registry: Arc<ProbeRegistry>,
        services: Vec<ServiceId>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            services,
            interval,
            delivered_generation: 0,
        }
    }

    /// Probes every configured service concurrently and assembles one snapshot.
    ///
    /// Takes as long as the slowest probe; a failing probe only affects its
    /// own entry.
    pub async fn poll_all(&self) -> StatusSnapshot {
        let checks = self.services.iter().map(|service| {
            let registry = self.registry.clone();
            let service = *service;
            async move { (service, registry.check_health(service).await) }
        });
        let results = join_all(checks).await;
        StatusSnapshot::from_results(&self.services, results)
    }

    /// Polls immediately, then again `interval` after each poll completes.
    ///
    /// Cycles never overlap. Cancellation abandons an in-flight poll and
    /// discards its result.
    pub async fn run(
        mut self,
        sink: EventSink,
        cancel: CancellationToken,
    ) {
        let mut generation: u64 = 0;
        loop {
            generation += 1;
            let snapshot = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                snapshot = self.poll_all() => snapshot,
            };

            if sink.is_closed() {
                debug!("session {} closed during poll {}, discarding result", sink.session_id(), generation);
                break;
            }
            trace!("poll {} covered {} services", generation, snapshot.len());
            if self.accept(generation) {
                if sink.send(StreamEvent::status_update(snapshot)).await.is_err() {
                    break;
                }
            } else {
                trace!("discarding stale snapshot {}", generation);
            }

            // the next poll is scheduled only once this one has completed
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }
        debug!("status poller of session {} stopped", sink.session_id());
    }

    /// Snapshots are delivered in generation order; older ones are dropped
    fn accept(
        &mut self,
        generation: u64,
    ) -> bool {
        if generation <= self.delivered_generation {
            return false;
        }
        self.delivered_generation = generation;
        true
    }
}
