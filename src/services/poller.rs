//! Fixed-period entity polling with stale snapshot rejection
//!
//! A `Poller` belongs to one connection epoch and one device. Each fetch is
//! awaited inside the loop, so two polls never overlap; ticks missed while a
//! slow fetch is in flight are skipped. Every snapshot is stamped with
//! `(epoch, generation)` and the controller only applies it through a
//! `SnapshotGate`.

use crate::domain::types::Entity;
use crate::infra::metrics::Metrics;
use crate::io::ha_client::HomeAssistant;
use crate::services::reconstructor::Reconstructor;
use crate::services::session::SessionEvent;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Identifies which connection and which poll produced a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub epoch: u64,
    pub generation: u64,
}

/// One `/api/states` result, scoped to the polled device
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub stamp: Stamp,
    pub device: String,
    pub entities: Vec<Entity>,
}

/// Controller-side filter deciding which snapshots may be applied
#[derive(Debug, Default)]
pub struct SnapshotGate {
    epoch: u64,
    last_applied: Option<u64>,
}

impl SnapshotGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Start a new epoch; everything stamped earlier becomes stale
    pub fn advance_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.last_applied = None;
        self.epoch
    }

    /// Accept a snapshot if it belongs to the current epoch and is newer than
    /// the last one applied
    pub fn admit(&mut self, stamp: Stamp) -> bool {
        if stamp.epoch != self.epoch {
            return false;
        }
        if self.last_applied.is_some_and(|last| stamp.generation <= last) {
            return false;
        }
        self.last_applied = Some(stamp.generation);
        true
    }
}

pub struct Poller {
    client: Arc<dyn HomeAssistant>,
    scope: Reconstructor,
    epoch: u64,
    generation: u64,
    period: Duration,
    tx: mpsc::Sender<SessionEvent>,
    metrics: Arc<Metrics>,
}

impl Poller {
    pub fn new(
        client: Arc<dyn HomeAssistant>,
        device: &str,
        epoch: u64,
        period: Duration,
        tx: mpsc::Sender<SessionEvent>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { client, scope: Reconstructor::new(device), epoch, generation: 0, period, tx, metrics }
    }

    /// Fetch once and build the event to report
    pub async fn poll_once(&mut self) -> SessionEvent {
        self.generation += 1;
        let stamp = Stamp { epoch: self.epoch, generation: self.generation };
        let start = Instant::now();

        match self.client.fetch_states().await {
            Ok(entities) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                self.metrics.record_poll(latency_ms);

                let entities: Vec<Entity> =
                    entities.into_iter().filter(|e| self.scope.owns(&e.entity_id)).collect();
                debug!(
                    device = %self.scope.device(),
                    generation = %stamp.generation,
                    entities = %entities.len(),
                    latency_ms = %latency_ms,
                    "poll_completed"
                );
                SessionEvent::Snapshot(Snapshot { stamp, device: self.scope.device().to_string(), entities })
            }
            Err(e) => {
                self.metrics.record_poll_failed();
                warn!(device = %self.scope.device(), generation = %stamp.generation, error = %e, "poll_failed");
                SessionEvent::PollFailed { stamp, error: e.to_string() }
            }
        }
    }

    /// Poll until shutdown is signalled or the controller goes away
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            device = %self.scope.device(),
            epoch = %self.epoch,
            period_ms = %self.period.as_millis(),
            "poller_started"
        );

        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(device = %self.scope.device(), epoch = %self.epoch, "poller_stopped");
                        return;
                    }
                    continue;
                }
                _ = timer.tick() => {}
            }

            let event = self.poll_once().await;
            if self.tx.send(event).await.is_err() {
                debug!(device = %self.scope.device(), "poller_channel_closed");
                return;
            }
        }
    }
}
