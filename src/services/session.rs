//! Network side of the console
//!
//! `Session` starts tokio tasks for connecting, device discovery, polling
//! and zone writes. Tasks never touch application state; they report back
//! with `SessionEvent`s which the controller applies on the UI task.

use crate::domain::types::ZoneKind;
use crate::domain::zone::Device;
use crate::infra::metrics::Metrics;
use crate::io::ha_client::{write_zone, HaClient, HaError, HomeAssistant};
use crate::services::poller::{Poller, Snapshot, Stamp};
use crate::services::reconstructor::{discover_devices, ZoneWrite};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected { epoch: u64, base_url: String },
    ConnectFailed { epoch: u64, error: String },
    Devices { epoch: u64, devices: Vec<Device> },
    DiscoveryFailed { epoch: u64, error: String },
    Snapshot(Snapshot),
    PollFailed { stamp: Stamp, error: String },
    /// Every zone of a save action was written
    ZonesWritten { epoch: u64, zones: Vec<(ZoneKind, u8)> },
    /// A save action stopped at its first failed write
    WriteFailed { epoch: u64, kind: ZoneKind, id: u8, written: usize, error: String },
}

/// All coordinate writes for one zone
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneWriteBatch {
    pub kind: ZoneKind,
    pub id: u8,
    pub writes: Vec<ZoneWrite>,
}

pub struct Session {
    client: Option<Arc<dyn HomeAssistant>>,
    tx: mpsc::Sender<SessionEvent>,
    metrics: Arc<Metrics>,
    timeout: Duration,
    poll_shutdown: Option<watch::Sender<bool>>,
}

impl Session {
    pub fn new(tx: mpsc::Sender<SessionEvent>, metrics: Arc<Metrics>, timeout: Duration) -> Self {
        Self { client: None, tx, metrics, timeout, poll_shutdown: None }
    }

    /// Build a client for `url` and start connecting under `epoch`
    pub fn connect(&mut self, url: &str, token: &str, epoch: u64) -> Result<(), HaError> {
        let client = HaClient::new(url, token, self.timeout)?;
        let base_url = client.base_url().to_string();
        self.attach(Arc::new(client), base_url, epoch);
        Ok(())
    }

    /// Replace the active client, stop polling and check the new connection
    pub fn attach(&mut self, client: Arc<dyn HomeAssistant>, base_url: String, epoch: u64) {
        self.stop_polling();
        self.client = Some(client.clone());

        let tx = self.tx.clone();
        tokio::spawn(async move {
            match client.check_api().await {
                Ok(()) => {
                    info!(url = %base_url, epoch = %epoch, "ha_connected");
                    if tx.send(SessionEvent::Connected { epoch, base_url }).await.is_err() {
                        return;
                    }
                    discover(client.as_ref(), &tx, epoch).await;
                }
                Err(e) => {
                    error!(url = %base_url, epoch = %epoch, error = %e, "ha_connect_failed");
                    let _ = tx.send(SessionEvent::ConnectFailed { epoch, error: e.to_string() }).await;
                }
            }
        });
    }

    pub fn disconnect(&mut self) {
        self.stop_polling();
        self.client = None;
    }

    /// Re-run device discovery on the current connection
    pub fn refresh_devices(&self, epoch: u64) {
        let Some(client) = self.client.clone() else {
            return;
        };
        let tx = self.tx.clone();
        tokio::spawn(async move {
            discover(client.as_ref(), &tx, epoch).await;
        });
    }

    /// Start polling `device`, replacing any running poller
    pub fn start_polling(&mut self, device: &str, epoch: u64, period: Duration) {
        self.stop_polling();
        let Some(client) = self.client.clone() else {
            return;
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller = Poller::new(client, device, epoch, period, self.tx.clone(), self.metrics.clone());
        tokio::spawn(poller.run(shutdown_rx));
        self.poll_shutdown = Some(shutdown_tx);
    }

    fn stop_polling(&mut self) {
        if let Some(shutdown) = self.poll_shutdown.take() {
            let _ = shutdown.send(true);
        }
    }

    /// Write zones one after another; the first failure ends the action
    pub fn write_zones(&self, batches: Vec<ZoneWriteBatch>, epoch: u64) {
        let Some(client) = self.client.clone() else {
            return;
        };
        let tx = self.tx.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let event = run_writes(client.as_ref(), batches, epoch, &metrics).await;
            let _ = tx.send(event).await;
        });
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

async fn discover(client: &dyn HomeAssistant, tx: &mpsc::Sender<SessionEvent>, epoch: u64) {
    let event = match client.fetch_states().await {
        Ok(entities) => {
            let devices = discover_devices(&entities);
            info!(devices = %devices.len(), entities = %entities.len(), "devices_discovered");
            SessionEvent::Devices { epoch, devices }
        }
        Err(e) => {
            error!(error = %e, "device_discovery_failed");
            SessionEvent::DiscoveryFailed { epoch, error: e.to_string() }
        }
    };
    let _ = tx.send(event).await;
}

/// Apply batches in order and summarize the outcome as one event
pub async fn run_writes(
    client: &dyn HomeAssistant,
    batches: Vec<ZoneWriteBatch>,
    epoch: u64,
    metrics: &Metrics,
) -> SessionEvent {
    let mut zones = Vec::with_capacity(batches.len());
    for batch in batches {
        match write_zone(client, &batch.writes).await {
            Ok(done) => {
                metrics.record_writes(done as u64, 0);
                zones.push((batch.kind, batch.id));
            }
            Err(e) => {
                // Writes ahead of the failing one were applied
                let written = match &e {
                    HaError::Write { entity_id, .. } => {
                        batch.writes.iter().position(|w| &w.entity_id == entity_id).unwrap_or(0)
                    }
                    _ => 0,
                };
                metrics.record_writes(written as u64, 1);
                return SessionEvent::WriteFailed {
                    epoch,
                    kind: batch.kind,
                    id: batch.id,
                    written,
                    error: e.to_string(),
                };
            }
        }
    }
    SessionEvent::ZonesWritten { epoch, zones }
}
