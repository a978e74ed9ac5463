//! Session event handlers for the Controller

use super::{Command, ConnectionStatus, Controller, Severity};
use crate::domain::zone::{epoch_ms, Device};
use crate::services::poller::{Snapshot, Stamp};
use crate::services::session::SessionEvent;
use tracing::{debug, info, warn};

impl Controller {
    /// Apply one event reported by the session
    pub fn apply(&mut self, event: SessionEvent) -> Vec<Command> {
        match event {
            SessionEvent::Connected { epoch, base_url } => self.handle_connected(epoch, base_url),
            SessionEvent::ConnectFailed { epoch, error } => {
                self.handle_connect_failed(epoch, &error);
                Vec::new()
            }
            SessionEvent::Devices { epoch, devices } => self.handle_devices(epoch, devices),
            SessionEvent::DiscoveryFailed { epoch, error } => {
                if epoch == self.gate.epoch() {
                    self.notify(Severity::Error, format!("Device discovery failed: {error}"));
                }
                Vec::new()
            }
            SessionEvent::Snapshot(snapshot) => {
                self.handle_snapshot(snapshot);
                Vec::new()
            }
            SessionEvent::PollFailed { stamp, error } => {
                self.handle_poll_failed(stamp, error);
                Vec::new()
            }
            SessionEvent::ZonesWritten { epoch, .. } | SessionEvent::WriteFailed { epoch, .. }
                if epoch != self.gate.epoch() =>
            {
                debug!(epoch = %epoch, current = %self.gate.epoch(), "stale_write_result_ignored");
                Vec::new()
            }
            SessionEvent::ZonesWritten { zones, .. } => {
                let text = match zones.as_slice() {
                    [(kind, id)] => format!("{} {} written to the sensor", kind.label(), id),
                    _ => format!("All {} zones written to the sensor", zones.len()),
                };
                self.notify(Severity::Success, text);
                Vec::new()
            }
            SessionEvent::WriteFailed { kind, id, written, error, .. } => {
                warn!(kind = %kind.as_str(), id = %id, written = %written, error = %error, "zone_write_failed");
                self.notify(Severity::Error, format!("Failed to save {} {}: {error}", kind.label(), id));
                Vec::new()
            }
        }
    }

    fn handle_connected(&mut self, epoch: u64, base_url: String) -> Vec<Command> {
        if epoch != self.gate.epoch() {
            debug!(epoch = %epoch, current = %self.gate.epoch(), "stale_connect_result_ignored");
            return Vec::new();
        }
        self.status = ConnectionStatus::Connected;
        self.notify(Severity::Success, format!("Connected to {base_url}"));

        // Keep the normalized form so the next start uses it as-is
        if self.settings.ha_url != base_url {
            self.settings.ha_url = base_url;
            return vec![Command::SaveSettings(self.settings.clone())];
        }
        Vec::new()
    }

    fn handle_connect_failed(&mut self, epoch: u64, error: &str) {
        if epoch != self.gate.epoch() {
            debug!(epoch = %epoch, "stale_connect_result_ignored");
            return;
        }
        self.status = ConnectionStatus::Disconnected;
        self.notify(Severity::Error, format!("Connection failed: {error}"));
    }

    fn handle_devices(&mut self, epoch: u64, devices: Vec<Device>) -> Vec<Command> {
        if epoch != self.gate.epoch() || self.status != ConnectionStatus::Connected {
            return Vec::new();
        }
        info!(devices = %devices.len(), "device_list_updated");
        if devices.is_empty() {
            self.notify(Severity::Info, "No LD2450 devices found");
        }
        self.devices = devices;

        // A single device needs no choice
        match self.devices.as_slice() {
            [only] if self.selected.is_none() => {
                let name = only.name.clone();
                self.select_device(&name)
            }
            _ => Vec::new(),
        }
    }

    fn handle_snapshot(&mut self, snapshot: Snapshot) {
        if !self.gate.admit(snapshot.stamp) {
            self.metrics.record_stale_dropped();
            debug!(
                epoch = %snapshot.stamp.epoch,
                generation = %snapshot.stamp.generation,
                current_epoch = %self.gate.epoch(),
                "stale_snapshot_dropped"
            );
            return;
        }
        let Some(reconstructor) = &self.selected else {
            return;
        };

        self.store.replace(snapshot.entities);
        self.model = reconstructor.reconstruct(&self.store);
        let now = epoch_ms();
        self.last_update_ms = Some(now);
        self.last_poll_error = None;
        self.sample_trail(now);
    }

    fn handle_poll_failed(&mut self, stamp: Stamp, error: String) {
        if stamp.epoch != self.gate.epoch() {
            return;
        }
        self.last_poll_error = Some(error);
    }
}
