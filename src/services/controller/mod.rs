//! Application state and the operations that change it
//!
//! The Controller owns everything the console shows:
//! - Connection status, discovered devices and the selected device
//! - The entity store and the sensor model rebuilt from it
//! - Target trail and zone editor
//! - Operator notices
//!
//! It never performs IO. Operator actions and session events return
//! `Command`s that the UI loop hands to the `Session` or the settings store.

mod handlers;

use crate::domain::types::{EntityStore, ZoneKind};
use crate::domain::zone::{epoch_ms, Device, TargetTrail, TrailPoint, Zone};
use crate::infra::metrics::Metrics;
use crate::infra::settings::{Settings, Theme};
use crate::io::ha_client::normalize_url;
use crate::services::editor::{Draft, EditOutcome, EditorState, ZoneEditor, ZoneForm};
use crate::services::poller::SnapshotGate;
use crate::services::reconstructor::{Reconstructor, SensorModel};
use crate::services::renderer::Scene;
use crate::services::session::ZoneWriteBatch;
use crate::services::transform::Millimeters;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Number of operator notices kept for display
const MAX_NOTICES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub severity: Severity,
    pub text: String,
    pub at_ms: u64,
}

/// Side effects requested by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect { url: String, token: String, epoch: u64 },
    Disconnect,
    RefreshDevices { epoch: u64 },
    StartPolling { device: String, epoch: u64, period: Duration },
    WriteZones { batches: Vec<ZoneWriteBatch>, epoch: u64 },
    SaveSettings(Settings),
    ResetSettings,
}

pub struct Controller {
    pub(crate) settings: Settings,
    pub(crate) status: ConnectionStatus,
    pub(crate) devices: Vec<Device>,
    /// Reconstructor for the selected device
    pub(crate) selected: Option<Reconstructor>,
    pub(crate) store: EntityStore,
    pub(crate) model: SensorModel,
    pub(crate) trail: TargetTrail,
    pub(crate) editor: ZoneEditor,
    /// Kind given to drafts created by dragging
    pub(crate) draft_kind: ZoneKind,
    /// Last pointer position over the main surface
    pub(crate) cursor: Option<Millimeters>,
    pub(crate) gate: SnapshotGate,
    pub(crate) notices: VecDeque<Notice>,
    pub(crate) last_update_ms: Option<u64>,
    pub(crate) last_poll_error: Option<String>,
    pub(crate) metrics: Arc<Metrics>,
}

impl Controller {
    pub fn new(settings: Settings, metrics: Arc<Metrics>) -> Self {
        Self {
            settings,
            status: ConnectionStatus::Disconnected,
            devices: Vec::new(),
            selected: None,
            store: EntityStore::new(),
            model: SensorModel::default(),
            trail: TargetTrail::new(),
            editor: ZoneEditor::new(),
            draft_kind: ZoneKind::Detection,
            cursor: None,
            gate: SnapshotGate::new(),
            notices: VecDeque::with_capacity(MAX_NOTICES),
            last_update_ms: None,
            last_poll_error: None,
            metrics,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn selected_device(&self) -> Option<&str> {
        self.selected.as_ref().map(|r| r.device())
    }

    pub fn model(&self) -> &SensorModel {
        &self.model
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn trail(&self) -> &TargetTrail {
        &self.trail
    }

    pub fn editor(&self) -> &ZoneEditor {
        &self.editor
    }

    pub fn draft_kind(&self) -> ZoneKind {
        self.draft_kind
    }

    pub fn notices(&self) -> impl DoubleEndedIterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn latest_notice(&self) -> Option<&Notice> {
        self.notices.back()
    }

    pub fn last_update_ms(&self) -> Option<u64> {
        self.last_update_ms
    }

    pub fn last_poll_error(&self) -> Option<&str> {
        self.last_poll_error.as_deref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Everything the main surface draws this frame
    pub fn scene(&self) -> Scene<'_> {
        Scene {
            zones: &self.model.zones,
            targets: &self.model.targets,
            trail: &self.trail,
            draft: self.editor.draft(),
            show_grid: self.settings.show_grid,
            show_trail: self.settings.enable_persistence,
        }
    }

    pub(crate) fn notify(&mut self, severity: Severity, text: impl Into<String>) {
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice { severity, text: text.into(), at_ms: epoch_ms() });
    }

    fn ready_to_write(&self) -> bool {
        self.status == ConnectionStatus::Connected && self.selected.is_some()
    }

    // -- connection -------------------------------------------------------

    /// Connect with the stored URL and token
    pub fn connect(&mut self) -> Vec<Command> {
        if !self.settings.has_credentials() {
            self.notify(Severity::Error, "Home Assistant URL and access token are required");
            return Vec::new();
        }
        let Some(url) = normalize_url(&self.settings.ha_url) else {
            self.notify(Severity::Error, format!("Invalid Home Assistant URL: {}", self.settings.ha_url));
            return Vec::new();
        };

        let epoch = self.gate.advance_epoch();
        self.status = ConnectionStatus::Connecting;
        self.devices.clear();
        self.clear_device_state();
        self.selected = None;
        info!(url = %url, epoch = %epoch, "connect_requested");

        vec![Command::Connect { url, token: self.settings.ha_token.trim().to_string(), epoch }]
    }

    /// The session could not even build a client
    pub fn connect_rejected(&mut self, error: &str) {
        self.status = ConnectionStatus::Disconnected;
        self.notify(Severity::Error, format!("Connection failed: {error}"));
    }

    pub fn disconnect(&mut self) -> Vec<Command> {
        self.gate.advance_epoch();
        self.status = ConnectionStatus::Disconnected;
        self.selected = None;
        self.clear_device_state();
        vec![Command::Disconnect]
    }

    pub fn refresh_devices(&mut self) -> Vec<Command> {
        if self.status != ConnectionStatus::Connected {
            self.notify(Severity::Error, "Connect to Home Assistant first");
            return Vec::new();
        }
        vec![Command::RefreshDevices { epoch: self.gate.epoch() }]
    }

    /// Switch to `device` and start polling it
    pub fn select_device(&mut self, device: &str) -> Vec<Command> {
        if self.status != ConnectionStatus::Connected {
            self.notify(Severity::Error, "Connect to Home Assistant first");
            return Vec::new();
        }
        if self.selected_device() == Some(device) {
            return Vec::new();
        }

        self.clear_device_state();
        self.selected = Some(Reconstructor::new(device));
        // Anything still in flight for the previous device is now stale
        let epoch = self.gate.advance_epoch();
        info!(device = %device, epoch = %epoch, "device_selected");

        vec![Command::StartPolling { device: device.to_string(), epoch, period: self.settings.refresh_rate() }]
    }

    fn clear_device_state(&mut self) {
        self.store.clear();
        self.model = SensorModel::default();
        self.trail.clear();
        self.editor.discard();
        self.last_update_ms = None;
        self.last_poll_error = None;
    }

    // -- settings ---------------------------------------------------------

    /// Store new connection settings and reconnect with them
    pub fn update_connection(&mut self, url: &str, token: &str, refresh_rate_ms: u64) -> Vec<Command> {
        if url.trim().is_empty() || token.trim().is_empty() {
            self.notify(Severity::Error, "Please provide both Home Assistant URL and access token");
            return Vec::new();
        }
        self.settings.ha_url = url.trim().to_string();
        self.settings.ha_token = token.trim().to_string();
        self.settings.refresh_rate_ms = refresh_rate_ms;

        let mut commands = vec![Command::SaveSettings(self.settings.clone())];
        commands.extend(self.connect());
        commands
    }

    pub fn toggle_grid(&mut self) -> Vec<Command> {
        self.settings.show_grid = !self.settings.show_grid;
        vec![Command::SaveSettings(self.settings.clone())]
    }

    /// Turning persistence off also drops the trail
    pub fn toggle_persistence(&mut self) -> Vec<Command> {
        self.settings.enable_persistence = !self.settings.enable_persistence;
        if !self.settings.enable_persistence {
            self.trail.clear();
        }
        vec![Command::SaveSettings(self.settings.clone())]
    }

    pub fn toggle_theme(&mut self) -> Vec<Command> {
        self.settings.theme = self.settings.theme.toggle();
        vec![Command::SaveSettings(self.settings.clone())]
    }

    pub fn theme(&self) -> Theme {
        self.settings.theme
    }

    pub fn clear_trail(&mut self) {
        self.trail.clear();
    }

    /// Forget stored settings and drop the connection
    pub fn reset_settings(&mut self) -> Vec<Command> {
        self.settings = Settings::default();
        let mut commands = self.disconnect();
        commands.push(Command::ResetSettings);
        self.notify(Severity::Info, "Settings reset");
        commands
    }

    // -- zone editing -----------------------------------------------------

    pub fn toggle_edit_mode(&mut self) {
        let enabled = !self.editor.is_enabled();
        if let Some(EditOutcome::Discarded) = self.editor.set_enabled(enabled) {
            self.notify(Severity::Info, "Edit mode off, draft discarded");
        }
    }

    pub fn toggle_draft_kind(&mut self) {
        self.draft_kind = self.draft_kind.toggle();
    }

    /// Start a drag-drawn draft at `start`
    pub fn pointer_down(&mut self, start: Millimeters) -> bool {
        let id = self.model.zones.first_free_id(self.draft_kind);
        self.editor.pointer_down(start, self.draft_kind, id)
    }

    pub fn pointer_move(&mut self, at: Millimeters) {
        self.cursor = Some(at);
        self.editor.pointer_move(at);
    }

    /// Track the pointer over the surface; `None` once it leaves
    pub fn pointer_hover(&mut self, at: Option<Millimeters>) {
        self.cursor = at;
    }

    /// Live position text: the drag rectangle while drawing, else the cursor
    pub fn cursor_readout(&self) -> Option<String> {
        if let EditorState::Dragging(draft) = self.editor.state() {
            let z = &draft.zone;
            return Some(format!("Zone: ({:.0}, {:.0}) to ({:.0}, {:.0})", z.x1, z.y1, z.x2, z.y2));
        }
        self.cursor.map(|at| format!("X: {:.0}mm, Y: {:.0}mm", at.x, at.y))
    }

    pub fn pointer_up(&mut self) -> bool {
        self.editor.pointer_up()
    }

    /// Open the form for a stored (or empty) zone; ignored while a draft is open
    pub fn edit_zone(&mut self, kind: ZoneKind, id: u8) -> bool {
        if !self.editor.is_idle() || id == 0 || id > kind.max_id() {
            return false;
        }
        self.editor.edit_existing(kind, id, &self.model.zones);
        true
    }

    pub fn form(&self) -> Option<&ZoneForm> {
        self.editor.form()
    }

    pub fn form_mut(&mut self) -> Option<&mut ZoneForm> {
        self.editor.form_mut()
    }

    pub fn draft(&self) -> Option<Draft> {
        self.editor.draft()
    }

    /// Store the draft and write it to the sensor
    ///
    /// Refused until a device is selected; the form stays open so nothing is
    /// lost when connecting clears the device state.
    pub fn save_draft(&mut self) -> Vec<Command> {
        if self.editor.form().is_none() {
            return Vec::new();
        }
        if !self.ready_to_write() {
            self.notify(Severity::Error, "Connect to Home Assistant and select a device before saving zones");
            return Vec::new();
        }
        let Some(EditOutcome::Saved(draft)) = self.editor.save(&mut self.model.zones) else {
            return Vec::new();
        };
        info!(kind = %draft.kind.as_str(), id = %draft.zone.id, active = %draft.zone.active, "zone_saved");

        self.notify(Severity::Info, format!("Writing {} {}...", draft.kind.label(), draft.zone.id));
        self.write_commands(draft.kind, &draft.zone)
    }

    pub fn discard_draft(&mut self) {
        self.editor.discard();
    }

    /// Remove the zone under review and clear it on the sensor
    pub fn delete_draft(&mut self) -> Vec<Command> {
        let Some(EditOutcome::Deleted { kind, id }) = self.editor.delete(&mut self.model.zones) else {
            return Vec::new();
        };
        info!(kind = %kind.as_str(), id = %id, "zone_deleted");
        // Zeros on the sensor, otherwise the next poll brings the zone back
        self.write_commands(kind, &Zone::empty(id))
    }

    /// Remove a zone without opening the form; ignored while a draft is open
    pub fn clear_zone(&mut self, kind: ZoneKind, id: u8) -> Vec<Command> {
        if !self.editor.is_idle() || id == 0 || id > kind.max_id() {
            return Vec::new();
        }
        self.model.zones.of_mut(kind).remove(&id);
        info!(kind = %kind.as_str(), id = %id, "zone_cleared");
        self.notify(Severity::Info, format!("{} {} cleared", kind.label(), id));
        self.write_commands(kind, &Zone::empty(id))
    }

    /// Write every stored zone, detection zones first
    pub fn save_all_zones(&mut self) -> Vec<Command> {
        let Some(reconstructor) = self.selected.as_ref().filter(|_| self.status == ConnectionStatus::Connected)
        else {
            self.notify(Severity::Error, "Connect to Home Assistant and select a device first");
            return Vec::new();
        };

        let batches: Vec<ZoneWriteBatch> = self
            .model
            .zones
            .iter()
            .map(|(kind, zone)| ZoneWriteBatch {
                kind,
                id: zone.id,
                writes: reconstructor.zone_writes(kind, zone),
            })
            .collect();
        if batches.is_empty() {
            self.notify(Severity::Info, "No zones to save");
            return Vec::new();
        }
        self.notify(Severity::Info, format!("Writing {} zones...", batches.len()));
        vec![Command::WriteZones { batches, epoch: self.gate.epoch() }]
    }

    /// Write command for one zone, empty unless a device is selected
    fn write_commands(&self, kind: ZoneKind, zone: &Zone) -> Vec<Command> {
        match self.selected.as_ref().filter(|_| self.ready_to_write()) {
            Some(reconstructor) => {
                let batch = ZoneWriteBatch { kind, id: zone.id, writes: reconstructor.zone_writes(kind, zone) };
                vec![Command::WriteZones { batches: vec![batch], epoch: self.gate.epoch() }]
            }
            None => Vec::new(),
        }
    }

    /// Append one trail sample per active target when persistence is on
    pub(crate) fn sample_trail(&mut self, now_ms: u64) {
        if !self.settings.enable_persistence {
            return;
        }
        for target in self.model.targets.iter().filter(|t| t.active) {
            self.trail.push(TrailPoint { x: target.x, y: target.y, timestamp_ms: now_ms });
        }
    }
}
