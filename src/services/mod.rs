//! Services - business logic and state management
//!
//! This module contains the core services:
//! - `reconstructor` - Rebuilds zones and targets from a device's entities
//! - `transform` - Sensor millimeters to surface pixels and back
//! - `renderer` - Scene to ordered draw commands
//! - `editor` - Zone editing state machine and review form
//! - `poller` - Periodic snapshot fetch with stale-result gating
//! - `session` - Network tasks reporting back as `SessionEvent`s
//! - `controller` - Application state and operator actions

pub mod controller;
pub mod editor;
pub mod poller;
pub mod reconstructor;
pub mod renderer;
pub mod session;
pub mod transform;

// Re-export commonly used types
pub use controller::{Command, ConnectionStatus, Controller};
pub use poller::{Poller, Snapshot, SnapshotGate, Stamp};
pub use reconstructor::{Reconstructor, SensorModel, ZoneSet};
pub use session::{Session, SessionEvent, ZoneWriteBatch};
pub use transform::CoordinateTransform;
