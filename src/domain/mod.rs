//! Domain models - entity records and the sensor model rebuilt from them
//!
//! - `types` - `Entity`, `EntityStore` and the typed identifier parser (`EntityField`)
//! - `zone` - `Zone`, `Target`, `TargetTrail`, `Device`

pub mod types;
pub mod zone;

pub use types::{Corner, Entity, EntityField, EntityStore, TargetField, ZoneKind};
pub use zone::{Device, DeviceInfo, Target, TargetTrail, TrailPoint, Zone};
