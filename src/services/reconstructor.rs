//! Rebuilds zones, exclusion zones and targets from a device's entities
//!
//! Every entity id is classified once by `EntityField::parse`; the results are
//! folded into the zone maps. Missing or malformed states read as 0 and unknown
//! entities are skipped, so a pass never fails.

use crate::domain::types::{object_id, Corner, Entity, EntityField, EntityStore, TargetField, ZoneKind};
use crate::domain::zone::{Device, DeviceInfo, Target, Zone};
use std::collections::BTreeMap;
use tracing::debug;

/// Detection and exclusion zones keyed by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneSet {
    pub detection: BTreeMap<u8, Zone>,
    pub exclusion: BTreeMap<u8, Zone>,
}

impl ZoneSet {
    pub fn of(&self, kind: ZoneKind) -> &BTreeMap<u8, Zone> {
        match kind {
            ZoneKind::Detection => &self.detection,
            ZoneKind::Exclusion => &self.exclusion,
        }
    }

    pub fn of_mut(&mut self, kind: ZoneKind) -> &mut BTreeMap<u8, Zone> {
        match kind {
            ZoneKind::Detection => &mut self.detection,
            ZoneKind::Exclusion => &mut self.exclusion,
        }
    }

    pub fn get(&self, kind: ZoneKind, id: u8) -> Option<&Zone> {
        self.of(kind).get(&id)
    }

    /// Every stored zone with its kind, detection first
    pub fn iter(&self) -> impl Iterator<Item = (ZoneKind, &Zone)> {
        self.detection
            .values()
            .map(|z| (ZoneKind::Detection, z))
            .chain(self.exclusion.values().map(|z| (ZoneKind::Exclusion, z)))
    }

    /// All 4 detection and 2 exclusion slots in display order, with the
    /// active zone in each slot if there is one
    pub fn slots(&self) -> impl Iterator<Item = (ZoneKind, u8, Option<&Zone>)> {
        [ZoneKind::Detection, ZoneKind::Exclusion]
            .into_iter()
            .flat_map(|kind| (1..=kind.max_id()).map(move |id| (kind, id)))
            .map(move |(kind, id)| (kind, id, self.get(kind, id).filter(|z| z.active)))
    }

    /// Lowest id of `kind` with no active zone stored, or 1 when all are in use
    pub fn first_free_id(&self, kind: ZoneKind) -> u8 {
        (1..=kind.max_id())
            .find(|id| self.of(kind).get(id).map_or(true, |z| !z.active))
            .unwrap_or(1)
    }
}

/// Everything derived from one entity snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorModel {
    pub zones: ZoneSet,
    /// Active targets ordered by id
    pub targets: Vec<Target>,
    pub device_info: DeviceInfo,
}

impl SensorModel {
    pub fn target(&self, id: u8) -> Option<&Target> {
        self.targets.iter().find(|t| t.id == id)
    }
}

/// A single numeric entity write produced from a zone
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneWrite {
    pub entity_id: String,
    pub value: f64,
}

/// Domain reconstructor scoped to one device
#[derive(Debug, Clone)]
pub struct Reconstructor {
    device: String,
    prefix: String,
}

impl Reconstructor {
    pub fn new(device: &str) -> Self {
        Self { device: device.to_string(), prefix: format!("{}_", device) }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Cheap prefix check used to scope a snapshot to this device
    pub fn owns(&self, entity_id: &str) -> bool {
        !self.device.is_empty() && object_id(entity_id).starts_with(&self.prefix)
    }

    /// Rebuild the sensor model from the store. Total over its input.
    pub fn reconstruct(&self, store: &EntityStore) -> SensorModel {
        let mut model = SensorModel {
            device_info: DeviceInfo { model: "LD2450", ..Default::default() },
            ..Default::default()
        };
        let mut skipped = 0usize;

        for entity in store.iter() {
            let parsed = EntityField::parse_with_device(&entity.entity_id);
            // Exact device match; `ld2450_kitchen` must not pick up `ld2450_kitchen_extra`
            if parsed.device.as_deref() != Some(self.device.as_str()) {
                skipped += 1;
                continue;
            }
            match parsed.field {
                EntityField::DetectionCoord { id, corner } => {
                    model
                        .zones
                        .detection
                        .entry(id)
                        .or_insert_with(|| Zone::empty(id))
                        .set(corner, entity.number());
                }
                EntityField::ExclusionCoord { id, corner } => {
                    model
                        .zones
                        .exclusion
                        .entry(id)
                        .or_insert_with(|| Zone::empty(id))
                        .set(corner, entity.number());
                }
                EntityField::TargetField { id, field: TargetField::Active } => {
                    if entity.state == "on" {
                        model.targets.push(Self::read_target(store, entity, id));
                    }
                }
                EntityField::MaxDistance => {
                    model.device_info.max_distance = Some(entity.state.clone());
                }
                EntityField::InstallationAngle => {
                    model.device_info.installation_angle = Some(entity.state.clone());
                }
                EntityField::TargetField { .. } | EntityField::Unrecognized => {}
            }
        }

        model.targets.sort_by_key(|t| t.id);

        debug!(
            device = %self.device,
            zones = %model.zones.detection.len(),
            exclusion_zones = %model.zones.exclusion.len(),
            targets = %model.targets.len(),
            skipped = %skipped,
            "sensor_model_reconstructed"
        );

        model
    }

    /// Look up `target_<n>_{x,y,speed,distance,angle}` next to the `_active` entity
    fn read_target(store: &EntityStore, active: &Entity, id: u8) -> Target {
        let base = active.entity_id.strip_suffix("_active").unwrap_or(&active.entity_id);
        // Siblings live on the sensor platform even when `_active` is a binary_sensor
        let sibling = |field: TargetField| {
            let suffix = field.suffix();
            let same_platform = format!("{}_{}", base, suffix);
            if let Some(entity) = store.get(&same_platform) {
                return entity.number();
            }
            let sensor_platform = format!("sensor.{}_{}", object_id(base), suffix);
            store.number(&sensor_platform)
        };

        Target {
            id,
            x: sibling(TargetField::X),
            y: sibling(TargetField::Y),
            speed: sibling(TargetField::Speed),
            distance: sibling(TargetField::Distance),
            angle: sibling(TargetField::Angle),
            active: true,
        }
    }

    /// Inverse mapping: the four `number.set_value` writes that persist a zone,
    /// in begin_x, begin_y, end_x, end_y order.
    pub fn zone_writes(&self, kind: ZoneKind, zone: &Zone) -> Vec<ZoneWrite> {
        Corner::ALL
            .iter()
            .map(|corner| ZoneWrite {
                entity_id: format!(
                    "number.{}_{}_{}_{}",
                    self.device,
                    kind.entity_prefix(),
                    zone.id,
                    corner.suffix()
                ),
                value: zone.get(*corner),
            })
            .collect()
    }
}

/// True for entities that look like they belong to an LD2450 / mmWave device
fn is_sensor_entity(entity: &Entity) -> bool {
    entity.entity_id.contains("ld2450")
        || entity.entity_id.contains("mmwave")
        || entity.device_class() == Some("presence")
}

/// Device name for an entity: the object id in front of a recognized LD2450
/// suffix, otherwise the object id without its last `_` segment.
pub fn device_name(entity_id: &str) -> String {
    if let Some(device) = EntityField::parse_with_device(entity_id).device {
        return device;
    }
    let object = object_id(entity_id);
    match object.rsplit_once('_') {
        Some((head, _)) if !head.is_empty() => head.to_string(),
        _ => object.to_string(),
    }
}

/// Group sensor entities of a snapshot into devices, sorted by name
pub fn discover_devices(entities: &[Entity]) -> Vec<Device> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for entity in entities.iter().filter(|e| is_sensor_entity(e)) {
        *counts.entry(device_name(&entity.entity_id)).or_default() += 1;
    }
    counts.into_iter().map(|(name, entity_count)| Device { name, entity_count }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(pairs: &[(&str, &str)]) -> EntityStore {
        pairs.iter().map(|(id, state)| Entity::new(*id, *state)).collect()
    }

    #[test]
    fn test_zone_scenario() {
        let store = store(&[
            ("number.ld2450_zone_1_begin_x", "100"),
            ("number.ld2450_zone_1_begin_y", "0"),
            ("number.ld2450_zone_1_end_x", "300"),
            ("number.ld2450_zone_1_end_y", "200"),
        ]);
        let model = Reconstructor::new("ld2450").reconstruct(&store);

        assert_eq!(model.zones.detection.len(), 1);
        assert_eq!(model.zones.detection[&1], Zone { id: 1, x1: 100.0, y1: 0.0, x2: 300.0, y2: 200.0, active: true });
        assert!(model.zones.exclusion.is_empty());
    }

    #[test]
    fn test_slots_cover_every_id() {
        let mut zones = ZoneSet::default();
        zones.detection.insert(2, Zone::new(2, 0.0, 0.0, 100.0, 100.0));
        zones.exclusion.insert(1, Zone::empty(1));

        let slots: Vec<_> = zones.slots().map(|(kind, id, zone)| (kind, id, zone.is_some())).collect();
        assert_eq!(
            slots,
            vec![
                (ZoneKind::Detection, 1, false),
                (ZoneKind::Detection, 2, true),
                (ZoneKind::Detection, 3, false),
                (ZoneKind::Detection, 4, false),
                // Stored but all zero
                (ZoneKind::Exclusion, 1, false),
                (ZoneKind::Exclusion, 2, false),
            ]
        );
    }

    #[test]
    fn test_target_scenario_defaults_missing_fields() {
        let store = store(&[
            ("binary_sensor.ld2450_target_1_active", "on"),
            ("sensor.ld2450_target_1_x", "50"),
            ("sensor.ld2450_target_1_y", "75"),
        ]);
        let model = Reconstructor::new("ld2450").reconstruct(&store);

        assert_eq!(
            model.targets,
            vec![Target { id: 1, x: 50.0, y: 75.0, speed: 0.0, distance: 0.0, angle: 0.0, active: true }]
        );
    }

    #[test]
    fn test_target_siblings_same_platform() {
        let store = store(&[
            ("sensor.ld2450_target_2_active", "on"),
            ("sensor.ld2450_target_2_x", "-120"),
            ("sensor.ld2450_target_2_speed", "35.5"),
            ("sensor.ld2450_target_2_angle", "-12"),
        ]);
        let model = Reconstructor::new("ld2450").reconstruct(&store);
        let target = model.target(2).unwrap();
        assert_eq!(target.x, -120.0);
        assert_eq!(target.speed, 35.5);
        assert_eq!(target.angle, -12.0);
        assert_eq!(target.y, 0.0);
    }

    #[test]
    fn test_inactive_targets_skipped_and_sorted() {
        let store = store(&[
            ("binary_sensor.ld2450_target_3_active", "on"),
            ("binary_sensor.ld2450_target_1_active", "on"),
            ("binary_sensor.ld2450_target_2_active", "off"),
        ]);
        let model = Reconstructor::new("ld2450").reconstruct(&store);
        let ids: Vec<u8> = model.targets.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_reconstruction_total_over_empty_and_malformed() {
        let model = Reconstructor::new("ld2450").reconstruct(&EntityStore::new());
        assert!(model.zones.detection.is_empty());
        assert!(model.targets.is_empty());

        let store = store(&[
            ("number.ld2450_zone_2_begin_x", "unavailable"),
            ("number.ld2450_zone_9_begin_x", "100"),
            ("number.ld2450_occupancy_mask_1_end_y", "garbage"),
            ("sensor.ld2450_target_1_active", "on"),
            ("sensor.ld2450_target_1_x", "not a number"),
            ("sensor.ld2450_uptime", "12"),
        ]);
        let model = Reconstructor::new("ld2450").reconstruct(&store);

        assert_eq!(model.zones.detection[&2], Zone::empty(2));
        assert!(!model.zones.detection.contains_key(&9));
        assert_eq!(model.zones.exclusion[&1], Zone::empty(1));
        assert_eq!(model.targets[0].x, 0.0);
    }

    #[test]
    fn test_partial_zone_defaults_to_zero() {
        let store = store(&[("number.ld2450_zone_3_end_y", "1500")]);
        let model = Reconstructor::new("ld2450").reconstruct(&store);
        assert_eq!(model.zones.detection[&3], Zone { id: 3, x1: 0.0, y1: 0.0, x2: 0.0, y2: 1500.0, active: true });
    }

    #[test]
    fn test_exclusion_zones() {
        let store = store(&[
            ("number.ld2450_occupancy_mask_2_begin_x", "-500"),
            ("number.ld2450_occupancy_mask_2_begin_y", "1000"),
            ("number.ld2450_occupancy_mask_2_end_x", "500"),
            ("number.ld2450_occupancy_mask_2_end_y", "2000"),
        ]);
        let model = Reconstructor::new("ld2450").reconstruct(&store);
        assert_eq!(model.zones.exclusion[&2], Zone::new(2, -500.0, 1000.0, 500.0, 2000.0));
        assert!(model.zones.detection.is_empty());
    }

    #[test]
    fn test_other_device_entities_ignored() {
        let store = store(&[
            ("number.ld2450_kitchen_zone_1_begin_x", "100"),
            ("number.ld2450_kitchen_extra_zone_1_begin_x", "999"),
            ("number.ld2450_hall_zone_1_begin_x", "555"),
        ]);
        let model = Reconstructor::new("ld2450_kitchen").reconstruct(&store);
        assert_eq!(model.zones.detection[&1].x1, 100.0);
    }

    #[test]
    fn test_device_info() {
        let store = store(&[
            ("number.ld2450_max_distance", "600"),
            ("number.ld2450_installation_angle", "15"),
        ]);
        let model = Reconstructor::new("ld2450").reconstruct(&store);
        assert_eq!(model.device_info.model, "LD2450");
        assert_eq!(model.device_info.max_distance.as_deref(), Some("600"));
        assert_eq!(model.device_info.installation_angle.as_deref(), Some("15"));
    }

    #[test]
    fn test_zone_writes_inverse() {
        let reconstructor = Reconstructor::new("ld2450_office");
        let writes = reconstructor.zone_writes(ZoneKind::Exclusion, &Zone::new(2, -100.0, 200.0, 300.0, 400.0));

        let ids: Vec<&str> = writes.iter().map(|w| w.entity_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "number.ld2450_office_occupancy_mask_2_begin_x",
                "number.ld2450_office_occupancy_mask_2_begin_y",
                "number.ld2450_office_occupancy_mask_2_end_x",
                "number.ld2450_office_occupancy_mask_2_end_y",
            ]
        );
        let values: Vec<f64> = writes.iter().map(|w| w.value).collect();
        assert_eq!(values, vec![-100.0, 200.0, 300.0, 400.0]);

        // Written entities reconstruct to the same zone
        let store: EntityStore =
            writes.iter().map(|w| Entity::new(w.entity_id.clone(), w.value.to_string())).collect();
        let model = reconstructor.reconstruct(&store);
        assert_eq!(model.zones.exclusion[&2], Zone::new(2, -100.0, 200.0, 300.0, 400.0));
    }

    #[test]
    fn test_first_free_id() {
        let mut zones = ZoneSet::default();
        assert_eq!(zones.first_free_id(ZoneKind::Detection), 1);

        zones.detection.insert(1, Zone::new(1, 1.0, 1.0, 2.0, 2.0));
        zones.detection.insert(2, Zone::empty(2));
        assert_eq!(zones.first_free_id(ZoneKind::Detection), 2);

        zones.exclusion.insert(1, Zone::new(1, 1.0, 1.0, 2.0, 2.0));
        zones.exclusion.insert(2, Zone::new(2, 1.0, 1.0, 2.0, 2.0));
        assert_eq!(zones.first_free_id(ZoneKind::Exclusion), 1);
    }

    #[test]
    fn test_discover_devices() {
        let entities = vec![
            Entity::new("number.ld2450_living_zone_1_begin_x", "0"),
            Entity::new("sensor.ld2450_living_target_1_x", "0"),
            Entity::new("number.ld2450_living_max_distance", "600"),
            Entity::new("sensor.hall_mmwave_target_1_y", "0"),
            Entity::new("binary_sensor.office_presence", "on")
                .with_attribute("device_class", json!("presence")),
            Entity::new("light.kitchen", "on"),
        ];
        let devices = discover_devices(&entities);
        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["hall_mmwave", "ld2450_living", "office"]);
        assert_eq!(devices[1].entity_count, 3);
    }
}
