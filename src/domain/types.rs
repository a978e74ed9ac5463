//! Entity records and the typed entity identifier parser

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Highest detection zone id the sensor exposes
pub const MAX_DETECTION_ZONES: u8 = 4;
/// Highest exclusion zone (occupancy mask) id the sensor exposes
pub const MAX_EXCLUSION_ZONES: u8 = 2;
/// Highest target id the sensor tracks
pub const MAX_TARGETS: u8 = 3;

/// One Home Assistant entity as returned by `GET /api/states`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    /// Platform states are strings, but some integrations send bare numbers
    #[serde(default, deserialize_with = "deserialize_state")]
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Entity {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self { entity_id: entity_id.into(), state: state.into(), attributes: Map::new() }
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    /// Part of the identifier after the platform prefix (`number.`, `sensor.`, ...)
    pub fn object_id(&self) -> &str {
        object_id(&self.entity_id)
    }

    /// State coerced to a number, 0 when missing or not numeric
    pub fn number(&self) -> f64 {
        parse_number(&self.state)
    }

    pub fn device_class(&self) -> Option<&str> {
        self.attributes.get("device_class").and_then(Value::as_str)
    }
}

fn deserialize_state<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct StateVisitor;

    impl<'de> Visitor<'de> for StateVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string, number, bool or null state")
        }

        fn visit_str<E>(self, value: &str) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_string<E>(self, value: String) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_i64<E>(self, value: i64) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_f64<E>(self, value: f64) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_bool<E>(self, value: bool) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(if value { "on" } else { "off" }.to_string())
        }

        fn visit_unit<E>(self) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(String::new())
        }

        fn visit_none<E>(self) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(StateVisitor)
}

/// Strip the platform prefix from an entity id
pub fn object_id(entity_id: &str) -> &str {
    entity_id.split_once('.').map_or(entity_id, |(_, rest)| rest)
}

/// Lenient numeric coercion: leading numeric prefix, anything else is 0.
///
/// `"12.5 cm"` reads as 12.5, `"unavailable"`, `""`, `"NaN"` and `"inf"` read as 0.
pub fn parse_number(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return if v.is_finite() { v } else { 0.0 };
    }

    let prefix_len = trimmed
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || c == '.' || ((c == '-' || c == '+') && i == 0))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);

    // Shrink until the prefix parses ("1.2.3" -> "1.2")
    let mut end = prefix_len;
    while end > 0 {
        if let Ok(v) = trimmed[..end].parse::<f64>() {
            if v.is_finite() {
                return v;
            }
        }
        end -= 1;
    }
    0.0
}

/// Detection zones and exclusion zones share the same corner encoding but
/// are backed by different entity families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Detection,
    Exclusion,
}

impl ZoneKind {
    /// Entity identifier prefix for this kind of zone
    pub fn entity_prefix(&self) -> &'static str {
        match self {
            ZoneKind::Detection => "zone",
            ZoneKind::Exclusion => "occupancy_mask",
        }
    }

    pub fn max_id(&self) -> u8 {
        match self {
            ZoneKind::Detection => MAX_DETECTION_ZONES,
            ZoneKind::Exclusion => MAX_EXCLUSION_ZONES,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ZoneKind::Detection => "Zone",
            ZoneKind::Exclusion => "Exclusion",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Detection => "detection",
            ZoneKind::Exclusion => "exclusion",
        }
    }

    pub fn toggle(&self) -> Self {
        match self {
            ZoneKind::Detection => ZoneKind::Exclusion,
            ZoneKind::Exclusion => ZoneKind::Detection,
        }
    }
}

/// One of the four coordinates of a zone rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    /// `begin_x`
    X1,
    /// `begin_y`
    Y1,
    /// `end_x`
    X2,
    /// `end_y`
    Y2,
}

impl Corner {
    pub const ALL: [Corner; 4] = [Corner::X1, Corner::Y1, Corner::X2, Corner::Y2];

    fn from_parts(edge: &str, axis: &str) -> Option<Self> {
        match (edge, axis) {
            ("begin", "x") => Some(Corner::X1),
            ("begin", "y") => Some(Corner::Y1),
            ("end", "x") => Some(Corner::X2),
            ("end", "y") => Some(Corner::Y2),
            _ => None,
        }
    }

    /// Entity suffix for this coordinate
    pub fn suffix(&self) -> &'static str {
        match self {
            Corner::X1 => "begin_x",
            Corner::Y1 => "begin_y",
            Corner::X2 => "end_x",
            Corner::Y2 => "end_y",
        }
    }
}

/// A per-target quantity reported by the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetField {
    Active,
    X,
    Y,
    Speed,
    Distance,
    Angle,
}

impl TargetField {
    pub const VALUES: [TargetField; 5] =
        [TargetField::X, TargetField::Y, TargetField::Speed, TargetField::Distance, TargetField::Angle];

    fn from_suffix(s: &str) -> Option<Self> {
        Some(match s {
            "active" => TargetField::Active,
            "x" => TargetField::X,
            "y" => TargetField::Y,
            "speed" => TargetField::Speed,
            "distance" => TargetField::Distance,
            "angle" => TargetField::Angle,
            _ => return None,
        })
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            TargetField::Active => "active",
            TargetField::X => "x",
            TargetField::Y => "y",
            TargetField::Speed => "speed",
            TargetField::Distance => "distance",
            TargetField::Angle => "angle",
        }
    }
}

/// What a single entity identifier encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityField {
    DetectionCoord { id: u8, corner: Corner },
    ExclusionCoord { id: u8, corner: Corner },
    TargetField { id: u8, field: TargetField },
    MaxDistance,
    InstallationAngle,
    Unrecognized,
}

/// Parse result carrying the device prefix in front of the recognized suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntityId {
    pub device: Option<String>,
    pub field: EntityField,
}

impl EntityField {
    /// Classify an entity identifier (with or without platform prefix)
    pub fn parse(entity_id: &str) -> Self {
        Self::parse_with_device(entity_id).field
    }

    /// Classify an identifier and split off the device name in front of the suffix
    pub fn parse_with_device(entity_id: &str) -> ParsedEntityId {
        let tokens: Vec<&str> = object_id(entity_id).split('_').collect();
        let (field, suffix_len) = classify(&tokens);

        let device = match field {
            EntityField::Unrecognized => None,
            _ if tokens.len() > suffix_len => Some(tokens[..tokens.len() - suffix_len].join("_")),
            _ => None,
        };
        ParsedEntityId { device, field }
    }
}

fn parse_id(raw: &str, max: u8) -> Option<u8> {
    raw.parse::<u8>().ok().filter(|id| (1..=max).contains(id))
}

/// Match suffix patterns from the end of the token list.
/// Returns the field and how many trailing tokens it consumed.
fn classify(tokens: &[&str]) -> (EntityField, usize) {
    let n = tokens.len();

    // <...>_occupancy_mask_<id>_<begin|end>_<x|y>
    if n >= 5 && tokens[n - 5] == "occupancy" && tokens[n - 4] == "mask" {
        if let (Some(id), Some(corner)) =
            (parse_id(tokens[n - 3], MAX_EXCLUSION_ZONES), Corner::from_parts(tokens[n - 2], tokens[n - 1]))
        {
            return (EntityField::ExclusionCoord { id, corner }, 5);
        }
    }

    // <...>_zone_<id>_<begin|end>_<x|y>
    if n >= 4 && tokens[n - 4] == "zone" {
        if let (Some(id), Some(corner)) =
            (parse_id(tokens[n - 3], MAX_DETECTION_ZONES), Corner::from_parts(tokens[n - 2], tokens[n - 1]))
        {
            return (EntityField::DetectionCoord { id, corner }, 4);
        }
    }

    // <...>_target_<id>_<field>
    if n >= 3 && tokens[n - 3] == "target" {
        if let (Some(id), Some(field)) =
            (parse_id(tokens[n - 2], MAX_TARGETS), TargetField::from_suffix(tokens[n - 1]))
        {
            return (EntityField::TargetField { id, field }, 3);
        }
    }

    if n >= 2 {
        match (tokens[n - 2], tokens[n - 1]) {
            ("max", "distance") => return (EntityField::MaxDistance, 2),
            ("installation", "angle") => return (EntityField::InstallationAngle, 2),
            _ => {}
        }
    }

    (EntityField::Unrecognized, 0)
}

/// Last-known entity states, replaced wholesale on every poll
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: FxHashMap<String, Entity>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole store with a fresh snapshot
    pub fn replace(&mut self, entities: impl IntoIterator<Item = Entity>) {
        self.entities.clear();
        for entity in entities {
            self.entities.insert(entity.entity_id.clone(), entity);
        }
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    pub fn get(&self, entity_id: &str) -> Option<&Entity> {
        self.entities.get(entity_id)
    }

    /// Numeric state of an entity, 0 when absent or not numeric
    pub fn number(&self, entity_id: &str) -> f64 {
        self.get(entity_id).map_or(0.0, Entity::number)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl FromIterator<Entity> for EntityStore {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut store = EntityStore::new();
        store.replace(iter);
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detection_coords() {
        assert_eq!(
            EntityField::parse("number.ld2450_living_zone_2_begin_x"),
            EntityField::DetectionCoord { id: 2, corner: Corner::X1 }
        );
        assert_eq!(
            EntityField::parse("number.ld2450_living_zone_4_end_y"),
            EntityField::DetectionCoord { id: 4, corner: Corner::Y2 }
        );
    }

    #[test]
    fn test_parse_exclusion_coords() {
        assert_eq!(
            EntityField::parse("number.ld2450_occupancy_mask_1_end_x"),
            EntityField::ExclusionCoord { id: 1, corner: Corner::X2 }
        );
    }

    #[test]
    fn test_parse_target_fields() {
        assert_eq!(
            EntityField::parse("binary_sensor.ld2450_target_3_active"),
            EntityField::TargetField { id: 3, field: TargetField::Active }
        );
        assert_eq!(
            EntityField::parse("sensor.ld2450_target_1_speed"),
            EntityField::TargetField { id: 1, field: TargetField::Speed }
        );
    }

    #[test]
    fn test_parse_device_settings() {
        assert_eq!(EntityField::parse("number.ld2450_max_distance"), EntityField::MaxDistance);
        assert_eq!(
            EntityField::parse("number.ld2450_installation_angle"),
            EntityField::InstallationAngle
        );
    }

    #[test]
    fn test_parse_out_of_range_ids_unrecognized() {
        assert_eq!(EntityField::parse("number.ld2450_zone_5_begin_x"), EntityField::Unrecognized);
        assert_eq!(
            EntityField::parse("number.ld2450_occupancy_mask_3_begin_x"),
            EntityField::Unrecognized
        );
        assert_eq!(EntityField::parse("sensor.ld2450_target_4_x"), EntityField::Unrecognized);
        assert_eq!(EntityField::parse("number.ld2450_zone_0_end_y"), EntityField::Unrecognized);
    }

    #[test]
    fn test_parse_unrelated_entities() {
        assert_eq!(EntityField::parse("light.kitchen"), EntityField::Unrecognized);
        assert_eq!(EntityField::parse("sensor.ld2450_zone_1_target_count"), EntityField::Unrecognized);
        assert_eq!(EntityField::parse("number.ld2450_zone_1_begin_z"), EntityField::Unrecognized);
        assert_eq!(EntityField::parse(""), EntityField::Unrecognized);
    }

    #[test]
    fn test_parse_with_device() {
        let parsed = EntityField::parse_with_device("number.ld2450_living_room_zone_1_begin_x");
        assert_eq!(parsed.device.as_deref(), Some("ld2450_living_room"));

        let parsed = EntityField::parse_with_device("sensor.hallway_mmwave_target_2_angle");
        assert_eq!(parsed.device.as_deref(), Some("hallway_mmwave"));

        let parsed = EntityField::parse_with_device("sensor.zone_hall_target_1_x");
        assert_eq!(parsed.device.as_deref(), Some("zone_hall"));
        assert_eq!(parsed.field, EntityField::TargetField { id: 1, field: TargetField::X });

        let parsed = EntityField::parse_with_device("sensor.something_else");
        assert_eq!(parsed.device, None);
    }

    #[test]
    fn test_parse_number_coercion() {
        assert_eq!(parse_number("100"), 100.0);
        assert_eq!(parse_number(" -250.5 "), -250.5);
        assert_eq!(parse_number("12.5 cm"), 12.5);
        assert_eq!(parse_number("1.2.3"), 1.2);
        assert_eq!(parse_number("unavailable"), 0.0);
        assert_eq!(parse_number("unknown"), 0.0);
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("NaN"), 0.0);
        assert_eq!(parse_number("inf"), 0.0);
        assert_eq!(parse_number("-"), 0.0);
    }

    #[test]
    fn test_entity_deserialize_lenient_state() {
        let json = r#"[
            {"entity_id": "number.a", "state": "12", "attributes": {"unit_of_measurement": "mm"}},
            {"entity_id": "number.b", "state": 7},
            {"entity_id": "number.c", "state": null},
            {"entity_id": "binary_sensor.d", "state": true}
        ]"#;
        let entities: Vec<Entity> = serde_json::from_str(json).unwrap();
        assert_eq!(entities[0].state, "12");
        assert_eq!(entities[0].attributes["unit_of_measurement"], "mm");
        assert_eq!(entities[1].state, "7");
        assert_eq!(entities[2].state, "");
        assert_eq!(entities[3].state, "on");
        assert!(entities[1].attributes.is_empty());
    }

    #[test]
    fn test_entity_store_replace_is_wholesale() {
        let mut store = EntityStore::new();
        store.replace(vec![Entity::new("number.a", "1"), Entity::new("number.b", "2")]);
        assert_eq!(store.len(), 2);

        store.replace(vec![Entity::new("number.c", "3")]);
        assert_eq!(store.len(), 1);
        assert!(store.get("number.a").is_none());
        assert_eq!(store.number("number.c"), 3.0);
        assert_eq!(store.number("number.missing"), 0.0);
    }
}
