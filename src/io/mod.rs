//! IO modules - external system interfaces
//!
//! - `ha_client` - Home Assistant REST client (state snapshots, `number.set_value`)

pub mod ha_client;

// Re-export commonly used types
pub use ha_client::{normalize_url, write_zone, HaClient, HaError, HomeAssistant};
