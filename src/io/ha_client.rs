//! Home Assistant REST client
//!
//! Three calls are used: `GET /api/` (liveness and token check),
//! `GET /api/states` (full entity snapshot) and
//! `POST /api/services/number/set_value` (zone coordinate writes).

use crate::domain::types::Entity;
use crate::services::reconstructor::ZoneWrite;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum HaError {
    #[error("invalid Home Assistant URL: {0:?}")]
    InvalidUrl(String),

    #[error("HTTP client build failed: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("response from {url} could not be decoded: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to set {entity_id} to {value}: {source}")]
    Write {
        entity_id: String,
        value: f64,
        #[source]
        source: Box<HaError>,
    },
}

/// The slice of the Home Assistant API the console talks to
#[async_trait]
pub trait HomeAssistant: Send + Sync {
    /// Liveness and credential check
    async fn check_api(&self) -> Result<(), HaError>;

    /// Every entity the instance knows about
    async fn fetch_states(&self) -> Result<Vec<Entity>, HaError>;

    async fn set_number_value(&self, entity_id: &str, value: f64) -> Result<(), HaError>;
}

/// Normalize a user supplied base URL
///
/// Keeps an explicit `http://` or `https://` scheme, defaults to `http://`
/// and strips trailing slashes. Values carrying a doubled scheme
/// (`http://http:`) are rejected as malformed.
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains("http://http:") {
        return None;
    }

    let lower = trimmed.to_ascii_lowercase();
    let mut url = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    while url.ends_with('/') {
        url.pop();
    }

    // Scheme with no host left after trimming
    if url.ends_with(':') || url.ends_with("://") {
        return None;
    }
    Some(url)
}

pub struct HaClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl HaClient {
    pub fn new(url: &str, token: &str, timeout: Duration) -> Result<Self, HaError> {
        let base_url = normalize_url(url).ok_or_else(|| HaError::InvalidUrl(url.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .http1_only()
            .build()
            .map_err(HaError::Client)?;

        Ok(Self { base_url, token: token.trim().to_string(), http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response, HaError> {
        let response = request
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|source| HaError::Request { url: url.to_string(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HaError::Status { url: url.to_string(), status: status.as_u16() });
        }
        Ok(response)
    }
}

#[async_trait]
impl HomeAssistant for HaClient {
    async fn check_api(&self) -> Result<(), HaError> {
        let url = self.url("/api/");
        self.send(self.http.get(&url), &url).await?;
        Ok(())
    }

    async fn fetch_states(&self) -> Result<Vec<Entity>, HaError> {
        let url = self.url("/api/states");
        let start = Instant::now();
        let response = self.send(self.http.get(&url), &url).await?;
        let entities: Vec<Entity> =
            response.json().await.map_err(|source| HaError::Decode { url: url.clone(), source })?;

        debug!(
            entities = %entities.len(),
            latency_ms = %start.elapsed().as_millis(),
            "ha_states_fetched"
        );
        Ok(entities)
    }

    async fn set_number_value(&self, entity_id: &str, value: f64) -> Result<(), HaError> {
        let url = self.url("/api/services/number/set_value");
        let body = serde_json::json!({ "entity_id": entity_id, "value": value });
        self.send(self.http.post(&url).json(&body), &url).await?;
        debug!(entity_id = %entity_id, value = %value, "ha_number_set");
        Ok(())
    }
}

/// Apply a zone's coordinate writes in order
///
/// The first failure stops the batch; writes that already succeeded stay
/// applied. Returns the number of writes performed.
pub async fn write_zone<C>(client: &C, writes: &[ZoneWrite]) -> Result<usize, HaError>
where
    C: HomeAssistant + ?Sized,
{
    for (done, write) in writes.iter().enumerate() {
        if let Err(e) = client.set_number_value(&write.entity_id, write.value).await {
            warn!(
                entity_id = %write.entity_id,
                value = %write.value,
                completed = %done,
                error = %e,
                "zone_write_aborted"
            );
            return Err(HaError::Write {
                entity_id: write.entity_id.clone(),
                value: write.value,
                source: Box::new(e),
            });
        }
    }
    info!(writes = %writes.len(), "zone_written");
    Ok(writes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records writes; fails the write with the given index
    struct FakeHa {
        fail_at: Option<usize>,
        writes: Mutex<Vec<(String, f64)>>,
    }

    impl FakeHa {
        fn new(fail_at: Option<usize>) -> Self {
            Self { fail_at, writes: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl HomeAssistant for FakeHa {
        async fn check_api(&self) -> Result<(), HaError> {
            Ok(())
        }

        async fn fetch_states(&self) -> Result<Vec<Entity>, HaError> {
            Ok(Vec::new())
        }

        async fn set_number_value(&self, entity_id: &str, value: f64) -> Result<(), HaError> {
            let mut writes = self.writes.lock();
            if self.fail_at == Some(writes.len()) {
                return Err(HaError::Status { url: "/api/services/number/set_value".into(), status: 500 });
            }
            writes.push((entity_id.to_string(), value));
            Ok(())
        }
    }

    fn writes() -> Vec<ZoneWrite> {
        ["begin_x", "begin_y", "end_x", "end_y"]
            .iter()
            .enumerate()
            .map(|(i, suffix)| ZoneWrite {
                entity_id: format!("number.ld2450_zone_1_{suffix}"),
                value: (i as f64 + 1.0) * 100.0,
            })
            .collect()
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("homeassistant.local:8123/").as_deref(), Some("http://homeassistant.local:8123"));
        assert_eq!(normalize_url("  https://ha.example.org//  ").as_deref(), Some("https://ha.example.org"));
        assert_eq!(normalize_url("http://10.0.0.2:8123").as_deref(), Some("http://10.0.0.2:8123"));
        assert_eq!(normalize_url("http://http://10.0.0.2"), None);
        assert_eq!(normalize_url("   "), None);
        assert_eq!(normalize_url("https://"), None);
    }

    #[test]
    fn test_client_rejects_bad_url() {
        let err = HaClient::new("", "token", Duration::from_secs(1)).err();
        assert!(matches!(err, Some(HaError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_write_zone_in_order() {
        let ha = FakeHa::new(None);
        let done = write_zone(&ha, &writes()).await.unwrap();

        assert_eq!(done, 4);
        let recorded = ha.writes.lock();
        assert_eq!(recorded[0], ("number.ld2450_zone_1_begin_x".to_string(), 100.0));
        assert_eq!(recorded[3], ("number.ld2450_zone_1_end_y".to_string(), 400.0));
    }

    #[tokio::test]
    async fn test_failed_write_aborts_rest() {
        let ha = FakeHa::new(Some(1));
        let err = write_zone(&ha, &writes()).await.unwrap_err();

        // First write stays applied, nothing after the failure is attempted
        assert_eq!(ha.writes.lock().len(), 1);
        match err {
            HaError::Write { entity_id, value, .. } => {
                assert_eq!(entity_id, "number.ld2450_zone_1_begin_y");
                assert_eq!(value, 200.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
