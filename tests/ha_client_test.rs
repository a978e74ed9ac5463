//! Integration tests for the Home Assistant client against a local HTTP server

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::AUTHORIZATION;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use ld2450_zones::io::ha_client::{write_zone, HaClient, HaError, HomeAssistant};
use ld2450_zones::services::reconstructor::ZoneWrite;
use parking_lot::Mutex;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const TOKEN: &str = "test-token";

const STATES: &str = r#"[
    {"entity_id": "number.ld2450_hall_zone_1_begin_x", "state": "-500", "attributes": {}},
    {"entity_id": "sensor.ld2450_hall_target_1_x", "state": 120.5, "attributes": {"unit_of_measurement": "mm"}},
    {"entity_id": "binary_sensor.ld2450_hall_target_1_active", "state": "on", "attributes": {"device_class": "occupancy"}},
    {"entity_id": "sensor.outdoor_temperature", "state": null, "attributes": {}}
]"#;

#[derive(Default)]
struct Recorded {
    set_values: Mutex<Vec<Value>>,
}

fn reply(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

async fn handle(req: Request<hyper::body::Incoming>, recorded: Arc<Recorded>) -> Result<Response<Full<Bytes>>, Infallible> {
    let authorized = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"));
    if !authorized {
        return Ok(reply(StatusCode::UNAUTHORIZED, "401: Unauthorized"));
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = match (method, path.as_str()) {
        (Method::GET, "/api/") => reply(StatusCode::OK, r#"{"message": "API running."}"#),
        (Method::GET, "/api/states") => reply(StatusCode::OK, STATES),
        (Method::GET, "/broken/api/states") => reply(StatusCode::OK, "<html>not json</html>"),
        (Method::POST, "/api/services/number/set_value") => {
            let body = req.into_body().collect().await.map(|c| c.to_bytes()).unwrap_or_default();
            let value: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            let reject = value["entity_id"] == "number.ld2450_hall_zone_1_end_x";
            recorded.set_values.lock().push(value);
            if reject {
                reply(StatusCode::BAD_REQUEST, "entity not writable")
            } else {
                reply(StatusCode::OK, "[]")
            }
        }
        _ => reply(StatusCode::NOT_FOUND, "404: Not Found"),
    };
    Ok(response)
}

/// Start a local server; returns its base URL
async fn start_server(recorded: Arc<Recorded>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| handle(req, recorded.clone()));
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
            });
        }
    });

    format!("http://{addr}")
}

fn client(url: &str, token: &str) -> HaClient {
    HaClient::new(url, token, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_check_api() {
    let url = start_server(Arc::default()).await;
    client(&url, TOKEN).check_api().await.unwrap();
}

#[tokio::test]
async fn test_wrong_token_is_status_error() {
    let url = start_server(Arc::default()).await;
    let err = client(&url, "nope").check_api().await.unwrap_err();

    assert!(matches!(err, HaError::Status { status: 401, .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn test_fetch_states() {
    let url = start_server(Arc::default()).await;
    let entities = client(&url, TOKEN).fetch_states().await.unwrap();

    assert_eq!(entities.len(), 4);
    assert_eq!(entities[0].number(), -500.0);
    // Numeric and null states are accepted
    assert_eq!(entities[1].state, "120.5");
    assert_eq!(entities[3].number(), 0.0);
    assert_eq!(entities[2].device_class(), Some("occupancy"));
}

#[tokio::test]
async fn test_non_json_states_is_decode_error() {
    let url = start_server(Arc::default()).await;
    let err = client(&format!("{url}/broken"), TOKEN).fetch_states().await.unwrap_err();

    assert!(matches!(err, HaError::Decode { .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn test_set_number_value_body() {
    let recorded = Arc::new(Recorded::default());
    let url = start_server(recorded.clone()).await;

    client(&url, TOKEN).set_number_value("number.ld2450_hall_zone_2_begin_y", 1250.0).await.unwrap();

    let values = recorded.set_values.lock();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0]["entity_id"], "number.ld2450_hall_zone_2_begin_y");
    assert_eq!(values[0]["value"].as_f64(), Some(1250.0));
}

#[tokio::test]
async fn test_write_zone_stops_at_rejected_write() {
    let recorded = Arc::new(Recorded::default());
    let url = start_server(recorded.clone()).await;
    let writes: Vec<ZoneWrite> = ["begin_x", "begin_y", "end_x", "end_y"]
        .iter()
        .map(|s| ZoneWrite { entity_id: format!("number.ld2450_hall_zone_1_{s}"), value: 100.0 })
        .collect();

    let err = write_zone(&client(&url, TOKEN), &writes).await.unwrap_err();

    match err {
        HaError::Write { entity_id, .. } => assert_eq!(entity_id, "number.ld2450_hall_zone_1_end_x"),
        other => panic!("unexpected error: {other}"),
    }
    // end_y was never sent
    let sent: Vec<_> = recorded.set_values.lock().iter().map(|v| v["entity_id"].to_string()).collect();
    assert_eq!(sent.len(), 3);
}

#[tokio::test]
async fn test_unreachable_host_is_request_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}"), TOKEN).check_api().await.unwrap_err();
    assert!(matches!(err, HaError::Request { .. }), "unexpected error: {err}");
}

#[test]
fn test_invalid_url_rejected() {
    let err = HaClient::new("http://", TOKEN, Duration::from_secs(1)).err();
    assert!(matches!(err, Some(HaError::InvalidUrl(_))));
}
