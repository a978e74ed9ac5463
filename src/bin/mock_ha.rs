//! Mock Home Assistant REST API
//!
//! Serves one simulated LD2450 device for local testing of the console.
//!
//! Endpoints:
//! - `GET /api/` - API check
//! - `GET /api/states` - all entity states
//! - `POST /api/services/number/set_value` - store a zone coordinate
//!
//! Behavior:
//! 1. Every request needs `Authorization: Bearer <token>`, otherwise 401
//! 2. Target 1 walks an ellipse, target 2 stands still, target 3 is inactive
//! 3. Zone coordinates written through `number.set_value` show up in the
//!    next state snapshot
//!
//! Usage:
//!   cargo run --bin mock-ha -- --port 8123 --token dev-token

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "mock-ha")]
#[command(about = "Mock Home Assistant API with one simulated LD2450 sensor")]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "8123")]
    port: u16,

    /// Long-lived access token clients must present
    #[arg(short, long, default_value = "dev-token")]
    token: String,

    /// Device name used as entity prefix
    #[arg(short, long, default_value = "ld2450_living_room")]
    device: String,

    /// Extra delay before every response (ms)
    #[arg(long, default_value = "0")]
    latency_ms: u64,
}

struct MockHa {
    token: String,
    device: String,
    latency: Duration,
    started: Instant,
    numbers: Mutex<FxHashMap<String, f64>>,
}

#[derive(Deserialize)]
struct SetValue {
    entity_id: String,
    value: Value,
}

impl MockHa {
    fn new(args: &Args) -> Self {
        let mut numbers = FxHashMap::default();
        for (prefix, count) in [("zone", 4), ("occupancy_mask", 2)] {
            for id in 1..=count {
                for suffix in ["begin_x", "begin_y", "end_x", "end_y"] {
                    numbers.insert(format!("number.{}_{}_{}_{}", args.device, prefix, id, suffix), 0.0);
                }
            }
        }
        // One zone in front of the sensor to start with
        for (suffix, value) in [("begin_x", -1000.0), ("begin_y", 1000.0), ("end_x", 1000.0), ("end_y", 3000.0)] {
            numbers.insert(format!("number.{}_zone_1_{}", args.device, suffix), value);
        }
        numbers.insert(format!("number.{}_max_distance", args.device), 600.0);
        numbers.insert(format!("number.{}_installation_angle", args.device), 0.0);

        Self {
            token: args.token.clone(),
            device: args.device.clone(),
            latency: Duration::from_millis(args.latency_ms),
            started: Instant::now(),
            numbers: Mutex::new(numbers),
        }
    }

    fn authorized(&self, req: &Request<hyper::body::Incoming>) -> bool {
        req.headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == self.token)
    }

    fn states(&self) -> Value {
        let mut states: Vec<Value> = self
            .numbers
            .lock()
            .iter()
            .map(|(entity_id, value)| json!({ "entity_id": entity_id, "state": value.to_string(), "attributes": {} }))
            .collect();

        let t = self.started.elapsed().as_secs_f64();
        let walking = (1500.0 * (t / 4.0).sin(), 3000.0 + 1000.0 * (t / 4.0).cos());
        let targets = [(1, Some(walking)), (2, Some((-800.0, 1800.0))), (3, None)];
        for (id, position) in targets {
            let base = format!("{}_target_{}", self.device, id);
            states.push(json!({
                "entity_id": format!("binary_sensor.{base}_active"),
                "state": if position.is_some() { "on" } else { "off" },
                "attributes": { "device_class": "occupancy" }
            }));
            let (x, y) = position.unwrap_or((0.0, 0.0));
            let speed = if id == 1 { 40.0 } else { 0.0 };
            let fields = [
                ("x", x.round()),
                ("y", y.round()),
                ("speed", speed),
                ("distance", x.hypot(y).round()),
                ("angle", x.atan2(y).to_degrees().round()),
            ];
            for (field, value) in fields {
                states.push(json!({
                    "entity_id": format!("sensor.{base}_{field}"),
                    "state": value.to_string(),
                    "attributes": { "unit_of_measurement": if field == "angle" { "°" } else { "mm" } }
                }));
            }
        }

        states.push(json!({ "entity_id": "light.kitchen", "state": "on", "attributes": {} }));
        states.push(json!({ "entity_id": "sensor.outdoor_temperature", "state": "unavailable", "attributes": {} }));
        Value::Array(states)
    }

    fn set_value(&self, body: &[u8]) -> Result<(), String> {
        let request: SetValue = serde_json::from_slice(body).map_err(|e| format!("invalid body: {e}"))?;
        let value = match &request.value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| format!("invalid value {}", request.value))?;

        let mut numbers = self.numbers.lock();
        match numbers.get_mut(&request.entity_id) {
            Some(slot) => {
                *slot = value;
                println!("[MOCK] {} = {}", request.entity_id, value);
                Ok(())
            }
            None => Err(format!("unknown entity {}", request.entity_id)),
        }
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    ha: Arc<MockHa>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if !ha.latency.is_zero() {
        tokio::time::sleep(ha.latency).await;
    }
    if !ha.authorized(&req) {
        println!("[MOCK] {} {} -> 401", req.method(), req.uri().path());
        return Ok(respond(StatusCode::UNAUTHORIZED, "text/plain", "401: Unauthorized"));
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = match (method, path.as_str()) {
        (Method::GET, "/api/") => {
            respond(StatusCode::OK, "application/json", json!({ "message": "API running." }).to_string())
        }
        (Method::GET, "/api/states") => respond(StatusCode::OK, "application/json", ha.states().to_string()),
        (Method::POST, "/api/services/number/set_value") => {
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => return Ok(respond(StatusCode::BAD_REQUEST, "text/plain", e.to_string())),
            };
            match ha.set_value(&body) {
                Ok(()) => respond(StatusCode::OK, "application/json", "[]"),
                Err(e) => {
                    eprintln!("[MOCK] set_value rejected: {}", e);
                    respond(StatusCode::BAD_REQUEST, "text/plain", e)
                }
            }
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "404: Not Found"),
    };
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║           Mock Home Assistant (LD2450)                   ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║ Port:            {:>5}                                   ║", args.port);
    println!("║ Device:          {:<38} ║", args.device);
    println!("║ Latency:         {:>5} ms                                ║", args.latency_ms);
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let ha = Arc::new(MockHa::new(&args));
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], args.port))).await?;

    loop {
        let (stream, peer) = listener.accept().await?;
        let ha = ha.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, ha.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                eprintln!("[MOCK] Connection from {} failed: {}", peer, e);
            }
        });
    }
}
