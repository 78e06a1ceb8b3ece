//! Shared fixtures for integration tests: export builders and a fake
//! Google Fit server.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, put};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const TOKEN: &str = "test-token";

/// 2024-01-01T00:00:00Z
pub const DAY_1: i64 = 1_704_067_200_000;
pub const DAY_MS: i64 = 86_400_000;

/// Export-style timestamp for epoch milliseconds.
pub fn export_date(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .unwrap()
        .format("%Y-%m-%d %H:%M:%S +0000")
        .to_string()
}

pub fn record(type_id: &str, start_ms: i64, end_ms: i64, value: &str) -> String {
    format!(
        r#" <Record type="{}" sourceName="Watch" unit="x" startDate="{}" endDate="{}" value="{}"/>"#,
        type_id,
        export_date(start_ms),
        export_date(end_ms),
        value
    )
}

pub fn workout(activity: &str, start_ms: i64, end_ms: i64, kcal: Option<&str>) -> String {
    let energy = kcal
        .map(|k| format!(r#" totalEnergyBurned="{}" totalEnergyBurnedUnit="kcal""#, k))
        .unwrap_or_default();
    format!(
        r#" <Workout workoutActivityType="{}" startDate="{}" endDate="{}"{}/>"#,
        activity,
        export_date(start_ms),
        export_date(end_ms),
        energy
    )
}

pub fn export_document(elements: &[String]) -> String {
    let mut doc = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<HealthData locale=\"en_US\">\n <ExportDate value=\"2024-02-01 10:00:00 +0000\"/>\n",
    );
    for element in elements {
        doc.push_str(element);
        doc.push('\n');
    }
    doc.push_str("</HealthData>\n");
    doc
}

/// Write an export into a fresh temp dir. Keep the `TempDir` alive.
pub fn write_export(elements: &[String]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("export.xml");
    std::fs::write(&path, export_document(elements)).unwrap();
    (dir, path)
}

/// Everything the fake server has seen.
#[derive(Default)]
pub struct Recorded {
    pub sources: Vec<Value>,
    pub created: Vec<Value>,
    /// (data source id, dataset id, body)
    pub patches: Vec<(String, String, Value)>,
    /// (session id, body)
    pub sessions: Vec<(String, Value)>,
    pub fail_patches: Vec<usize>,
    pub patch_delay: Option<Duration>,
    pub unauthorized: usize,
}

#[derive(Clone, Default)]
pub struct FakeFit {
    pub state: Arc<Mutex<Recorded>>,
}

impl FakeFit {
    pub fn fail_patch(&self, index: usize) {
        self.state.lock().unwrap().fail_patches.push(index);
    }

    /// Hold every dataset PATCH for `delay` before answering.
    pub fn delay_patches(&self, delay: Duration) {
        self.state.lock().unwrap().patch_delay = Some(delay);
    }

    pub fn add_source(&self, id: &str, stream: &str, data_type: &str) {
        self.state.lock().unwrap().sources.push(json!({
            "dataStreamId": id,
            "dataStreamName": stream,
            "type": "raw",
            "dataType": { "name": data_type, "field": [] }
        }));
    }

    /// Serve on an ephemeral port; returns the API base URL.
    pub async fn start(&self) -> String {
        let app = Router::new()
            .route("/fit/dataSources", get(list_sources).post(create_source))
            .route(
                "/fit/dataSources/{id}/datasets/{dataset}",
                patch(patch_dataset),
            )
            .route("/fit/sessions/{id}", put(put_session))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/fit", addr)
    }
}

fn authorized(fake: &FakeFit, headers: &HeaderMap) -> bool {
    let ok = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", TOKEN))
        .unwrap_or(false);
    if !ok {
        fake.state.lock().unwrap().unauthorized += 1;
    }
    ok
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "invalid credentials").into_response()
}

async fn list_sources(State(fake): State<FakeFit>, headers: HeaderMap) -> Response {
    if !authorized(&fake, &headers) {
        return unauthorized();
    }
    let sources = fake.state.lock().unwrap().sources.clone();
    Json(json!({ "dataSource": sources })).into_response()
}

async fn create_source(
    State(fake): State<FakeFit>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&fake, &headers) {
        return unauthorized();
    }
    let mut created = body.clone();
    created["dataStreamId"] = json!(format!(
        "raw:{}:Apple:Health Export:{}",
        body["dataType"]["name"].as_str().unwrap_or(""),
        body["dataStreamName"].as_str().unwrap_or("")
    ));
    let mut state = fake.state.lock().unwrap();
    state.created.push(body);
    state.sources.push(created.clone());
    Json(created).into_response()
}

async fn patch_dataset(
    State(fake): State<FakeFit>,
    Path((id, dataset)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&fake, &headers) {
        return unauthorized();
    }
    let delay = fake.state.lock().unwrap().patch_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let mut state = fake.state.lock().unwrap();
    let index = state.patches.len();
    state.patches.push((id, dataset, body.clone()));
    if state.fail_patches.contains(&index) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "backend error").into_response();
    }
    Json(body).into_response()
}

async fn put_session(
    State(fake): State<FakeFit>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&fake, &headers) {
        return unauthorized();
    }
    fake.state.lock().unwrap().sessions.push((id, body.clone()));
    Json(body).into_response()
}
