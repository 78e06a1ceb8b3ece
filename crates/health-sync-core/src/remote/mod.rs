//! Remote fitness API abstraction.
//!
//! The [`FitnessApi`] trait is the seam between the upload logic and the
//! HTTP transport. The application crate implements it with `reqwest`
//! against the Google Fit REST API; [`memory::InMemoryFitnessApi`] is a
//! recording fake for tests.
//!
//! The wire types in this module serialize to the exact JSON bodies the
//! service expects (camelCase keys, nanosecond timestamps as decimal
//! strings).
//!
//! # Operations
//!
//! | Method | HTTP | Purpose |
//! |--------|------|---------|
//! | [`list_data_sources`](FitnessApi::list_data_sources) | `GET /dataSources` | Resolver lookup |
//! | [`create_data_source`](FitnessApi::create_data_source) | `POST /dataSources` | Resolver create |
//! | [`patch_dataset`](FitnessApi::patch_dataset) | `PATCH /dataSources/{id}/datasets/{min}-{max}` | Write a batch of points |
//! | [`put_session`](FitnessApi::put_session) | `PUT /sessions/{id}` | Upsert a session |

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{FieldFormat, MetricPoint, MetricValue, Session};
use crate::normalize::ms_to_ns;

/// Failure of a single remote call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// The request never got a response.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response body could not be decoded.
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// One field of a remote data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTypeField {
    pub name: String,
    pub format: FieldFormat,
}

/// A remote data type: its name and, optionally, its field schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field: Vec<DataTypeField>,
}

/// A registered remote data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    /// Remote-assigned id (`dataStreamId`).
    #[serde(rename = "dataStreamId")]
    pub id: String,
    /// Stream name the source was created with (`dataStreamName`).
    #[serde(rename = "dataStreamName", default)]
    pub display_name: String,
    #[serde(rename = "dataType", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
}

impl DataSource {
    /// Data type name of the source, or `""` when the service omitted it.
    pub fn metric_type(&self) -> &str {
        self.data_type.as_ref().map(|t| t.name.as_str()).unwrap_or("")
    }
}

/// Application descriptor attached to data sources and sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Device descriptor attached to created data sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub uid: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub manufacturer: String,
    pub model: String,
}

/// Body of `POST /dataSources`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDataSource {
    pub data_stream_name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub application: Application,
    pub data_type: DataType,
    pub device: Device,
}

/// One value slot of a wire point: `{"fpVal": ..}` or `{"intVal": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    #[serde(rename = "fpVal")]
    Fp(f64),
    #[serde(rename = "intVal")]
    Int(i64),
}

impl From<MetricValue> for WireValue {
    fn from(value: MetricValue) -> Self {
        match value {
            MetricValue::Float(v) => WireValue::Fp(v),
            MetricValue::Int(v) => WireValue::Int(v),
        }
    }
}

/// A point as sent in a dataset patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePoint {
    pub start_time_nanos: String,
    pub end_time_nanos: String,
    pub data_type_name: String,
    pub value: Vec<WireValue>,
}

impl WirePoint {
    pub fn from_point(point: &MetricPoint, data_type_name: &str) -> Self {
        Self {
            start_time_nanos: ms_to_ns(point.start_ms),
            end_time_nanos: ms_to_ns(point.end_ms),
            data_type_name: data_type_name.to_string(),
            value: vec![point.value.into()],
        }
    }
}

/// Body of `PATCH /dataSources/{id}/datasets/{min}-{max}`.
///
/// The write replaces whatever the source already holds inside
/// `[min_start_time_ns, max_end_time_ns]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetPatch {
    pub data_source_id: String,
    pub min_start_time_ns: String,
    pub max_end_time_ns: String,
    pub point: Vec<WirePoint>,
}

impl DatasetPatch {
    /// Dataset id used in the request path: `{min}-{max}`.
    pub fn dataset_id(&self) -> String {
        format!("{}-{}", self.min_start_time_ns, self.max_end_time_ns)
    }
}

/// Body of `PUT /sessions/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBody {
    pub id: String,
    pub name: String,
    pub description: String,
    pub start_time_millis: i64,
    pub end_time_millis: i64,
    pub activity_type: i32,
    pub application: Application,
}

impl SessionBody {
    pub fn from_session(session: &Session, application: Application) -> Self {
        Self {
            id: session.id.clone(),
            name: session.name.clone(),
            description: session.description.clone(),
            start_time_millis: session.start_ms,
            end_time_millis: session.end_ms,
            activity_type: session.activity_type.code(),
            application,
        }
    }
}

/// Abstract remote fitness-data service.
///
/// Every call takes the bearer token explicitly: the token is read once per
/// upload by the caller and never refreshed here.
#[async_trait]
pub trait FitnessApi: Send + Sync {
    /// List the account's data sources.
    async fn list_data_sources(&self, token: &str) -> Result<Vec<DataSource>, ApiError>;

    /// Register a new data source and return it with its assigned id.
    async fn create_data_source(
        &self,
        token: &str,
        request: &CreateDataSource,
    ) -> Result<DataSource, ApiError>;

    /// Write a batch of points into the patch's window.
    async fn patch_dataset(&self, token: &str, patch: &DatasetPatch) -> Result<(), ApiError>;

    /// Insert or overwrite a session keyed by its id.
    async fn put_session(&self, token: &str, session: &SessionBody) -> Result<(), ApiError>;
}
