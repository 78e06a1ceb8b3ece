//! Data-source get-or-create.
//!
//! A destination stream is identified by its sanitized display name. The
//! resolver lists the account's data sources and reuses one whose stream
//! name matches; otherwise it registers a new one with the fixed device
//! descriptor. Resolved ids are cached for the lifetime of the resolver, so
//! a stream is created at most once per run and never when it already
//! exists remotely.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::info;

use health_sync_core::catalog::FieldSpec;
use health_sync_core::remote::{
    ApiError, Application, CreateDataSource, DataType, DataTypeField, Device, FitnessApi,
};

/// Lowercase `name` and replace every character outside `[a-z0-9_]` with `_`.
pub fn sanitize_stream_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Device descriptor registered with every created data source.
pub fn device_for(stream_name: &str) -> Device {
    Device {
        uid: format!("device_{}", stream_name),
        device_type: "watch".to_string(),
        manufacturer: "Apple".to_string(),
        model: "Health Export".to_string(),
    }
}

/// Idempotent data-source resolution with a per-run cache.
pub struct DataSourceResolver<'a> {
    api: &'a dyn FitnessApi,
    application_name: String,
    resolved: Mutex<HashMap<String, String>>,
}

impl<'a> DataSourceResolver<'a> {
    pub fn new(api: &'a dyn FitnessApi, application_name: impl Into<String>) -> Self {
        Self {
            api,
            application_name: application_name.into(),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Return the id of the data source for `display_name`, creating it
    /// with `schema` when no source with that stream name exists.
    pub async fn resolve(
        &self,
        token: &str,
        data_type_name: &str,
        display_name: &str,
        schema: &[FieldSpec],
    ) -> Result<String, ApiError> {
        let stream_name = sanitize_stream_name(display_name);

        // Held across the remote calls so concurrent resolves of one name
        // cannot both create.
        let mut resolved = self.resolved.lock().await;
        if let Some(id) = resolved.get(&stream_name) {
            return Ok(id.clone());
        }

        let existing = self
            .api
            .list_data_sources(token)
            .await?
            .into_iter()
            .find(|ds| ds.display_name == stream_name);

        let id = match existing {
            Some(ds) => ds.id,
            None => {
                let request = CreateDataSource {
                    data_stream_name: stream_name.clone(),
                    source_type: "raw".to_string(),
                    application: Application {
                        name: self.application_name.clone(),
                        version: None,
                    },
                    data_type: DataType {
                        name: data_type_name.to_string(),
                        field: schema
                            .iter()
                            .map(|f| DataTypeField {
                                name: f.name.to_string(),
                                format: f.format,
                            })
                            .collect(),
                    },
                    device: device_for(&stream_name),
                };
                let created = self.api.create_data_source(token, &request).await?;
                info!(stream = %stream_name, id = %created.id, "created data source");
                created.id
            }
        };

        resolved.insert(stream_name, id.clone());
        Ok(id)
    }
}
