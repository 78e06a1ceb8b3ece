//! In-memory [`FitnessApi`] implementation for tests.
//!
//! Records every call in order and keeps created data sources so that a
//! second lookup sees them. Individual patch or session calls can be made
//! to fail (by zero-based call index) to exercise partial-failure paths.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{
    ApiError, CreateDataSource, DataSource, DataType, DatasetPatch, FitnessApi, SessionBody,
};

/// A call observed by [`InMemoryFitnessApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    ListDataSources,
    CreateDataSource(CreateDataSource),
    PatchDataset(DatasetPatch),
    PutSession(SessionBody),
}

/// Recording fake of the remote service.
pub struct InMemoryFitnessApi {
    sources: RwLock<Vec<DataSource>>,
    calls: RwLock<Vec<ApiCall>>,
    failing_patches: RwLock<HashSet<usize>>,
    failing_sessions: RwLock<HashSet<usize>>,
    patch_count: RwLock<usize>,
    session_count: RwLock<usize>,
}

impl InMemoryFitnessApi {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            calls: RwLock::new(Vec::new()),
            failing_patches: RwLock::new(HashSet::new()),
            failing_sessions: RwLock::new(HashSet::new()),
            patch_count: RwLock::new(0),
            session_count: RwLock::new(0),
        }
    }

    /// Pre-register an existing remote data source.
    pub fn with_data_source(self, id: &str, stream_name: &str, data_type: &str) -> Self {
        write(&self.sources).push(DataSource {
            id: id.to_string(),
            display_name: stream_name.to_string(),
            data_type: Some(DataType {
                name: data_type.to_string(),
                field: Vec::new(),
            }),
        });
        self
    }

    /// Make the `index`-th (zero-based) dataset patch fail with a transport error.
    pub fn fail_patch(&self, index: usize) {
        write(&self.failing_patches).insert(index);
    }

    /// Make the `index`-th (zero-based) session put fail with HTTP 500.
    pub fn fail_session(&self, index: usize) {
        write(&self.failing_sessions).insert(index);
    }

    /// Every call, in the order received.
    pub fn calls(&self) -> Vec<ApiCall> {
        read(&self.calls).clone()
    }

    /// Every attempted dataset patch, including failed ones.
    pub fn patches(&self) -> Vec<DatasetPatch> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::PatchDataset(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    /// Every attempted session put, including failed ones.
    pub fn sessions(&self) -> Vec<SessionBody> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::PutSession(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// Every create-data-source request.
    pub fn created_sources(&self) -> Vec<CreateDataSource> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::CreateDataSource(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Data sources currently registered.
    pub fn data_sources(&self) -> Vec<DataSource> {
        read(&self.sources).clone()
    }

    fn record(&self, call: ApiCall) {
        write(&self.calls).push(call);
    }
}

impl Default for InMemoryFitnessApi {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Take the next call index from a counter.
fn next_index(counter: &RwLock<usize>) -> usize {
    let mut guard = write(counter);
    let index = *guard;
    *guard += 1;
    index
}

#[async_trait]
impl FitnessApi for InMemoryFitnessApi {
    async fn list_data_sources(&self, _token: &str) -> Result<Vec<DataSource>, ApiError> {
        self.record(ApiCall::ListDataSources);
        Ok(self.data_sources())
    }

    async fn create_data_source(
        &self,
        _token: &str,
        request: &CreateDataSource,
    ) -> Result<DataSource, ApiError> {
        self.record(ApiCall::CreateDataSource(request.clone()));
        let source = DataSource {
            id: format!(
                "raw:{}:{}:{}",
                request.data_type.name, request.device.uid, request.data_stream_name
            ),
            display_name: request.data_stream_name.clone(),
            data_type: Some(request.data_type.clone()),
        };
        write(&self.sources).push(source.clone());
        Ok(source)
    }

    async fn patch_dataset(&self, _token: &str, patch: &DatasetPatch) -> Result<(), ApiError> {
        self.record(ApiCall::PatchDataset(patch.clone()));
        let index = next_index(&self.patch_count);
        if read(&self.failing_patches).contains(&index) {
            return Err(ApiError::Transport(format!(
                "simulated failure of patch #{}",
                index
            )));
        }
        Ok(())
    }

    async fn put_session(&self, _token: &str, session: &SessionBody) -> Result<(), ApiError> {
        self.record(ApiCall::PutSession(session.clone()));
        let index = next_index(&self.session_count);
        if read(&self.failing_sessions).contains(&index) {
            return Err(ApiError::Status {
                status: 500,
                body: format!("simulated failure of session {}", session.id),
            });
        }
        Ok(())
    }
}
