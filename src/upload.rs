//! Chunked dataset upload.
//!
//! Points are sent in contiguous chunks of at most `chunk_size`, in input
//! order, one dataset patch per chunk. Each patch covers the window from the
//! first point's start to the last point's end, so callers must pass points
//! sorted by start time. The remote replaces whatever the source held inside
//! that window.
//!
//! A chunk that fails (transport error or non-2xx) is logged and counted in
//! the [`UploadReport`]; the remaining chunks are still sent. There is no
//! retry and no rollback. Only a missing access token aborts the upload.

use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

use health_sync_core::models::MetricPoint;
use health_sync_core::normalize::{ms_to_ns, MIN_INTERVAL_MS};
use health_sync_core::remote::{DatasetPatch, FitnessApi, WirePoint};

use crate::credentials::{CredentialError, CredentialProvider};
use crate::progress::{ProgressEvent, ProgressReporter};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no access token available: set HSYNC_ACCESS_TOKEN or [auth].token_path")]
    NoAccessToken,
    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

/// Outcome counters of one upload call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Points handed to the remote API, successful or not.
    pub points: u64,
    pub chunks: u64,
    pub failed_chunks: u64,
    pub failed_points: u64,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed_chunks == 0
    }

    pub fn merge(&mut self, other: &UploadReport) {
        self.points += other.points;
        self.chunks += other.chunks;
        self.failed_chunks += other.failed_chunks;
        self.failed_points += other.failed_points;
    }
}

/// Read the bearer token, failing when none is available.
pub async fn require_token(credentials: &dyn CredentialProvider) -> Result<String, UploadError> {
    credentials
        .access_token()
        .await?
        .ok_or(UploadError::NoAccessToken)
}

/// Build the patch for one chunk. Intervals are repaired first; the window
/// runs from the first point's start to the last point's end.
pub fn build_patch(
    data_source_id: &str,
    data_type_name: &str,
    chunk: &[MetricPoint],
) -> DatasetPatch {
    let points: Vec<MetricPoint> = chunk.iter().map(|p| p.repaired(MIN_INTERVAL_MS)).collect();
    let min_start = points.first().map(|p| p.start_ms).unwrap_or_default();
    let max_end = points.last().map(|p| p.end_ms).unwrap_or_default();
    DatasetPatch {
        data_source_id: data_source_id.to_string(),
        min_start_time_ns: ms_to_ns(min_start),
        max_end_time_ns: ms_to_ns(max_end),
        point: points
            .iter()
            .map(|p| WirePoint::from_point(p, data_type_name))
            .collect(),
    }
}

/// Upload `points` to a data source in sequential chunks.
///
/// Progress is reported after every chunk with the cumulative number of
/// points processed, regardless of the chunk's outcome.
pub async fn upload_points(
    api: &dyn FitnessApi,
    credentials: &dyn CredentialProvider,
    data_source_id: &str,
    data_type_name: &str,
    points: &[MetricPoint],
    chunk_size: usize,
    progress: &dyn ProgressReporter,
) -> Result<UploadReport, UploadError> {
    let token = require_token(credentials).await?;

    let mut report = UploadReport::default();
    let Some(first) = points.first() else {
        info!(data_source = data_source_id, "no points to upload");
        return Ok(report);
    };
    let metric = first.metric.name().to_string();
    let total = points.len() as u64;
    let started = Instant::now();

    for (index, chunk) in points.chunks(chunk_size.max(1)).enumerate() {
        let patch = build_patch(data_source_id, data_type_name, chunk);
        report.chunks += 1;
        report.points += chunk.len() as u64;

        if let Err(e) = api.patch_dataset(&token, &patch).await {
            report.failed_chunks += 1;
            report.failed_points += chunk.len() as u64;
            warn!(
                metric = %metric,
                chunk = index + 1,
                points = chunk.len(),
                dataset = %patch.dataset_id(),
                error = %e,
                "chunk upload failed"
            );
        }

        progress.report(ProgressEvent::Uploading {
            metric: metric.clone(),
            n: report.points,
            total,
        });
    }

    info!(
        metric = %metric,
        points = report.points,
        chunks = report.chunks,
        failed_chunks = report.failed_chunks,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "upload finished"
    );
    Ok(report)
}
