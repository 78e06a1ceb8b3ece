//! Session upload: sleep nights and workouts.
//!
//! Each session moves through
//! `Built → (PUT session) → SessionLive → (PATCH segments) → Complete`.
//! The PUT is keyed by the session id, so repeating it is safe. A failed
//! segment upload leaves the session live without its segments; nothing is
//! deleted to compensate.

use tracing::{info, warn};

use health_sync_core::models::{Session, SessionState};
use health_sync_core::normalize::ms_to_ns;
use health_sync_core::remote::{Application, FitnessApi, SessionBody};

use crate::credentials::CredentialProvider;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::upload::{build_patch, require_token, UploadError, UploadReport};

/// Application descriptor attached to every uploaded session.
pub fn session_application() -> Application {
    Application {
        name: "Apple Health Sync".to_string(),
        version: Some("1.0".to_string()),
    }
}

/// Outcome of uploading a collection of sessions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    pub sessions: u64,
    pub complete: u64,
    /// Sessions whose PUT failed.
    pub failed_sessions: u64,
    /// Sessions that are live remotely but whose segments failed to upload.
    pub partial_sessions: u64,
    pub segments: UploadReport,
    /// Final state per session id, in upload order.
    pub states: Vec<(String, SessionState)>,
}

impl SessionReport {
    pub fn is_complete(&self) -> bool {
        self.failed_sessions == 0 && self.partial_sessions == 0
    }
}

/// Create or overwrite the remote session.
///
/// Returns [`SessionState::SessionLive`] on success and
/// [`SessionState::Built`] when the remote call failed (logged).
pub async fn upload_session(
    api: &dyn FitnessApi,
    credentials: &dyn CredentialProvider,
    session: &Session,
) -> Result<SessionState, UploadError> {
    let token = require_token(credentials).await?;
    let body = SessionBody::from_session(session, session_application());
    match api.put_session(&token, &body).await {
        Ok(()) => Ok(SessionState::SessionLive),
        Err(e) => {
            warn!(session = %session.id, error = %e, "session upload failed");
            Ok(SessionState::Built)
        }
    }
}

/// Write the session's segments as one dataset patch whose window is the
/// session's own `[start, end]`.
pub async fn upload_linked_dataset(
    api: &dyn FitnessApi,
    credentials: &dyn CredentialProvider,
    data_source_id: &str,
    data_type_name: &str,
    session: &Session,
) -> Result<UploadReport, UploadError> {
    let token = require_token(credentials).await?;
    let mut report = UploadReport::default();
    if session.segments.is_empty() {
        return Ok(report);
    }

    let mut patch = build_patch(data_source_id, data_type_name, &session.segments);
    patch.min_start_time_ns = ms_to_ns(session.start_ms);
    patch.max_end_time_ns = ms_to_ns(session.end_ms);

    let n = session.segments.len() as u64;
    report.chunks = 1;
    report.points = n;
    if let Err(e) = api.patch_dataset(&token, &patch).await {
        report.failed_chunks = 1;
        report.failed_points = n;
        warn!(
            session = %session.id,
            dataset = %patch.dataset_id(),
            error = %e,
            "segment upload failed"
        );
    }
    Ok(report)
}

/// Upload every session, then its segments when the session is live.
///
/// `data_source_id` is required only when some session has segments; a
/// session with segments and no data source is left live without them.
pub async fn upload_sessions(
    api: &dyn FitnessApi,
    credentials: &dyn CredentialProvider,
    data_source_id: Option<&str>,
    data_type_name: &str,
    sessions: &[Session],
    progress: &dyn ProgressReporter,
) -> Result<SessionReport, UploadError> {
    require_token(credentials).await?;

    let mut report = SessionReport::default();
    let total = sessions.len() as u64;

    for session in sessions {
        report.sessions += 1;
        let mut state = upload_session(api, credentials, session).await?;

        if state == SessionState::SessionLive {
            let segments = match (data_source_id, session.segments.is_empty()) {
                (_, true) => Some(UploadReport::default()),
                (Some(ds), false) => Some(
                    upload_linked_dataset(api, credentials, ds, data_type_name, session).await?,
                ),
                (None, false) => None,
            };
            match segments {
                Some(segments) => {
                    if segments.is_complete() {
                        state = SessionState::Complete;
                    }
                    report.segments.merge(&segments);
                }
                None => {
                    warn!(session = %session.id, "no data source for session segments");
                }
            }
        }

        match state {
            SessionState::Complete => report.complete += 1,
            SessionState::SessionLive => report.partial_sessions += 1,
            SessionState::Built => report.failed_sessions += 1,
        }
        report.states.push((session.id.clone(), state));

        progress.report(ProgressEvent::Uploading {
            metric: session.name.clone(),
            n: report.sessions,
            total,
        });
    }

    info!(
        sessions = report.sessions,
        complete = report.complete,
        failed = report.failed_sessions,
        partial = report.partial_sessions,
        "session upload finished"
    );
    Ok(report)
}
