//! Sync pipeline orchestration.
//!
//! Coordinates one metric's flow: export scan → aggregation → data-source
//! resolution → chunked upload (or session upload). `hsync sync all` runs
//! every catalog metric in turn, each re-reading the export file.
//!
//! The access token is checked before the export is read, so a missing
//! token fails fast. The data source is resolved only after extraction,
//! so a metric with no records touches nothing remotely.

use anyhow::{bail, Context, Result};
use tracing::info;

use health_sync_core::catalog::{find_spec, MetricSpec, CATALOG};
use health_sync_core::models::Session;
use health_sync_core::remote::FitnessApi;

use crate::config::Config;
use crate::credentials::CredentialProvider;
use crate::extract::{extract_metric, open_export, Extracted};
use crate::progress::ProgressReporter;
use crate::resolver::DataSourceResolver;
use crate::session_upload::{upload_sessions, SessionReport};
use crate::upload::{require_token, upload_points, UploadReport};

/// Flags of one `hsync sync` invocation.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Scan and aggregate only; no credentials, no remote calls.
    pub dry_run: bool,
    /// Overrides every configured chunk size.
    pub chunk_size: Option<usize>,
    /// Succeed even when some chunks or sessions failed.
    pub allow_partial: bool,
}

/// What one metric's sync did.
#[derive(Debug, Clone, Default)]
pub struct MetricSummary {
    pub metric: String,
    pub matched: u64,
    pub dropped: u64,
    pub series: usize,
    pub points: u64,
    pub sessions: usize,
    pub data_source_id: Option<String>,
    pub upload: UploadReport,
    pub session_report: Option<SessionReport>,
}

impl MetricSummary {
    pub fn is_complete(&self) -> bool {
        self.upload.is_complete()
            && self
                .session_report
                .as_ref()
                .map(SessionReport::is_complete)
                .unwrap_or(true)
    }
}

/// Run one metric (`target` is a metric name) or every metric (`all`).
pub async fn run_sync(
    config: &Config,
    target: &str,
    options: &SyncOptions,
    api: &dyn FitnessApi,
    credentials: &dyn CredentialProvider,
    progress: &dyn ProgressReporter,
) -> Result<Vec<MetricSummary>> {
    if options.chunk_size == Some(0) {
        bail!("--chunk-size must be > 0");
    }

    let specs: Vec<&MetricSpec> = if target == "all" {
        CATALOG.iter().collect()
    } else {
        match find_spec(target) {
            Some(spec) => vec![spec],
            None => bail!(
                "Unknown metric: '{}'. Run `hsync metrics` for the list, or use `all`.",
                target
            ),
        }
    };

    let resolver = DataSourceResolver::new(api, config.upload.application_name.clone());
    let mut summaries = Vec::with_capacity(specs.len());
    for spec in specs {
        let summary =
            sync_metric(config, spec, options, api, credentials, &resolver, progress).await?;
        print_summary(&summary, options.dry_run);
        summaries.push(summary);
    }

    let incomplete: Vec<&str> = summaries
        .iter()
        .filter(|s| !s.is_complete())
        .map(|s| s.metric.as_str())
        .collect();
    if !incomplete.is_empty() && !options.allow_partial {
        bail!(
            "Some uploads failed for: {}. Re-run to retry, or pass --allow-partial.",
            incomplete.join(", ")
        );
    }

    Ok(summaries)
}

/// Scan, aggregate, and upload a single metric.
pub async fn sync_metric(
    config: &Config,
    spec: &MetricSpec,
    options: &SyncOptions,
    api: &dyn FitnessApi,
    credentials: &dyn CredentialProvider,
    resolver: &DataSourceResolver<'_>,
    progress: &dyn ProgressReporter,
) -> Result<MetricSummary> {
    let token = if options.dry_run {
        None
    } else {
        Some(require_token(credentials).await?)
    };

    let path = &config.export.path;
    let scanner = open_export(path)?.with_tags([spec.source.tag]);
    let extraction = extract_metric(scanner, spec, progress)
        .with_context(|| format!("Failed to read export: {}", path.display()))?;

    let mut summary = MetricSummary {
        metric: spec.name().to_string(),
        matched: extraction.matched,
        dropped: extraction.dropped,
        ..MetricSummary::default()
    };
    match &extraction.output {
        Extracted::Series(series) => {
            summary.series = series.len();
            summary.points = series.iter().map(|s| s.points.len() as u64).sum();
        }
        Extracted::Sessions(sessions) => {
            summary.sessions = sessions.len();
            summary.points = sessions.iter().map(|s| s.segments.len() as u64).sum();
        }
    }

    let Some(token) = token else {
        return Ok(summary);
    };
    if extraction.output.is_empty() {
        info!(metric = spec.name(), "no records found; nothing to upload");
        return Ok(summary);
    }

    let stream_name = config.stream_name_for(spec);
    let chunk_size = options
        .chunk_size
        .unwrap_or_else(|| config.chunk_size_for(spec));

    match extraction.output {
        Extracted::Series(series) => {
            let ds_id = resolver
                .resolve(&token, spec.data_type_name, &stream_name, &spec.schema_fields())
                .await
                .with_context(|| format!("Failed to resolve data source '{}'", stream_name))?;
            for s in &series {
                info!(
                    metric = spec.name(),
                    series = %s.label,
                    points = s.points.len(),
                    "uploading series"
                );
                let report = upload_points(
                    api,
                    credentials,
                    &ds_id,
                    spec.data_type_name,
                    &s.points,
                    chunk_size,
                    progress,
                )
                .await?;
                summary.upload.merge(&report);
            }
            summary.data_source_id = Some(ds_id);
        }
        Extracted::Sessions(sessions) => {
            let ds_id = if has_segments(&sessions) {
                Some(
                    resolver
                        .resolve(&token, spec.data_type_name, &stream_name, &spec.schema_fields())
                        .await
                        .with_context(|| {
                            format!("Failed to resolve data source '{}'", stream_name)
                        })?,
                )
            } else {
                None
            };
            let report = upload_sessions(
                api,
                credentials,
                ds_id.as_deref(),
                spec.data_type_name,
                &sessions,
                progress,
            )
            .await?;
            summary.upload = report.segments.clone();
            summary.session_report = Some(report);
            summary.data_source_id = ds_id;
        }
    }

    Ok(summary)
}

fn has_segments(sessions: &[Session]) -> bool {
    sessions.iter().any(|s| !s.segments.is_empty())
}

fn print_summary(summary: &MetricSummary, dry_run: bool) {
    if dry_run {
        println!("sync {} (dry-run)", summary.metric);
    } else {
        println!("sync {}", summary.metric);
    }
    println!("  records matched: {}", summary.matched);
    println!("  records dropped: {}", summary.dropped);
    match &summary.session_report {
        Some(report) => {
            println!(
                "  sessions: {} ({} complete, {} partial, {} failed)",
                report.sessions, report.complete, report.partial_sessions, report.failed_sessions
            );
            println!(
                "  segments uploaded: {} ({} failed)",
                report.segments.points - report.segments.failed_points,
                report.segments.failed_points
            );
        }
        None if dry_run || summary.sessions > 0 => {
            if summary.sessions > 0 {
                println!("  sessions: {}", summary.sessions);
            } else {
                println!("  series: {}", summary.series);
            }
            println!("  points: {}", summary.points);
        }
        None => {
            println!(
                "  points uploaded: {}",
                summary.upload.points - summary.upload.failed_points
            );
            println!(
                "  chunks: {} ({} failed)",
                summary.upload.chunks, summary.upload.failed_chunks
            );
        }
    }
    if let Some(id) = &summary.data_source_id {
        println!("  data source: {}", id);
    }
    if summary.is_complete() {
        println!("ok");
    } else {
        println!("partial");
    }
}
