use anyhow::{Context, Result};

use health_sync_core::catalog::CATALOG;
use health_sync_core::remote::FitnessApi;

use crate::config::Config;
use crate::credentials::CredentialProvider;
use crate::resolver::sanitize_stream_name;
use crate::upload::require_token;

/// Print the account's remote data sources, marking the ones this tool writes to.
pub async fn list_sources(
    config: &Config,
    api: &dyn FitnessApi,
    credentials: &dyn CredentialProvider,
) -> Result<()> {
    let token = require_token(credentials).await?;
    let mut sources = api
        .list_data_sources(&token)
        .await
        .context("Failed to list data sources")?;
    sources.sort_by(|a, b| a.display_name.cmp(&b.display_name));

    let ours: Vec<String> = CATALOG
        .iter()
        .map(|spec| sanitize_stream_name(&config.stream_name_for(spec)))
        .collect();

    println!("{:<40} {:<32} {:<6} ID", "STREAM", "TYPE", "HSYNC");
    for ds in &sources {
        let managed = ours.contains(&ds.display_name);
        println!(
            "{:<40} {:<32} {:<6} {}",
            ds.display_name,
            ds.metric_type(),
            managed,
            ds.id
        );
    }
    println!("{} data source(s)", sources.len());

    Ok(())
}

/// Print the metric catalog.
pub fn list_metrics(config: &Config) {
    println!(
        "{:<18} {:<46} {:<16} {:<32} STREAM",
        "METRIC", "SOURCE", "AGGREGATION", "DESTINATION"
    );
    for spec in &CATALOG {
        println!(
            "{:<18} {:<46} {:<16} {:<32} {}",
            spec.name(),
            spec.source.value,
            spec.aggregation.label(),
            spec.data_type_name,
            config.stream_name_for(spec)
        );
    }
}
