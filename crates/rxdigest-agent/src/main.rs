//! rxdigest: preprint digest pipeline.
//! Entry point for the command-line binary.

mod config;

use anyhow::Context;
use rxdigest_ingestion::sources::arxiv::ArxivClient;
use rxdigest_ingestion::sources::biorxiv::BioRxivClient;
use rxdigest_ingestion::sources::manual::ManualLinks;
use rxdigest_ingestion::{run_pipeline, LiteratureSource, PipelineProgress};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn arxiv_client(config: &config::Config) -> anyhow::Result<ArxivClient> {
    Ok(ArxivClient::new(config.retry.policy())?
        .with_base_url(&config.arxiv.base_url)
        .with_page_size(config.arxiv.page_size))
}

fn biorxiv_client(config: &config::Config, medrxiv: bool) -> anyhow::Result<BioRxivClient> {
    let retry = config.retry.policy();
    let client = if medrxiv {
        BioRxivClient::new_medrxiv(retry)?
    } else {
        BioRxivClient::new_biorxiv(retry)?
    };
    Ok(client.with_base_url(&config.biorxiv.base_url))
}

/// Instantiate the sources named in `search.sources`, in that order.
fn build_sources(config: &config::Config) -> anyhow::Result<Vec<Box<dyn LiteratureSource>>> {
    let mut sources: Vec<Box<dyn LiteratureSource>> = Vec::new();

    for name in &config.search.sources {
        let source: Box<dyn LiteratureSource> = match name.as_str() {
            "arxiv"   => Box::new(arxiv_client(config)?),
            "biorxiv" => Box::new(biorxiv_client(config, false)?),
            "medrxiv" => Box::new(biorxiv_client(config, true)?),
            "manual" => {
                if config.search.manual_links.is_empty() {
                    warn!("Source 'manual' enabled but search.manual_links is empty");
                    continue;
                }
                Box::new(ManualLinks::new(
                    config.search.manual_links.clone(),
                    arxiv_client(config)?,
                    biorxiv_client(config, false)?,
                    biorxiv_client(config, true)?,
                    config.retry.policy(),
                ))
            }
            other => anyhow::bail!("Unknown source '{other}'"),
        };
        sources.push(source);
    }

    Ok(sources)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialise structured logging; stdout carries the JSON result.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rxdigest=debug,info")),
        )
        .init();

    info!("rxdigest starting up...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match config::Config::load() {
        Ok(c) => {
            info!(
                "Configuration loaded. Sources: {}, days: {}, max results: {}",
                c.search.sources.join(", "),
                c.search.days,
                c.search.max_results
            );
            c
        }
        Err(e) => {
            warn!("Could not load rxdigest.toml: {e}");
            warn!("Copy rxdigest.example.toml to rxdigest.toml and edit it.");
            return Ok(());
        }
    };

    let sources = build_sources(&config)?;
    info!("{} sources ready", sources.len());

    let (progress_tx, mut progress_rx) = broadcast::channel::<PipelineProgress>(64);
    let progress_log = tokio::spawn(async move {
        while let Ok(p) = progress_rx.recv().await {
            match p.error {
                Some(ref e) => warn!(stage = %p.stage, error = %e, "{}", p.message),
                None => debug!(stage = %p.stage, found = p.papers_found, "{}", p.message),
            }
        }
    });

    let result = run_pipeline(config.to_job(), &sources, Some(progress_tx)).await;
    let _ = progress_log.await;

    let json = serde_json::to_string_pretty(&result).context("serialising pipeline result")?;
    match std::env::var("RXDIGEST_OUTPUT") {
        Ok(path) => {
            std::fs::write(&path, json).with_context(|| format!("writing {path}"))?;
            info!("Wrote {} records to {}", result.papers_retained, path);
        }
        Err(_) => println!("{json}"),
    }

    if !result.errors.is_empty() {
        warn!("{} source errors during run", result.errors.len());
    }
    Ok(())
}
