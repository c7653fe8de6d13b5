use anyhow::{Context, Result};
use sbom_ingestion::config::{Config, GraphBackend};
use sbom_ingestion::executor::{GraphQueryExecutor, HttpQueryExecutor, Neo4jExecutor};
use sbom_ingestion::metrics::InMemoryMetrics;
use sbom_ingestion::{IngestError, SbomWriter};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 SBOM Ingestion Worker starting...");

    let inputs: Vec<PathBuf> = env::args().skip(1).map(PathBuf::from).collect();
    if inputs.is_empty() {
        anyhow::bail!("usage: sbom-ingestion-worker <file-or-directory>...");
    }

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "⚙️  backend={:?} batch_size={} concurrency={} strict={}",
        config.backend, config.batch.batch_size, config.batch.max_concurrency, config.strict
    );

    let executor: Arc<dyn GraphQueryExecutor> = match config.backend {
        GraphBackend::Neo4j => Arc::new(
            Neo4jExecutor::connect_with_retry(
                &config.neo4j_uri,
                &config.neo4j_user,
                &config.neo4j_password,
                config.connect_retries,
            )
            .await?,
        ),
        GraphBackend::Http => {
            info!("🌐 Sending openCypher queries to {}", config.opencypher_url);
            Arc::new(HttpQueryExecutor::new(config.opencypher_url.clone()))
        }
    };

    let metrics = Arc::new(InMemoryMetrics::new());
    let writer = SbomWriter::new(executor, config.batch.clone())
        .with_metrics(metrics.clone())
        .strict(config.strict);

    let mut files = Vec::new();
    for input in &inputs {
        collect_sbom_files(input, &mut files)?;
    }
    files.sort();
    info!("📄 Found {} SBOM file(s)", files.len());

    // Setup shutdown signal handler
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Shutdown signal received, finishing current document...");
                shutdown_clone.store(true, Ordering::SeqCst);
            }
            Err(err) => {
                error!("Failed to listen for shutdown signal: {}", err);
            }
        }
    });

    let mut written = 0usize;
    let mut failed = 0usize;
    for path in &files {
        if shutdown.load(Ordering::SeqCst) {
            warn!("⏹️  Stopping before {:?}", path);
            break;
        }

        match ingest_file(&writer, path).await {
            Ok(true) => written += 1,
            Ok(false) => failed += 1,
            Err(e) => {
                error!("❌ Failed to ingest {:?}: {:#}", path, e);
                failed += 1;
            }
        }
    }

    for (operation, stats) in metrics.snapshot() {
        info!(
            "⏱️  {}: {} call(s), total {:?}, max {:?}",
            operation, stats.count, stats.total, stats.max
        );
    }
    info!("👋 Done: {} written, {} failed", written, failed);

    if failed > 0 {
        anyhow::bail!("{} of {} document(s) failed", failed, files.len());
    }
    Ok(())
}

/// Returns `Ok(false)` when the document was written with failed chunks.
async fn ingest_file(writer: &SbomWriter, path: &Path) -> Result<bool> {
    let document = load_document(path)?;

    match writer.write_document(&document).await {
        Ok(report) => {
            if let Ok(json) = serde_json::to_string(&report) {
                debug!("{:?} report: {}", path, json);
            }
            if report.is_success() {
                info!("✅ {:?} -> {}", path, report.document_id);
            } else {
                warn!(
                    "⚠️  {:?} -> {} with {} failed chunk(s)",
                    path,
                    report.document_id,
                    report.failures().len()
                );
            }
            Ok(report.is_success())
        }
        Err(IngestError::UnrecognizedFormat) => {
            warn!("⚠️  Skipping {:?}: not a CycloneDX or SPDX document", path);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn load_document(path: &Path) -> Result<serde_json::Value> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?} as JSON", path))
}

/// Collects `.json` files from a file or directory tree, skipping hidden entries.
fn collect_sbom_files(path: &Path, results: &mut Vec<PathBuf>) -> Result<()> {
    if path.is_file() {
        results.push(path.to_path_buf());
        return Ok(());
    }
    if !path.is_dir() {
        anyhow::bail!("{:?} is neither a file nor a directory", path);
    }

    for entry in fs::read_dir(path).context("Failed to read directory")? {
        let entry = entry.context("Failed to read directory entry")?;
        let entry_path = entry.path();

        if let Some(name) = entry_path.file_name() {
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
        }

        if entry_path.is_dir() {
            collect_sbom_files(&entry_path, results)?;
        } else if entry_path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("json")) {
            results.push(entry_path);
        }
    }

    Ok(())
}
