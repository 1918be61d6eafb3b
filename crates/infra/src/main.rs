use std::sync::Arc;

use anyhow::Context;
use tokio::io::BufReader;

use gradelens_infra::{
    FsArtifactStorage, InMemoryDataSource, Pipeline, PipelineConfig, seed_data_source,
    submit_lines,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gradelens_observability::init();

    let config = PipelineConfig::from_env().context("invalid pipeline configuration")?;
    tokio::fs::create_dir_all(&config.artifact_dir)
        .await
        .with_context(|| format!("failed to create artifact dir {:?}", config.artifact_dir))?;

    let source = Arc::new(InMemoryDataSource::new());
    if let Some(path) = &config.data_file {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read data file {path:?}"))?;
        let rows = seed_data_source(&source, &raw)
            .with_context(|| format!("malformed data file {path:?}"))?;
        tracing::info!(data_file = ?path, rows, "seeded data source");
    }

    // Job and notification stores are in-memory: submissions come in on
    // stdin and are lost on exit. Artifacts go to disk.
    let artifacts = Arc::new(FsArtifactStorage::new(
        config.artifact_dir.clone(),
        config.artifact_base_url.clone(),
    ));
    let pipeline = Pipeline::in_memory(source, artifacts);

    tracing::info!(
        worker = %config.worker_id,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        stuck_after_secs = config.stuck_after.as_secs(),
        artifact_dir = ?config.artifact_dir,
        "starting export worker"
    );
    let handle = pipeline.worker(config.worker_config()).spawn();

    let service = pipeline.service.clone();
    let ingress = tokio::spawn(async move {
        submit_lines(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), &service).await
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");

    if ingress.is_finished() {
        match ingress.await {
            Ok(Ok(stats)) => tracing::info!(
                accepted = stats.accepted,
                rejected = stats.rejected,
                "ingress closed"
            ),
            Ok(Err(err)) => tracing::error!(error = %err, "ingress failed"),
            Err(err) => tracing::error!(error = %err, "ingress task ended abnormally"),
        }
    } else {
        ingress.abort();
    }

    let stats = handle.stats();
    handle.shutdown().await;
    tracing::info!(
        completed = stats.jobs_completed,
        failed = stats.jobs_failed,
        reclaimed = stats.jobs_reclaimed,
        "export worker exited"
    );
    Ok(())
}
