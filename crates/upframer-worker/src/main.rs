//! Frame extraction worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};

use upframer_media::{check_ffmpeg, ExtractionConfig, FfmpegFrameExtractor};
use upframer_queue::{BrokerTransport, RedisBroker};
use upframer_storage::{build_object_store, StorageConfig};
use upframer_worker::health;
use upframer_worker::logging::init_tracing;
use upframer_worker::metrics::init_metrics;
use upframer_worker::{JobExecutor, JobPipeline, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();
    info!("Starting upframer-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let metrics_handle = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    // Storage is chosen once; no usable backend means no worker
    let storage_config = StorageConfig::from_env();
    let store = match build_object_store(&storage_config).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to initialize storage: {}", e);
            std::process::exit(1);
        }
    };
    info!("Using {} storage", store.kind());

    let broker: Arc<dyn BrokerTransport> = match RedisBroker::from_env().await {
        Ok(broker) => Arc::new(broker),
        Err(e) => {
            error!("Failed to connect to broker: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = check_ffmpeg() {
        warn!("{}; every extraction will fail until it is installed", e);
    }
    let extractor = Arc::new(FfmpegFrameExtractor::new(ExtractionConfig::from_env()));

    let pipeline = JobPipeline::new(store, extractor, config.work_dir.clone());
    let executor = Arc::new(JobExecutor::new(config.clone(), broker.clone(), pipeline));

    let (health_shutdown, health_rx) = tokio::sync::watch::channel(false);
    let health_task = tokio::spawn(health::serve(
        config.health_port,
        health::router(metrics_handle),
        health_rx,
    ));

    let signal_executor = executor.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    let exit_code = match executor.run().await {
        Ok(()) => 0,
        Err(e) => {
            error!("Executor error: {}", e);
            1
        }
    };

    health_shutdown.send_replace(true);
    match health_task.await {
        Ok(Err(e)) => warn!("Health server error: {}", e),
        Err(e) => warn!("Health server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    if let Err(e) = broker.close().await {
        warn!("Failed to close broker connection: {}", e);
    }

    info!("Worker shutdown complete");
    std::process::exit(exit_code);
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
