use std::path::Path;

use upframer_storage::{select_backend, StorageConfig};
use upframer_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    if std::env::args().any(|arg| arg == "--schemas") {
        let schemas = upframer_models::wire_schemas()?;
        println!("{}", serde_json::to_string_pretty(&schemas)?);
        return Ok(());
    }

    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_ffmpeg()?;
    ensure_env_present(&["REDIS_URL"])?;
    ensure_storage_plan()?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let probe = tempfile::tempdir_in(path)?;
    probe.close()?;
    Ok(())
}

fn ensure_ffmpeg() -> anyhow::Result<()> {
    let path = upframer_media::check_ffmpeg()
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    println!("worker-selfcheck: ffmpeg at {}", path.display());
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}

fn ensure_storage_plan() -> anyhow::Result<()> {
    let storage = StorageConfig::from_env();
    let plan = select_backend(storage.has_remote_credentials(), storage.mode)?;
    println!("worker-selfcheck: storage plan {:?} ({:?} mode)", plan, storage.mode);
    Ok(())
}
