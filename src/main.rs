use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use delivery_ledger_lib::config::EngineConfig;
use delivery_ledger_lib::logging::{self, LogConfig};
use delivery_ledger_lib::scheduler::{self, SchedulerState};
use delivery_ledger_lib::{db, storage_fees};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env();

    let _log_guard = logging::init(&LogConfig::from(&config))
        .with_context(|| format!("create log directory {}", config.log_dir.display()))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("BUILD_GIT_SHA"),
        built_at = env!("BUILD_TIMESTAMP"),
        "Starting delivery ledger"
    );

    let db = Arc::new(
        db::init(&config.data_dir)
            .with_context(|| format!("open database in {}", config.data_dir.display()))?,
    );
    {
        let conn = db.lock()?;
        if let Some(last) = storage_fees::last_generated_date(&conn) {
            info!(last = %last, "Storage fees last generated");
        }
    }

    let state = Arc::new(SchedulerState::new());
    let handle =
        scheduler::start_storage_fee_loop(db.clone(), state.clone(), config.storage_fee_interval_secs);

    tokio::signal::ctrl_c()
        .await
        .context("listen for shutdown signal")?;
    info!("Shutdown requested");

    state.stop();
    handle.abort();
    Ok(())
}
