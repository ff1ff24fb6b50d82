//! Background storage fee generation.
//!
//! The loop calls [`storage_fees::ensure_generated`] for today on start and
//! then every interval. Days missed while the process was down are caught
//! up first, oldest to newest, up to [`MAX_CATCH_UP_DAYS`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db::DbState;
use crate::error::Result;
use crate::models::StorageFeeRun;
use crate::period::{format_date, DateRange};
use crate::storage_fees;

pub const MAX_CATCH_UP_DAYS: i64 = 31;

pub struct SchedulerState {
    pub is_running: Arc<AtomicBool>,
    /// Fee date of the last successful pass.
    pub last_run: Arc<Mutex<Option<String>>>,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self {
            is_running: Arc::new(AtomicBool::new(false)),
            last_run: Arc::new(Mutex::new(None)),
        }
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    pub fn last_run(&self) -> Option<String> {
        self.last_run.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::new()
    }
}

/// One pass: backfill from the day after the last recorded run, then today.
pub fn run_once(db: &DbState, today: NaiveDate) -> Result<Vec<StorageFeeRun>> {
    let conn = db.lock()?;
    let earliest = today - chrono::Duration::days(MAX_CATCH_UP_DAYS);
    let start = storage_fees::last_generated_date(&conn)
        .and_then(|last| last.succ_opt())
        .map(|next| next.max(earliest))
        .filter(|next| *next <= today)
        .unwrap_or(today);

    let range = DateRange::new(start, today).unwrap_or(DateRange::day(today));
    storage_fees::ensure_generated_for_range(&conn, &range)
}

pub fn start_storage_fee_loop(
    db: Arc<DbState>,
    state: Arc<SchedulerState>,
    interval_secs: u64,
) -> JoinHandle<()> {
    let is_running = state.is_running.clone();
    let last_run = state.last_run.clone();

    is_running.store(true, Ordering::SeqCst);

    tokio::spawn(async move {
        info!("Storage fee loop started (interval: {interval_secs}s)");

        loop {
            if !is_running.load(Ordering::SeqCst) {
                break;
            }

            let today = Utc::now().date_naive();
            match run_once(&db, today) {
                Ok(runs) => {
                    let created: usize = runs.iter().map(|r| r.created).sum();
                    if runs.len() > 1 {
                        warn!(days = runs.len(), created, "Caught up missed storage fee days");
                    }
                    if let Ok(mut guard) = last_run.lock() {
                        *guard = Some(format_date(today));
                    }
                }
                Err(e) if e.is_retryable() => {
                    warn!("Storage fee pass deferred, database busy: {e}");
                }
                Err(e) => error!("Storage fee pass failed: {e}"),
            }

            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        }

        info!("Storage fee loop stopped");
    })
}
