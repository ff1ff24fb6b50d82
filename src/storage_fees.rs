//! Daily storage fee generation.
//!
//! [`ensure_generated`] is the single entry point for both the scheduler and
//! the operator "recalculate report" action. For the given date it makes sure
//! every active shop billed for storage carries exactly one `storage_fee`
//! debt. The existence check and the insert share one `BEGIN IMMEDIATE`
//! transaction, and the `idx_debts_storage_fee_per_day` unique index backs it
//! up at the storage layer, so replays and concurrent triggers are no-ops.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{self, immediate_transaction};
use crate::error::Result;
use crate::models::StorageFeeRun;
use crate::money::round2;
use crate::period::{format_date, DateRange};

pub const SETTINGS_CATEGORY: &str = "ledger";
pub const LAST_RUN_KEY: &str = "storage_fees_last_date";

pub fn ensure_generated(conn: &Connection, date: NaiveDate) -> Result<StorageFeeRun> {
    let fee_date = format_date(date);
    let now = Utc::now().to_rfc3339();

    let run = immediate_transaction(conn, |conn| {
        let mut run = StorageFeeRun {
            date: fee_date.clone(),
            ..StorageFeeRun::default()
        };

        let billed: Vec<(String, f64)> = {
            let mut stmt = conn.prepare(
                "SELECT id, storage_price FROM shops
                 WHERE status = 'active' AND bill_storage = 1
                 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        for (shop_id, price) in billed {
            if price <= 0.0 {
                debug!(shop_id = %shop_id, "Storage billed at zero price, skipping");
                continue;
            }

            let exists: bool = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM debts
                     WHERE shop_id = ?1 AND type = 'storage_fee' AND creation_date = ?2
                 )",
                params![shop_id, fee_date],
                |row| row.get(0),
            )?;
            if exists {
                run.already_present += 1;
                continue;
            }

            let debt_id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO debts (id, shop_id, amount, type, status, comment, creation_date,
                    created_by, created_at)
                 VALUES (?1, ?2, ?3, 'storage_fee', 'pending', ?4, ?5, 'system', ?6)",
                params![
                    debt_id,
                    shop_id,
                    round2(price),
                    format!("Storage fee for {fee_date}"),
                    fee_date,
                    now,
                ],
            )?;
            run.created += 1;
            run.debt_ids.push(debt_id);
        }

        // recalculating a past day must not pull the marker backwards
        if last_generated_date(conn).map_or(true, |last| date > last) {
            db::set_setting(conn, SETTINGS_CATEGORY, LAST_RUN_KEY, &fee_date)?;
        }
        Ok(run)
    })?;

    info!(
        date = %run.date,
        created = run.created,
        already_present = run.already_present,
        "Storage fees ensured"
    );
    Ok(run)
}

/// Backfill every day of `range`, oldest first. Each day commits on its own.
pub fn ensure_generated_for_range(conn: &Connection, range: &DateRange) -> Result<Vec<StorageFeeRun>> {
    let mut runs = Vec::new();
    let mut day = range.start;
    while range.contains(day) {
        runs.push(ensure_generated(conn, day)?);
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    Ok(runs)
}

/// Latest date a run has covered, if any.
pub fn last_generated_date(conn: &Connection) -> Option<NaiveDate> {
    db::get_setting(conn, SETTINGS_CATEGORY, LAST_RUN_KEY)
        .as_deref()
        .and_then(crate::period::parse_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbState;
    use crate::period::parse_date;
    use serial_test::serial;
    use std::sync::{Arc, Barrier};

    fn seed(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO shops (id, name, bill_storage, storage_price, status)
             VALUES ('s1', 'Billed', 1, 250, 'active'),
                    ('s2', 'Not billed', 0, 250, 'active'),
                    ('s3', 'Inactive', 1, 250, 'inactive'),
                    ('s4', 'Free storage', 1, 0, 'active'),
                    ('s5', 'Billed too', 1, 100, 'active');",
        )
        .unwrap();
    }

    fn storage_debt_count(conn: &Connection, shop_id: &str, date: &str) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM debts
             WHERE shop_id = ?1 AND type = 'storage_fee' AND status = 'pending'
               AND creation_date = ?2",
            params![shop_id, date],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_generates_one_fee_per_billed_shop() {
        let state = db::test_state();
        let conn = state.lock().unwrap();
        seed(&conn);

        let run = ensure_generated(&conn, parse_date("2024-03-05").unwrap()).unwrap();
        assert_eq!(run.created, 2);
        assert_eq!(run.already_present, 0);
        assert_eq!(storage_debt_count(&conn, "s1", "2024-03-05"), 1);
        assert_eq!(storage_debt_count(&conn, "s2", "2024-03-05"), 0);
        assert_eq!(storage_debt_count(&conn, "s3", "2024-03-05"), 0);
        assert_eq!(storage_debt_count(&conn, "s4", "2024-03-05"), 0);

        let amount: f64 = conn
            .query_row(
                "SELECT amount FROM debts WHERE shop_id = 's5' AND type = 'storage_fee'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(amount, 100.0);
    }

    #[test]
    fn test_second_invocation_creates_nothing() {
        let state = db::test_state();
        let conn = state.lock().unwrap();
        seed(&conn);
        let date = parse_date("2024-03-05").unwrap();

        ensure_generated(&conn, date).unwrap();
        let again = ensure_generated(&conn, date).unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.already_present, 2);
        assert_eq!(storage_debt_count(&conn, "s1", "2024-03-05"), 1);
        assert_eq!(last_generated_date(&conn), Some(date));
    }

    #[test]
    fn test_paid_fee_is_not_regenerated() {
        let state = db::test_state();
        let conn = state.lock().unwrap();
        seed(&conn);
        let date = parse_date("2024-03-05").unwrap();

        ensure_generated(&conn, date).unwrap();
        conn.execute(
            "UPDATE debts SET status = 'paid' WHERE shop_id = 's1'",
            [],
        )
        .unwrap();
        let again = ensure_generated(&conn, date).unwrap();
        assert_eq!(again.created, 0);
    }

    #[test]
    fn test_recalculating_past_day_keeps_latest_marker() {
        let state = db::test_state();
        let conn = state.lock().unwrap();
        seed(&conn);

        ensure_generated(&conn, parse_date("2024-03-05").unwrap()).unwrap();
        let run = ensure_generated(&conn, parse_date("2024-01-10").unwrap()).unwrap();
        assert_eq!(run.created, 2);
        assert_eq!(last_generated_date(&conn), parse_date("2024-03-05"));

        ensure_generated(&conn, parse_date("2024-03-06").unwrap()).unwrap();
        assert_eq!(last_generated_date(&conn), parse_date("2024-03-06"));
    }

    #[test]
    fn test_range_backfill() {
        let state = db::test_state();
        let conn = state.lock().unwrap();
        seed(&conn);
        let range = DateRange::parse("2024-03-01", "2024-03-03").unwrap();

        let runs = ensure_generated_for_range(&conn, &range).unwrap();
        assert_eq!(runs.len(), 3);
        let total: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM debts WHERE type = 'storage_fee'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(total, 6);
    }

    #[test]
    #[serial]
    fn test_concurrent_triggers_create_single_fee() {
        let dir = std::env::temp_dir().join("delivery_ledger_test_storage_race");
        let _ = std::fs::remove_dir_all(&dir);
        {
            let setup: DbState = db::init(&dir).expect("init file db");
            let conn = setup.lock().unwrap();
            seed(&conn);
        }

        let date = parse_date("2024-03-05").unwrap();
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dir = dir.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let state = db::init(&dir).expect("open per-thread connection");
                    let conn = state.lock().unwrap();
                    barrier.wait();
                    ensure_generated(&conn, date).expect("ensure_generated")
                })
            })
            .collect();

        let created: usize = handles
            .into_iter()
            .map(|h| h.join().expect("thread").created)
            .sum();
        assert_eq!(created, 2, "only one trigger may insert per shop");

        let state = db::init(&dir).unwrap();
        let conn = state.lock().unwrap();
        assert_eq!(storage_debt_count(&conn, "s1", "2024-03-05"), 1);
        assert_eq!(storage_debt_count(&conn, "s5", "2024-03-05"), 1);
        drop(conn);
        drop(state);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
