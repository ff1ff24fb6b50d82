//! Deliveryman shortfalls: cash owed after a handover came in short.
//!
//! `amount` is the remaining balance. Each settlement payment reduces it and
//! is kept in `shortfall_payments`; the record closes once the remainder is
//! within [`EPSILON`].

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::immediate_transaction;
use crate::error::{LedgerError, Result};
use crate::models::{SettlementOutcome, Shortfall, ShortfallStatus};
use crate::money::{require_positive, round2, EPSILON};

const SHORTFALL_COLUMNS: &str = "id, deliveryman_id, shortfall_date, original_amount, amount,
    status, handover_id, created_at, settled_by, settled_at, settled_amount";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortfallPayment {
    pub id: String,
    pub shortfall_id: String,
    pub amount: f64,
    pub paid_by: String,
    pub paid_at: String,
}

fn shortfall_from_row(row: &Row<'_>) -> rusqlite::Result<Shortfall> {
    let status: String = row.get(5)?;
    Ok(Shortfall {
        id: row.get(0)?,
        deliveryman_id: row.get(1)?,
        shortfall_date: row.get(2)?,
        original_amount: row.get(3)?,
        amount: row.get(4)?,
        status: ShortfallStatus::parse(&status).unwrap_or(ShortfallStatus::Pending),
        handover_id: row.get(6)?,
        created_at: row.get(7)?,
        settled_by: row.get(8)?,
        settled_at: row.get(9)?,
        settled_amount: row.get(10)?,
    })
}

pub fn get_shortfall(conn: &Connection, shortfall_id: &str) -> Result<Shortfall> {
    conn.query_row(
        &format!("SELECT {SHORTFALL_COLUMNS} FROM shortfalls WHERE id = ?1"),
        params![shortfall_id],
        shortfall_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            LedgerError::not_found(format!("Shortfall not found: {shortfall_id}"))
        }
        other => other.into(),
    })
}

/// Open shortfalls of a deliveryman, oldest first.
pub fn list_pending(conn: &Connection, deliveryman_id: &str) -> Result<Vec<Shortfall>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SHORTFALL_COLUMNS} FROM shortfalls
         WHERE deliveryman_id = ?1 AND status = 'pending'
         ORDER BY shortfall_date, created_at"
    ))?;
    let rows = stmt
        .query_map(params![deliveryman_id], shortfall_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn list_payments(conn: &Connection, shortfall_id: &str) -> Result<Vec<ShortfallPayment>> {
    let mut stmt = conn.prepare(
        "SELECT id, shortfall_id, amount, paid_by, paid_at
         FROM shortfall_payments
         WHERE shortfall_id = ?1
         ORDER BY paid_at, id",
    )?;
    let rows = stmt
        .query_map(params![shortfall_id], |row| {
            Ok(ShortfallPayment {
                id: row.get(0)?,
                shortfall_id: row.get(1)?,
                amount: row.get(2)?,
                paid_by: row.get(3)?,
                paid_at: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Record `amount` owed by a deliveryman for `date`. With `merge_same_day`,
/// an open shortfall for the same day grows instead of a new one being
/// created. Must run inside the caller's transaction. Returns the shortfall id.
pub(crate) fn record(
    conn: &Connection,
    deliveryman_id: &str,
    date: &str,
    amount: f64,
    handover_id: &str,
    merge_same_day: bool,
) -> Result<String> {
    let amount = round2(amount);
    let now = Utc::now().to_rfc3339();

    if merge_same_day {
        let open: Option<String> = conn
            .query_row(
                "SELECT id FROM shortfalls
                 WHERE deliveryman_id = ?1 AND shortfall_date = ?2 AND status = 'pending'
                 ORDER BY created_at LIMIT 1",
                params![deliveryman_id, date],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = open {
            conn.execute(
                "UPDATE shortfalls SET
                    amount = round(amount + ?1, 2),
                    original_amount = round(original_amount + ?1, 2),
                    updated_at = ?2
                 WHERE id = ?3",
                params![amount, now, id],
            )?;
            info!(
                shortfall_id = %id,
                deliveryman_id = %deliveryman_id,
                added = %amount,
                "Shortfall increased"
            );
            return Ok(id);
        }
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO shortfalls (id, deliveryman_id, shortfall_date, original_amount, amount,
            status, handover_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4, 'pending', ?5, ?6, ?6)",
        params![id, deliveryman_id, date, amount, handover_id, now],
    )?;
    info!(
        shortfall_id = %id,
        deliveryman_id = %deliveryman_id,
        amount = %amount,
        "Shortfall created"
    );
    Ok(id)
}

/// Apply a payment against a pending shortfall.
///
/// A partial payment leaves the remainder pending. A settled or unknown
/// shortfall is `NotFound`, so a replayed settlement has no effect.
pub fn settle(
    conn: &Connection,
    shortfall_id: &str,
    amount_paid: f64,
    validator_user_id: &str,
) -> Result<SettlementOutcome> {
    let amount_paid = require_positive(amount_paid, "amountPaid")?;

    immediate_transaction(conn, |conn| {
        let shortfall = get_shortfall(conn, shortfall_id)?;
        if shortfall.status != ShortfallStatus::Pending {
            warn!(shortfall_id = %shortfall_id, "Settlement of a closed shortfall rejected");
            return Err(LedgerError::not_found(format!(
                "No pending shortfall with id {shortfall_id}"
            )));
        }

        let remaining = round2((shortfall.amount - amount_paid).max(0.0));
        let status = if remaining <= EPSILON {
            ShortfallStatus::Settled
        } else {
            ShortfallStatus::Pending
        };
        let remaining = if status == ShortfallStatus::Settled {
            0.0
        } else {
            remaining
        };
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO shortfall_payments (id, shortfall_id, amount, paid_by, paid_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                shortfall_id,
                amount_paid,
                validator_user_id,
                now
            ],
        )?;
        conn.execute(
            "UPDATE shortfalls SET
                amount = ?1,
                status = ?2,
                settled_amount = round(settled_amount + ?3, 2),
                settled_by = ?4,
                settled_at = ?5,
                updated_at = ?5
             WHERE id = ?6",
            params![
                remaining,
                status.as_str(),
                amount_paid,
                validator_user_id,
                now,
                shortfall_id
            ],
        )?;

        info!(
            shortfall_id = %shortfall_id,
            deliveryman_id = %shortfall.deliveryman_id,
            amount_paid = %amount_paid,
            remaining = %remaining,
            status = %status,
            "Shortfall payment recorded"
        );

        Ok(SettlementOutcome {
            shortfall_id: shortfall_id.to_string(),
            amount_paid,
            remaining,
            status,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup() -> db::DbState {
        let state = db::test_state();
        {
            let conn = state.lock().unwrap();
            conn.execute_batch(
                "INSERT INTO deliverymen (id, name) VALUES ('m1', 'Moussa');
                 INSERT INTO cash_handovers (id, deliveryman_id, kind, expected_total,
                                             paid_amount, validated_by, created_at)
                 VALUES ('h1', 'm1', 'batch', 3000, 2500, 'cashier', '2024-03-05T18:00:00Z');",
            )
            .unwrap();
        }
        state
    }

    #[test]
    fn test_full_payment_settles() {
        let state = setup();
        let conn = state.lock().unwrap();
        let id = record(&conn, "m1", "2024-03-05", 500.0, "h1", false).unwrap();

        let outcome = settle(&conn, &id, 500.0, "cashier-2").unwrap();
        assert_eq!(outcome.status, ShortfallStatus::Settled);
        assert_eq!(outcome.remaining, 0.0);

        let shortfall = get_shortfall(&conn, &id).unwrap();
        assert_eq!(shortfall.status, ShortfallStatus::Settled);
        assert_eq!(shortfall.original_amount, 500.0);
        assert_eq!(shortfall.settled_amount, 500.0);
        assert_eq!(shortfall.settled_by.as_deref(), Some("cashier-2"));
        assert!(list_pending(&conn, "m1").unwrap().is_empty());
    }

    #[test]
    fn test_partial_payments_reduce_remainder() {
        let state = setup();
        let conn = state.lock().unwrap();
        let id = record(&conn, "m1", "2024-03-05", 500.0, "h1", false).unwrap();

        let first = settle(&conn, &id, 200.0, "cashier").unwrap();
        assert_eq!(first.status, ShortfallStatus::Pending);
        assert_eq!(first.remaining, 300.0);

        let second = settle(&conn, &id, 400.0, "cashier").unwrap();
        assert_eq!(second.status, ShortfallStatus::Settled);
        assert_eq!(second.remaining, 0.0);

        let payments = list_payments(&conn, &id).unwrap();
        assert_eq!(payments.len(), 2);
        assert_eq!(get_shortfall(&conn, &id).unwrap().settled_amount, 600.0);
    }

    #[test]
    fn test_settling_twice_is_not_found() {
        let state = setup();
        let conn = state.lock().unwrap();
        let id = record(&conn, "m1", "2024-03-05", 500.0, "h1", false).unwrap();
        settle(&conn, &id, 500.0, "cashier").unwrap();

        assert!(matches!(
            settle(&conn, &id, 500.0, "cashier"),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            settle(&conn, "missing", 10.0, "cashier"),
            Err(LedgerError::NotFound(_))
        ));
        assert_eq!(list_payments(&conn, &id).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_amount_is_rejected() {
        let state = setup();
        let conn = state.lock().unwrap();
        let id = record(&conn, "m1", "2024-03-05", 500.0, "h1", false).unwrap();
        assert!(matches!(
            settle(&conn, &id, 0.0, "cashier"),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            settle(&conn, &id, f64::NAN, "cashier"),
            Err(LedgerError::Validation(_))
        ));
        // rounds to zero cents
        assert!(matches!(
            settle(&conn, &id, 0.004, "cashier"),
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(get_shortfall(&conn, &id).unwrap().amount, 500.0);
    }

    #[test]
    fn test_record_merges_same_day_when_asked() {
        let state = setup();
        let conn = state.lock().unwrap();
        let a = record(&conn, "m1", "2024-03-05", 100.0, "h1", true).unwrap();
        let b = record(&conn, "m1", "2024-03-05", 50.0, "h1", true).unwrap();
        let c = record(&conn, "m1", "2024-03-05", 25.0, "h1", false).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(get_shortfall(&conn, &a).unwrap().amount, 150.0);
        assert_eq!(list_pending(&conn, "m1").unwrap().len(), 2);
    }
}
