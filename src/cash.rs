//! Deliveryman cash handovers.
//!
//! Every collectable COD order of a day becomes one `cash_transactions` row
//! expecting the cash the deliveryman should bring back. A cashier confirms
//! rows one at a time or as a batch; each confirmation is a `cash_handovers`
//! event, and any amount missing becomes a shortfall.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::immediate_transaction;
use crate::deliverymen;
use crate::error::{LedgerError, Result};
use crate::models::{
    CashHandover, CashTransaction, CashTransactionStatus, ConfirmationOutcome, HandoverKind,
};
use crate::money::{allocate, require_positive, round2, EPSILON};
use crate::period::{format_date, parse_date};
use crate::readers::{COLLECTABLE_ORDER_SQL, ORDER_DELIVERY_DAY_SQL, ORDER_EXPECTED_CASH_SQL};
use crate::shortfalls;

const TRANSACTION_COLUMNS: &str = "id, order_id, deliveryman_id, collection_date,
    expected_amount, confirmed_amount, status, handover_id";

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<CashTransaction> {
    let status: String = row.get(6)?;
    Ok(CashTransaction {
        id: row.get(0)?,
        order_id: row.get(1)?,
        deliveryman_id: row.get(2)?,
        collection_date: row.get(3)?,
        expected_amount: row.get(4)?,
        confirmed_amount: row.get(5)?,
        status: CashTransactionStatus::parse(&status).unwrap_or(CashTransactionStatus::Pending),
        handover_id: row.get(7)?,
    })
}

/// Create the pending transactions for a deliveryman's day. Orders already
/// registered are left alone, so calling this again only picks up new
/// deliveries.
pub fn register_collections(
    conn: &Connection,
    deliveryman_id: &str,
    date: &str,
) -> Result<Vec<CashTransaction>> {
    let day = parse_date(date)
        .map(format_date)
        .ok_or_else(|| LedgerError::validation(format!("Invalid collection date: {date}")))?;
    deliverymen::get_deliveryman(conn, deliveryman_id)?;

    let created = conn.execute(
        &format!(
            "INSERT OR IGNORE INTO cash_transactions (id, order_id, deliveryman_id,
                collection_date, expected_amount, status, created_at)
             SELECT lower(hex(randomblob(16))), id, deliveryman_id, ?2,
                    round({ORDER_EXPECTED_CASH_SQL}, 2), 'pending', ?3
             FROM orders
             WHERE deliveryman_id = ?1
               AND {COLLECTABLE_ORDER_SQL}
               AND {ORDER_DELIVERY_DAY_SQL} = ?2"
        ),
        params![deliveryman_id, day, Utc::now().to_rfc3339()],
    )?;

    if created > 0 {
        info!(
            deliveryman_id = %deliveryman_id,
            date = %day,
            created,
            "Cash collections registered"
        );
    }
    list_for_day(conn, deliveryman_id, &day)
}

pub fn get_transaction(conn: &Connection, transaction_id: &str) -> Result<CashTransaction> {
    conn.query_row(
        &format!("SELECT {TRANSACTION_COLUMNS} FROM cash_transactions WHERE id = ?1"),
        params![transaction_id],
        transaction_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            LedgerError::not_found(format!("Cash transaction not found: {transaction_id}"))
        }
        other => other.into(),
    })
}

pub fn list_for_day(
    conn: &Connection,
    deliveryman_id: &str,
    date: &str,
) -> Result<Vec<CashTransaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM cash_transactions
         WHERE deliveryman_id = ?1 AND collection_date = ?2
         ORDER BY created_at, order_id"
    ))?;
    let rows = stmt
        .query_map(params![deliveryman_id, date], transaction_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get_handover(conn: &Connection, handover_id: &str) -> Result<CashHandover> {
    conn.query_row(
        "SELECT id, deliveryman_id, kind, expected_total, paid_amount, validated_by, created_at
         FROM cash_handovers WHERE id = ?1",
        params![handover_id],
        |row| {
            let kind: String = row.get(2)?;
            Ok(CashHandover {
                id: row.get(0)?,
                deliveryman_id: row.get(1)?,
                kind: HandoverKind::parse(&kind).unwrap_or(HandoverKind::Single),
                expected_total: row.get(3)?,
                paid_amount: row.get(4)?,
                validated_by: row.get(5)?,
                created_at: row.get(6)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            LedgerError::not_found(format!("Cash handover not found: {handover_id}"))
        }
        other => other.into(),
    })
}

/// Load a transaction that is still awaiting confirmation.
fn pending_transaction(conn: &Connection, transaction_id: &str) -> Result<CashTransaction> {
    let tx = get_transaction(conn, transaction_id)?;
    if tx.status != CashTransactionStatus::Pending {
        warn!(transaction_id = %transaction_id, "Confirmation of a confirmed transaction rejected");
        return Err(LedgerError::not_found(format!(
            "No pending cash transaction with id {transaction_id}"
        )));
    }
    Ok(tx)
}

fn insert_handover(
    conn: &Connection,
    deliveryman_id: &str,
    kind: HandoverKind,
    expected_total: f64,
    paid_amount: f64,
    validator_user_id: &str,
    now: &str,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO cash_handovers (id, deliveryman_id, kind, expected_total, paid_amount,
            validated_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            deliveryman_id,
            kind.as_str(),
            expected_total,
            paid_amount,
            validator_user_id,
            now
        ],
    )?;
    Ok(id)
}

fn mark_confirmed(
    conn: &Connection,
    transaction_id: &str,
    confirmed_amount: f64,
    handover_id: &str,
    now: &str,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE cash_transactions SET
            status = 'confirmed',
            confirmed_amount = ?1,
            handover_id = ?2,
            confirmed_at = ?3
         WHERE id = ?4 AND status = 'pending'",
        params![confirmed_amount, handover_id, now, transaction_id],
    )?;
    if changed != 1 {
        return Err(LedgerError::not_found(format!(
            "No pending cash transaction with id {transaction_id}"
        )));
    }
    Ok(())
}

/// Confirm one transaction with the cash actually handed over. A short
/// amount is added to the deliveryman's open shortfall for that day.
pub fn confirm_single(
    conn: &Connection,
    transaction_id: &str,
    paid_amount: f64,
    validator_user_id: &str,
) -> Result<ConfirmationOutcome> {
    let paid_amount = require_positive(paid_amount, "paidAmount")?;

    immediate_transaction(conn, |conn| {
        let tx = pending_transaction(conn, transaction_id)?;
        let now = Utc::now().to_rfc3339();

        let handover_id = insert_handover(
            conn,
            &tx.deliveryman_id,
            HandoverKind::Single,
            tx.expected_amount,
            paid_amount,
            validator_user_id,
            &now,
        )?;
        mark_confirmed(conn, &tx.id, paid_amount, &handover_id, &now)?;

        let missing = round2(tx.expected_amount - paid_amount);
        let shortfall_id = if missing > EPSILON {
            Some(shortfalls::record(
                conn,
                &tx.deliveryman_id,
                &tx.collection_date,
                missing,
                &handover_id,
                true,
            )?)
        } else {
            None
        };

        info!(
            handover_id = %handover_id,
            transaction_id = %tx.id,
            deliveryman_id = %tx.deliveryman_id,
            expected = %tx.expected_amount,
            paid = %paid_amount,
            validated_by = %validator_user_id,
            "Cash transaction confirmed"
        );

        Ok(ConfirmationOutcome {
            handover_id,
            deliveryman_id: tx.deliveryman_id,
            transaction_ids: vec![tx.id],
            expected_total: tx.expected_amount,
            paid_amount,
            shortfall_amount: if shortfall_id.is_some() { missing } else { 0.0 },
            shortfall_id,
        })
    })
}

/// Confirm several transactions of one deliveryman against a single cash
/// amount. Either every listed transaction is confirmed or none is. Any
/// amount missing becomes exactly one new shortfall.
pub fn confirm_batch(
    conn: &Connection,
    transaction_ids: &[String],
    total_paid_amount: f64,
    validator_user_id: &str,
) -> Result<ConfirmationOutcome> {
    if transaction_ids.is_empty() {
        return Err(LedgerError::validation("No transactions to confirm"));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = transaction_ids.iter().find(|id| !seen.insert(id.as_str())) {
        return Err(LedgerError::validation(format!(
            "Transaction {dup} listed twice"
        )));
    }
    let total_paid_amount = require_positive(total_paid_amount, "totalPaidAmount")?;

    immediate_transaction(conn, |conn| {
        let txs = transaction_ids
            .iter()
            .map(|id| pending_transaction(conn, id))
            .collect::<Result<Vec<_>>>()?;

        let deliveryman_id = txs[0].deliveryman_id.clone();
        if let Some(other) = txs.iter().find(|tx| tx.deliveryman_id != deliveryman_id) {
            return Err(LedgerError::validation(format!(
                "Transaction {} belongs to another deliveryman",
                other.id
            )));
        }

        let expected: Vec<f64> = txs.iter().map(|tx| tx.expected_amount).collect();
        let expected_total = round2(expected.iter().sum::<f64>());
        let now = Utc::now().to_rfc3339();

        let handover_id = insert_handover(
            conn,
            &deliveryman_id,
            HandoverKind::Batch,
            expected_total,
            total_paid_amount,
            validator_user_id,
            &now,
        )?;
        for (tx, part) in txs.iter().zip(allocate(total_paid_amount, &expected)) {
            mark_confirmed(conn, &tx.id, part, &handover_id, &now)?;
        }

        let missing = round2(expected_total - total_paid_amount);
        let shortfall_id = if missing > EPSILON {
            let latest_day = txs
                .iter()
                .map(|tx| tx.collection_date.as_str())
                .max()
                .unwrap_or_default();
            Some(shortfalls::record(
                conn,
                &deliveryman_id,
                latest_day,
                missing,
                &handover_id,
                false,
            )?)
        } else {
            None
        };

        info!(
            handover_id = %handover_id,
            deliveryman_id = %deliveryman_id,
            count = txs.len(),
            expected = %expected_total,
            paid = %total_paid_amount,
            validated_by = %validator_user_id,
            "Cash batch confirmed"
        );

        Ok(ConfirmationOutcome {
            handover_id,
            deliveryman_id,
            transaction_ids: txs.into_iter().map(|tx| tx.id).collect(),
            expected_total,
            paid_amount: total_paid_amount,
            shortfall_amount: if shortfall_id.is_some() { missing } else { 0.0 },
            shortfall_id,
        })
    })
}
