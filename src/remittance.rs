//! Shop payouts.
//!
//! A payout is all-or-nothing: the whole current balance for a window is paid
//! in one remittance. In the same transaction the window's handled orders and
//! every debt the balance deducted are stamped with the remittance, so no
//! later window can count them again.

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::immediate_transaction;
use crate::debts;
use crate::error::{LedgerError, Result};
use crate::ledger;
use crate::orders;
use crate::models::{PaymentOperator, Remittance, RemittanceStatus};
use crate::money::EPSILON;
use crate::period::{format_date, DateRange};

const REMITTANCE_COLUMNS: &str = "id, shop_id, amount, payment_date, payment_operator, status,
    transaction_id, comment, user_id, period_start, period_end";

fn remittance_from_row(row: &Row<'_>) -> rusqlite::Result<Remittance> {
    let status: String = row.get(5)?;
    Ok(Remittance {
        id: row.get(0)?,
        shop_id: row.get(1)?,
        amount: row.get(2)?,
        payment_date: row.get(3)?,
        payment_operator: row
            .get::<_, Option<String>>(4)?
            .as_deref()
            .and_then(PaymentOperator::parse),
        status: RemittanceStatus::parse(&status).unwrap_or(RemittanceStatus::Pending),
        transaction_id: row.get(6)?,
        comment: row.get(7)?,
        user_id: row.get(8)?,
        period_start: row.get(9)?,
        period_end: row.get(10)?,
    })
}

/// Pay the shop everything it is owed for `range`.
///
/// The balance is recomputed under the write lock, so two validators racing
/// on the same shop cannot both pay it. Fails with `NothingToPay` and writes
/// nothing when the balance is not above the tolerance. Debts the balance did
/// not deduct are left for the next payout.
pub fn pay_shop_in_full(
    conn: &Connection,
    shop_id: &str,
    range: &DateRange,
    validator_user_id: &str,
) -> Result<Remittance> {
    let remittance = immediate_transaction(conn, |conn| {
        let balance = ledger::compute_shop_balance(conn, shop_id, range)?;
        if balance.amount_to_remit <= EPSILON {
            warn!(
                shop_id = %shop_id,
                amount_to_remit = %balance.amount_to_remit,
                "Payout rejected, nothing to pay"
            );
            return Err(LedgerError::NothingToPay(format!(
                "Shop {} has {:.2} to remit for {}..{}",
                balance.shop_name,
                balance.amount_to_remit,
                balance.period_start,
                balance.period_end
            )));
        }

        let shop = crate::shops::get_shop(conn, shop_id)?;
        let id = Uuid::new_v4().to_string();
        let transaction_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let paid_at = now.to_rfc3339();

        conn.execute(
            "INSERT INTO remittances (id, shop_id, amount, payment_date, payment_operator,
                status, transaction_id, comment, user_id, period_start, period_end, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'paid', ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                shop_id,
                balance.amount_to_remit,
                format_date(now.date_naive()),
                shop.payment_operator.as_ref().map(|o| o.as_str().to_string()),
                transaction_id,
                shop.payment_name
                    .as_deref()
                    .map(|name| format!("Paid to {name}")),
                validator_user_id,
                balance.period_start,
                balance.period_end,
                paid_at,
            ],
        )?;

        let orders_settled = orders::settle_for_payout(conn, shop_id, range, &id)?;
        let debts_settled = debts::settle_deducted(conn, shop_id, range, &id, &paid_at)?;

        info!(
            remittance_id = %id,
            shop_id = %shop_id,
            amount = %balance.amount_to_remit,
            orders_settled,
            debts_settled,
            validated_by = %validator_user_id,
            "Shop paid in full"
        );
        get_remittance(conn, &id)
    })?;

    Ok(remittance)
}

pub fn get_remittance(conn: &Connection, remittance_id: &str) -> Result<Remittance> {
    conn.query_row(
        &format!("SELECT {REMITTANCE_COLUMNS} FROM remittances WHERE id = ?1"),
        params![remittance_id],
        remittance_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            LedgerError::not_found(format!("Remittance not found: {remittance_id}"))
        }
        other => other.into(),
    })
}

/// Payout history for a shop, newest first.
pub fn list_for_shop(conn: &Connection, shop_id: &str) -> Result<Vec<Remittance>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REMITTANCE_COLUMNS} FROM remittances
         WHERE shop_id = ?1
         ORDER BY created_at DESC, id"
    ))?;
    let rows = stmt
        .query_map(params![shop_id], remittance_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
