//! End-of-day cash closing for cashiers.
//!
//! One immutable row per (cashier, day). The expected amount comes from the
//! cashier domain; this module stores it with the counted cash and the
//! difference. Rows are never edited or deleted (triggers enforce it).

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::immediate_transaction;
use crate::error::{LedgerError, Result};
use crate::models::CashClosing;
use crate::money::{require_non_negative, round2};
use crate::period::{format_date, parse_date};

const CLOSING_COLUMNS: &str = "id, closed_by, closing_date, expected_cash, actual_cash_counted,
    difference, comment, created_at";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashClosingRequest {
    pub date: String,
    pub expected_cash: f64,
    #[serde(alias = "actualCashCounted", alias = "actual_cash_counted")]
    pub actual_cash: f64,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(alias = "user_id")]
    pub user_id: String,
}

fn closing_from_row(row: &Row<'_>) -> rusqlite::Result<CashClosing> {
    Ok(CashClosing {
        id: row.get(0)?,
        closed_by: row.get(1)?,
        closing_date: row.get(2)?,
        expected_cash: row.get(3)?,
        actual_cash_counted: row.get(4)?,
        difference: row.get(5)?,
        comment: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Append the day's closing. A second closing for the same cashier and day
/// is refused.
pub fn close_cash(conn: &Connection, req: &CashClosingRequest) -> Result<CashClosing> {
    let closing_date = parse_date(&req.date)
        .map(format_date)
        .ok_or_else(|| LedgerError::validation(format!("Invalid closing date: {:?}", req.date)))?;
    if !req.expected_cash.is_finite() {
        return Err(LedgerError::validation("expectedCash must be a number"));
    }
    let expected_cash = round2(req.expected_cash);
    let actual_cash = require_non_negative(req.actual_cash, "actualCash")?;
    let user_id = req.user_id.trim();
    if user_id.is_empty() {
        return Err(LedgerError::validation("Missing userId"));
    }
    let comment = req
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let closing = immediate_transaction(conn, |conn| {
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM cash_closings WHERE closed_by = ?1 AND closing_date = ?2",
                params![user_id, closing_date],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(existing_id) = existing {
            warn!(user_id = %user_id, date = %closing_date, "Duplicate cash closing rejected");
            return Err(LedgerError::BusinessRule(format!(
                "Cash already closed for {closing_date} ({existing_id})"
            )));
        }

        let id = Uuid::new_v4().to_string();
        let difference = round2(actual_cash - expected_cash);
        conn.execute(
            "INSERT INTO cash_closings (id, closed_by, closing_date, expected_cash,
                actual_cash_counted, difference, comment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                user_id,
                closing_date,
                expected_cash,
                actual_cash,
                difference,
                comment,
                Utc::now().to_rfc3339(),
            ],
        )?;

        conn.query_row(
            &format!("SELECT {CLOSING_COLUMNS} FROM cash_closings WHERE id = ?1"),
            params![id],
            closing_from_row,
        )
        .map_err(LedgerError::from)
    })?;

    info!(
        closing_id = %closing.id,
        user_id = %closing.closed_by,
        date = %closing.closing_date,
        difference = %closing.difference,
        "Cash closed"
    );
    Ok(closing)
}

/// Closings recorded by a cashier, newest first.
pub fn history(conn: &Connection, user_id: &str) -> Result<Vec<CashClosing>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CLOSING_COLUMNS} FROM cash_closings
         WHERE closed_by = ?1
         ORDER BY closing_date DESC, created_at DESC"
    ))?;
    let rows = stmt
        .query_map(params![user_id], closing_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Cash a cashier should hold for `date`: handovers they validated minus
/// the expenses they paid out that day.
pub fn confirmed_cash_for_cashier(conn: &Connection, user_id: &str, date: &str) -> Result<f64> {
    let day = parse_date(date)
        .map(format_date)
        .ok_or_else(|| LedgerError::validation(format!("Invalid date: {date}")))?;

    let received: f64 = conn.query_row(
        "SELECT COALESCE(SUM(paid_amount), 0) FROM cash_handovers
         WHERE validated_by = ?1 AND substr(created_at, 1, 10) = ?2",
        params![user_id, day],
        |row| row.get(0),
    )?;
    let paid_out: f64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM daily_expenses
         WHERE created_by = ?1 AND expense_date = ?2",
        params![user_id, day],
        |row| row.get(0),
    )?;
    Ok(round2(received - paid_out))
}
