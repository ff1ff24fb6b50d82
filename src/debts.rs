//! Shop debts: fees and charges a shop owes the platform.
//!
//! Storage fees are only ever created by [`crate::storage_fees`]; manual
//! entry covers the other types. A debt moves from `pending` to `paid` only
//! when a shop payout settles it.

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{Debt, DebtStatus, DebtType};
use crate::money::require_positive;
use crate::period::{format_date, parse_date, DateRange};

const DEBT_COLUMNS: &str =
    "id, shop_id, amount, type, status, comment, creation_date, remittance_id, created_at";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDebt {
    pub shop_id: String,
    #[serde(rename = "type", alias = "debt_type")]
    pub debt_type: String,
    pub amount: f64,
    #[serde(default)]
    pub comment: Option<String>,
    /// Custom `YYYY-MM-DD` the debt is dated to, instead of today.
    #[serde(default, alias = "creation_date")]
    pub creation_date: Option<String>,
}

pub(crate) fn debt_from_row(row: &Row<'_>) -> rusqlite::Result<Debt> {
    let debt_type: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(Debt {
        id: row.get(0)?,
        shop_id: row.get(1)?,
        amount: row.get(2)?,
        debt_type: DebtType::parse(&debt_type).unwrap_or(DebtType::Other),
        status: DebtStatus::parse(&status).unwrap_or(DebtStatus::Pending),
        comment: row.get(5)?,
        creation_date: row.get(6)?,
        remittance_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Manual admin entry of a debt.
pub fn create_debt(conn: &Connection, new: &NewDebt, user_id: &str) -> Result<Debt> {
    let debt_type = DebtType::parse(&new.debt_type)
        .ok_or_else(|| LedgerError::validation(format!("Invalid debt type: {:?}", new.debt_type)))?;
    if debt_type == DebtType::StorageFee {
        return Err(LedgerError::validation(
            "Storage fees are generated, not entered manually",
        ));
    }
    let amount = require_positive(new.amount, "amount")?;
    let creation_date = match new.creation_date.as_deref() {
        None => None,
        Some(raw) => Some(
            parse_date(raw)
                .map(format_date)
                .ok_or_else(|| LedgerError::validation(format!("Invalid creation date: {raw}")))?,
        ),
    };
    crate::shops::get_shop(conn, &new.shop_id)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO debts (id, shop_id, amount, type, status, comment, creation_date,
            created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8)",
        params![
            id,
            new.shop_id,
            amount,
            debt_type.as_str(),
            new.comment,
            creation_date,
            user_id,
            Utc::now().to_rfc3339(),
        ],
    )?;

    info!(
        debt_id = %id,
        shop_id = %new.shop_id,
        debt_type = %debt_type,
        amount = %amount,
        "Debt recorded"
    );
    get_debt(conn, &id)
}

pub fn get_debt(conn: &Connection, debt_id: &str) -> Result<Debt> {
    conn.query_row(
        &format!("SELECT {DEBT_COLUMNS} FROM debts WHERE id = ?1"),
        params![debt_id],
        debt_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            LedgerError::not_found(format!("Debt not found: {debt_id}"))
        }
        other => other.into(),
    })
}

pub fn list_pending(conn: &Connection, shop_id: &str) -> Result<Vec<Debt>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DEBT_COLUMNS} FROM debts
         WHERE shop_id = ?1 AND status = 'pending'
         ORDER BY COALESCE(creation_date, substr(created_at, 1, 10)), created_at"
    ))?;
    let debts = stmt
        .query_map(params![shop_id], debt_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(debts)
}

/// Mark paid exactly the debts a window's balance deducted: pending debts
/// dated before `range.start` and storage fees dated inside the window. Other
/// debts dated inside or after the window stay pending for a later payout.
/// Returns the number of rows.
pub(crate) fn settle_deducted(
    conn: &Connection,
    shop_id: &str,
    range: &DateRange,
    remittance_id: &str,
    paid_at: &str,
) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE debts SET status = 'paid', remittance_id = ?1, paid_at = ?2
         WHERE shop_id = ?3
           AND status = 'pending'
           AND (
                COALESCE(creation_date, substr(created_at, 1, 10)) < ?4
             OR (type = 'storage_fee'
                 AND COALESCE(creation_date, substr(created_at, 1, 10)) BETWEEN ?4 AND ?5)
           )",
        params![
            remittance_id,
            paid_at,
            shop_id,
            range.start_str(),
            range.end_str()
        ],
    )?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup() -> db::DbState {
        let state = db::test_state();
        {
            let conn = state.lock().unwrap();
            conn.execute("INSERT INTO shops (id, name) VALUES ('s1', 'Shop 1')", [])
                .unwrap();
        }
        state
    }

    fn new_debt(debt_type: &str, amount: f64) -> NewDebt {
        NewDebt {
            shop_id: "s1".into(),
            debt_type: debt_type.into(),
            amount,
            comment: Some("colis endommagé".into()),
            creation_date: Some("2024-03-01".into()),
        }
    }

    #[test]
    fn test_create_manual_debt() {
        let state = setup();
        let conn = state.lock().unwrap();
        let debt = create_debt(&conn, &new_debt("expedition", 1500.0), "admin-1").unwrap();
        assert_eq!(debt.debt_type, DebtType::Expedition);
        assert_eq!(debt.status, DebtStatus::Pending);
        assert_eq!(debt.creation_date.as_deref(), Some("2024-03-01"));
        assert_eq!(list_pending(&conn, "s1").unwrap().len(), 1);
    }

    #[test]
    fn test_create_debt_rejections() {
        let state = setup();
        let conn = state.lock().unwrap();
        assert!(matches!(
            create_debt(&conn, &new_debt("storage_fee", 100.0), "admin-1"),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            create_debt(&conn, &new_debt("", 100.0), "admin-1"),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            create_debt(&conn, &new_debt("other", -3.0), "admin-1"),
            Err(LedgerError::Validation(_))
        ));
        let mut orphan = new_debt("other", 10.0);
        orphan.shop_id = "nope".into();
        assert!(matches!(
            create_debt(&conn, &orphan, "admin-1"),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_settle_deducted_matches_balance_deductions() {
        let state = setup();
        let conn = state.lock().unwrap();
        conn.execute_batch(
            "INSERT INTO remittances (id, shop_id, amount, payment_date, status, transaction_id,
                                      user_id, period_start, period_end)
             VALUES ('r1', 's1', 1000, '2024-03-05', 'paid', 'tx-1', 'u1',
                     '2024-03-05', '2024-03-05');
             INSERT INTO debts (id, shop_id, amount, type, creation_date)
             VALUES ('old', 's1', 800, 'other', '2024-03-01'),
                    ('fee', 's1', 150, 'storage_fee', '2024-03-05'),
                    ('exp', 's1', 300, 'expedition', '2024-03-05'),
                    ('next', 's1', 150, 'storage_fee', '2024-03-06');",
        )
        .unwrap();

        let range = DateRange::parse("2024-03-05", "2024-03-05").unwrap();
        let n = settle_deducted(&conn, "s1", &range, "r1", "2024-03-05T18:00:00Z").unwrap();
        assert_eq!(n, 2);

        let pending: Vec<String> = list_pending(&conn, "s1")
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(pending, vec!["exp".to_string(), "next".to_string()]);
        assert_eq!(get_debt(&conn, "old").unwrap().remittance_id.as_deref(), Some("r1"));
        assert_eq!(get_debt(&conn, "fee").unwrap().status, DebtStatus::Paid);
        assert_eq!(get_debt(&conn, "exp").unwrap().remittance_id, None);
    }
}
