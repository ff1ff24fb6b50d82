//! Deliverymen and the expenses they declare against a day's collections.

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::info;
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{DailyExpense, Deliveryman};
use crate::money::require_positive;
use crate::period::{format_date, parse_date};

pub fn create_deliveryman(conn: &Connection, name: &str) -> Result<Deliveryman> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("Deliveryman name is required"));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO deliverymen (id, name, active, created_at) VALUES (?1, ?2, 1, ?3)",
        params![id, name, Utc::now().to_rfc3339()],
    )?;
    info!(deliveryman_id = %id, name = %name, "Deliveryman created");
    Ok(Deliveryman {
        id,
        name: name.to_string(),
        active: true,
    })
}

pub fn get_deliveryman(conn: &Connection, deliveryman_id: &str) -> Result<Deliveryman> {
    conn.query_row(
        "SELECT id, name, active FROM deliverymen WHERE id = ?1",
        params![deliveryman_id],
        |row| {
            Ok(Deliveryman {
                id: row.get(0)?,
                name: row.get(1)?,
                active: row.get::<_, i64>(2)? != 0,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            LedgerError::not_found(format!("Deliveryman not found: {deliveryman_id}"))
        }
        other => other.into(),
    })
}

/// Deliverymen with at least one collectable order on `date`.
pub fn active_on(conn: &Connection, date: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT deliveryman_id FROM orders
         WHERE deliveryman_id IS NOT NULL
           AND {}
           AND {} = ?1
         ORDER BY deliveryman_id",
        crate::readers::COLLECTABLE_ORDER_SQL,
        crate::readers::ORDER_DELIVERY_DAY_SQL,
    ))?;
    let ids = stmt
        .query_map(params![date], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Record an expense (fuel, parking...) paid out of the day's collections.
pub fn declare_expense(
    conn: &Connection,
    deliveryman_id: &str,
    date: &str,
    amount: f64,
    description: Option<&str>,
    user_id: &str,
) -> Result<DailyExpense> {
    let amount = require_positive(amount, "amount")?;
    let expense_date = parse_date(date)
        .map(format_date)
        .ok_or_else(|| LedgerError::validation(format!("Invalid expense date: {date}")))?;
    get_deliveryman(conn, deliveryman_id)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO daily_expenses (id, deliveryman_id, expense_date, amount, description,
            created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            deliveryman_id,
            expense_date,
            amount,
            description,
            user_id,
            Utc::now().to_rfc3339()
        ],
    )?;

    info!(
        deliveryman_id = %deliveryman_id,
        date = %expense_date,
        amount = %amount,
        "Daily expense declared"
    );

    Ok(DailyExpense {
        id,
        deliveryman_id: deliveryman_id.to_string(),
        expense_date,
        amount,
        description: description.map(String::from),
        created_by: user_id.to_string(),
    })
}
