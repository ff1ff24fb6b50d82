//! Order records feeding the readers.
//!
//! Orders are owned by the dispatch domain; this module covers the writes the
//! back office needs to keep them consistent: recording, deliveryman
//! assignment and status changes up to a terminal status, after which the
//! order is frozen.

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{Order, OrderStatus, PaymentStatus, PaymentType};
use crate::money::require_non_negative;
use crate::period::{format_date, parse_date, DateRange};

const ORDER_COLUMNS: &str = "id, shop_id, deliveryman_id, article_amount, delivery_fee,
    amount_received, payment_status, status, payment_type, created_at, delivery_date, remittance_id";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub shop_id: String,
    #[serde(default)]
    pub deliveryman_id: Option<String>,
    pub article_amount: f64,
    pub delivery_fee: f64,
    #[serde(default)]
    pub payment_type: Option<String>,
    /// Creation timestamp override for imports; defaults to now.
    #[serde(default)]
    pub created_at: Option<String>,
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    let payment_status: String = row.get(6)?;
    let status: String = row.get(7)?;
    let payment_type: String = row.get(8)?;
    Ok(Order {
        id: row.get(0)?,
        shop_id: row.get(1)?,
        deliveryman_id: row.get(2)?,
        article_amount: row.get(3)?,
        delivery_fee: row.get(4)?,
        amount_received: row.get(5)?,
        payment_status: PaymentStatus::parse(&payment_status).unwrap_or(PaymentStatus::Pending),
        status: OrderStatus::parse(&status).unwrap_or(OrderStatus::Pending),
        payment_type: PaymentType::parse(&payment_type).unwrap_or(PaymentType::Cod),
        created_at: row.get(9)?,
        delivery_date: row.get(10)?,
        remittance_id: row.get(11)?,
    })
}

pub fn record_order(conn: &Connection, new: &NewOrder) -> Result<Order> {
    let article_amount = require_non_negative(new.article_amount, "articleAmount")?;
    let delivery_fee = require_non_negative(new.delivery_fee, "deliveryFee")?;
    let payment_type = match new.payment_type.as_deref() {
        None => PaymentType::Cod,
        Some(raw) => PaymentType::parse(raw)
            .ok_or_else(|| LedgerError::validation(format!("Invalid payment type: {raw}")))?,
    };

    let shop_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM shops WHERE id = ?1)",
        params![new.shop_id],
        |row| row.get(0),
    )?;
    if !shop_exists {
        return Err(LedgerError::not_found(format!(
            "Shop not found: {}",
            new.shop_id
        )));
    }
    if let Some(deliveryman_id) = &new.deliveryman_id {
        ensure_deliveryman(conn, deliveryman_id)?;
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let created_at = new.created_at.clone().unwrap_or_else(|| now.clone());

    conn.execute(
        "INSERT INTO orders (id, shop_id, deliveryman_id, article_amount, delivery_fee,
            payment_type, status, payment_status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 'pending', ?7, ?8)",
        params![
            id,
            new.shop_id,
            new.deliveryman_id,
            article_amount,
            delivery_fee,
            payment_type.as_str(),
            created_at,
            now,
        ],
    )?;

    info!(order_id = %id, shop_id = %new.shop_id, "Order recorded");
    get_order(conn, &id)
}

pub fn get_order(conn: &Connection, order_id: &str) -> Result<Order> {
    conn.query_row(
        &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
        params![order_id],
        order_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            LedgerError::not_found(format!("Order not found: {order_id}"))
        }
        other => other.into(),
    })
}

fn ensure_deliveryman(conn: &Connection, deliveryman_id: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM deliverymen WHERE id = ?1)",
        params![deliveryman_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(LedgerError::not_found(format!(
            "Deliveryman not found: {deliveryman_id}"
        )));
    }
    Ok(())
}

fn ensure_not_terminal(order: &Order) -> Result<()> {
    if order.status.is_terminal() {
        warn!(order_id = %order.id, status = %order.status, "Rejected change to terminal order");
        return Err(LedgerError::BusinessRule(format!(
            "Order {} is already {} and can no longer change",
            order.id, order.status
        )));
    }
    Ok(())
}

pub fn assign_deliveryman(conn: &Connection, order_id: &str, deliveryman_id: &str) -> Result<Order> {
    let order = get_order(conn, order_id)?;
    ensure_not_terminal(&order)?;
    ensure_deliveryman(conn, deliveryman_id)?;

    conn.execute(
        "UPDATE orders SET deliveryman_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![deliveryman_id, Utc::now().to_rfc3339(), order_id],
    )?;
    info!(order_id = %order_id, deliveryman_id = %deliveryman_id, "Order assigned");
    get_order(conn, order_id)
}

/// Outcome details that accompany a status change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: String,
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Cash the deliveryman kept on a failed delivery.
    #[serde(default)]
    pub amount_received: Option<f64>,
    /// `YYYY-MM-DD`; defaults to today for terminal statuses.
    #[serde(default)]
    pub delivery_date: Option<String>,
}

pub fn update_status(conn: &Connection, order_id: &str, change: &StatusChange) -> Result<Order> {
    let status = OrderStatus::parse(&change.status)
        .ok_or_else(|| LedgerError::validation(format!("Invalid order status: {}", change.status)))?;
    let order = get_order(conn, order_id)?;
    ensure_not_terminal(&order)?;

    let payment_status = match change.payment_status.as_deref() {
        None => order.payment_status,
        Some(raw) => PaymentStatus::parse(raw)
            .ok_or_else(|| LedgerError::validation(format!("Invalid payment status: {raw}")))?,
    };
    let amount_received = match change.amount_received {
        None => order.amount_received,
        Some(amount) => require_non_negative(amount, "amountReceived")?,
    };
    if amount_received > 0.0 && status != OrderStatus::FailedDelivery {
        return Err(LedgerError::validation(
            "amountReceived only applies to failed deliveries",
        ));
    }
    let delivery_date = match change.delivery_date.as_deref() {
        Some(raw) => Some(
            parse_date(raw)
                .map(format_date)
                .ok_or_else(|| LedgerError::validation(format!("Invalid delivery date: {raw}")))?,
        ),
        None if status.is_terminal() => Some(format_date(Utc::now().date_naive())),
        None => order.delivery_date.clone(),
    };

    conn.execute(
        "UPDATE orders SET
            status = ?1,
            payment_status = ?2,
            amount_received = ?3,
            delivery_date = ?4,
            updated_at = ?5
         WHERE id = ?6",
        params![
            status.as_str(),
            payment_status.as_str(),
            amount_received,
            delivery_date,
            Utc::now().to_rfc3339(),
            order_id,
        ],
    )?;

    info!(order_id = %order_id, from = %order.status, to = %status, "Order status changed");
    get_order(conn, order_id)
}

/// Stamp the shop's open handled orders in `range` with the payout that
/// settled them. Stamped orders drop out of every later shop balance.
pub(crate) fn settle_for_payout(
    conn: &Connection,
    shop_id: &str,
    range: &DateRange,
    remittance_id: &str,
) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE orders SET remittance_id = ?1, updated_at = datetime('now')
         WHERE shop_id = ?2
           AND remittance_id IS NULL
           AND status IN ('delivered', 'failed_delivery')
           AND substr(created_at, 1, 10) BETWEEN ?3 AND ?4",
        params![remittance_id, shop_id, range.start_str(), range.end_str()],
    )?;
    Ok(changed)
}
