//! Shop records as seen by the reconciliation engine.
//!
//! Shops belong to the admin domain. The engine reads their billing
//! configuration and only ever writes the payment destination fields.

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{PaymentOperator, Shop, ShopStatus};
use crate::money::require_non_negative;

const SHOP_COLUMNS: &str = "id, name, bill_packaging, packaging_price, bill_storage,
    storage_price, payment_name, phone_number_for_payment, payment_operator, status, created_at";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShop {
    pub name: String,
    #[serde(default)]
    pub bill_packaging: bool,
    #[serde(default)]
    pub packaging_price: f64,
    #[serde(default)]
    pub bill_storage: bool,
    #[serde(default)]
    pub storage_price: f64,
    #[serde(default)]
    pub payment_name: Option<String>,
    #[serde(default)]
    pub phone_number_for_payment: Option<String>,
    #[serde(default)]
    pub payment_operator: Option<String>,
}

fn shop_from_row(row: &Row<'_>) -> rusqlite::Result<Shop> {
    let status: String = row.get(9)?;
    Ok(Shop {
        id: row.get(0)?,
        name: row.get(1)?,
        bill_packaging: row.get::<_, i64>(2)? != 0,
        packaging_price: row.get(3)?,
        bill_storage: row.get::<_, i64>(4)? != 0,
        storage_price: row.get(5)?,
        payment_name: row.get(6)?,
        phone_number_for_payment: row.get(7)?,
        payment_operator: row
            .get::<_, Option<String>>(8)?
            .as_deref()
            .and_then(PaymentOperator::parse),
        status: ShopStatus::parse(&status).unwrap_or(ShopStatus::Inactive),
        created_at: row.get(10)?,
    })
}

pub fn create_shop(conn: &Connection, new: &NewShop) -> Result<Shop> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("Shop name is required"));
    }
    let packaging_price = require_non_negative(new.packaging_price, "packagingPrice")?;
    let storage_price = require_non_negative(new.storage_price, "storagePrice")?;
    let operator = new
        .payment_operator
        .as_deref()
        .and_then(PaymentOperator::parse);

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO shops (id, name, bill_packaging, packaging_price, bill_storage,
            storage_price, payment_name, phone_number_for_payment, payment_operator,
            status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'active', ?10, ?10)",
        params![
            id,
            name,
            new.bill_packaging,
            packaging_price,
            new.bill_storage,
            storage_price,
            new.payment_name,
            new.phone_number_for_payment,
            operator.as_ref().map(|o| o.as_str().to_string()),
            now,
        ],
    )?;

    info!(shop_id = %id, name = %name, "Shop created");
    get_shop(conn, &id)
}

pub fn get_shop(conn: &Connection, shop_id: &str) -> Result<Shop> {
    conn.query_row(
        &format!("SELECT {SHOP_COLUMNS} FROM shops WHERE id = ?1"),
        params![shop_id],
        shop_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            LedgerError::not_found(format!("Shop not found: {shop_id}"))
        }
        other => other.into(),
    })
}

/// Active shops ordered by name, optionally filtered by a name fragment.
pub fn list_active_shops(conn: &Connection, search: Option<&str>) -> Result<Vec<Shop>> {
    let pattern = format!("%{}%", search.unwrap_or("").trim().to_lowercase());
    let mut stmt = conn.prepare(&format!(
        "SELECT {SHOP_COLUMNS} FROM shops
         WHERE status = 'active' AND lower(name) LIKE ?1
         ORDER BY name, id"
    ))?;
    let shops = stmt
        .query_map(params![pattern], shop_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(shops)
}

/// Change where the shop's payouts go.
pub fn update_payment_destination(
    conn: &Connection,
    shop_id: &str,
    payment_name: &str,
    phone_number: &str,
    operator: &str,
) -> Result<Shop> {
    let payment_name = payment_name.trim();
    let phone: String = phone_number
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    if payment_name.is_empty() {
        return Err(LedgerError::validation("Payment name is required"));
    }
    if phone.chars().filter(char::is_ascii_digit).count() < 6 {
        return Err(LedgerError::validation(format!(
            "Invalid payment phone number: {phone_number}"
        )));
    }
    let operator = PaymentOperator::parse(operator)
        .ok_or_else(|| LedgerError::validation("Payment operator is required"))?;

    let changed = conn.execute(
        "UPDATE shops SET
            payment_name = ?1,
            phone_number_for_payment = ?2,
            payment_operator = ?3,
            updated_at = ?4
         WHERE id = ?5",
        params![
            payment_name,
            phone,
            operator.as_str(),
            Utc::now().to_rfc3339(),
            shop_id
        ],
    )?;
    if changed == 0 {
        return Err(LedgerError::not_found(format!("Shop not found: {shop_id}")));
    }

    info!(shop_id = %shop_id, operator = %operator.as_str(), "Shop payment destination updated");
    get_shop(conn, shop_id)
}
