//! Ledger aggregation: one balance per shop or per deliveryman.
//!
//! Shop balance, applied identically by every caller:
//!
//! ```text
//! amount_to_remit = gains - (delivery + packaging + storage + previous_debts)
//! ```
//!
//! Payouts are netted at the row level: a payout stamps the orders and debts
//! it settled, and the readers skip stamped rows. A paid window, or any window
//! overlapping it, therefore recomputes without the settled money.
//!
//! Status comes from `amount_to_remit` with a tolerance of [`EPSILON`].
//! Nothing is cached; every call reads the current rows.

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::debug;

use crate::deliverymen;
use crate::error::Result;
use crate::models::{DeliverymanBalance, FeesBreakdown, RemittanceStatus, ShopBalance};
use crate::money::{round2, EPSILON};
use crate::period::{format_date, parse_date, DateRange, ReportQuery};
use crate::readers;
use crate::shops;

pub fn derive_status(amount_to_remit: f64) -> RemittanceStatus {
    if amount_to_remit > EPSILON {
        RemittanceStatus::Pending
    } else if amount_to_remit < -EPSILON {
        RemittanceStatus::PartiallyPaid
    } else {
        RemittanceStatus::Paid
    }
}

pub fn compute_shop_balance(
    conn: &Connection,
    shop_id: &str,
    range: &DateRange,
) -> Result<ShopBalance> {
    let shop = shops::get_shop(conn, shop_id)?;

    let gains = readers::gains(conn, shop_id, range)?;
    let fees = FeesBreakdown {
        delivery_fees: readers::delivery_fees(conn, shop_id, range)?,
        packaging_fees: readers::packaging_fees(conn, &shop, range)?,
        storage_fees: readers::storage_fees(conn, shop_id, range)?,
    };
    let previous_debts = readers::previous_debts(conn, shop_id, range.start)?;
    let already_remitted = readers::remitted_in_range(conn, shop_id, range)?;

    let amount_to_remit = round2(gains - (fees.total() + previous_debts));
    let status = derive_status(amount_to_remit);

    debug!(
        shop_id = %shop_id,
        start = %range.start,
        end = %range.end,
        gains = %gains,
        amount_to_remit = %amount_to_remit,
        "Shop balance computed"
    );

    Ok(ShopBalance {
        shop_id: shop.id,
        shop_name: shop.name,
        period_start: range.start_str(),
        period_end: range.end_str(),
        gains,
        fees,
        previous_debts,
        already_remitted,
        amount_to_remit,
        status,
    })
}

/// Balance for one shop from raw query parameters; `None` when the window is
/// missing or malformed.
pub fn shop_balance_for_query(
    conn: &Connection,
    shop_id: &str,
    query: &ReportQuery,
) -> Result<Option<ShopBalance>> {
    match query.range() {
        Some(range) => compute_shop_balance(conn, shop_id, &range).map(Some),
        None => Ok(None),
    }
}

/// One row per active shop matching the search, zero-activity shops
/// included. Empty when the window is missing or malformed.
pub fn list_shop_balances(conn: &Connection, query: &ReportQuery) -> Result<Vec<ShopBalance>> {
    let Some(range) = query.range() else {
        debug!("Shop balance listing without a valid window");
        return Ok(Vec::new());
    };

    shops::list_active_shops(conn, query.search_term())?
        .iter()
        .map(|shop| compute_shop_balance(conn, &shop.id, &range))
        .collect()
}

pub fn compute_deliveryman_balance(
    conn: &Connection,
    deliveryman_id: &str,
    date: NaiveDate,
) -> Result<DeliverymanBalance> {
    deliverymen::get_deliveryman(conn, deliveryman_id)?;
    let day = format_date(date);

    let expected_amount = readers::expected_collections(conn, deliveryman_id, &day)?;
    let daily_expenses_total = readers::declared_expenses(conn, deliveryman_id, &day)?;
    let confirmed_amount = readers::confirmed_amount(conn, deliveryman_id, &day)?;
    let total_orders = readers::collectable_orders(conn, deliveryman_id, &day)?;
    let confirmed_orders = readers::confirmed_orders(conn, deliveryman_id, &day)?;

    let due_amount = round2(expected_amount - daily_expenses_total - confirmed_amount);

    Ok(DeliverymanBalance {
        deliveryman_id: deliveryman_id.to_string(),
        date: day,
        expected_amount,
        confirmed_amount,
        daily_expenses_total,
        due_amount,
        shortfall_amount: due_amount.max(0.0),
        total_orders,
        confirmed_orders,
        pending_orders: (total_orders - confirmed_orders).max(0),
    })
}

/// Daily reconciliation rows for every deliveryman with collections on
/// `date`. Empty when the date is missing or malformed.
pub fn list_deliveryman_balances(
    conn: &Connection,
    date: Option<&str>,
) -> Result<Vec<DeliverymanBalance>> {
    let Some(date) = date.and_then(parse_date) else {
        return Ok(Vec::new());
    };

    deliverymen::active_on(conn, &format_date(date))?
        .iter()
        .map(|id| compute_deliveryman_balance(conn, id, date))
        .collect()
}
