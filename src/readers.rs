//! Transaction source readers.
//!
//! Read-only scan-and-sum queries over orders, debts, remittances and the
//! deliveryman cash tables. Each reader returns a complete total for the
//! requested window, `0.0` when nothing matches.
//!
//! Shop readers only see open orders, those no payout has settled yet.
//!
//! Date basis: shop readers filter orders on the day of `created_at`;
//! deliveryman readers use `delivery_date`, falling back to the creation day.
//! Debts are dated by `creation_date` when set, else by their creation day.

use chrono::NaiveDate;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::Shop;
use crate::money::round2;
use crate::period::{format_date, DateRange};

/// Effective date of a debt row.
const DEBT_DAY_SQL: &str = "COALESCE(creation_date, substr(created_at, 1, 10))";

/// Day an order counts towards for its deliveryman.
pub(crate) const ORDER_DELIVERY_DAY_SQL: &str =
    "COALESCE(delivery_date, substr(created_at, 1, 10))";

/// Cash a deliveryman is expected to bring back for one order.
pub(crate) const ORDER_EXPECTED_CASH_SQL: &str = "CASE
        WHEN status = 'delivered' AND payment_status = 'cash' THEN article_amount + delivery_fee
        WHEN status = 'delivered' AND payment_status = 'paid_to_supplier' THEN delivery_fee
        WHEN status = 'failed_delivery' THEN amount_received
        ELSE 0
    END";

/// Shop-side orders still owed to the shop.
const OPEN_ORDER_SQL: &str = "remittance_id IS NULL";

/// Orders whose cash goes through a deliveryman.
pub(crate) const COLLECTABLE_ORDER_SQL: &str =
    "payment_type = 'cod' AND status IN ('delivered', 'failed_delivery')";

fn sum(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<f64> {
    let total: f64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(round2(total))
}

// ---------------------------------------------------------------------------
// Shop readers
// ---------------------------------------------------------------------------

/// Cash sales of delivered orders plus cash kept on failed deliveries.
pub fn gains(conn: &Connection, shop_id: &str, range: &DateRange) -> Result<f64> {
    sum(
        conn,
        &format!(
            "SELECT COALESCE(SUM(CASE
                        WHEN status = 'delivered' AND payment_status = 'cash' THEN article_amount
                        WHEN status = 'failed_delivery' THEN amount_received
                        ELSE 0
                    END), 0)
             FROM orders
             WHERE shop_id = ?1
               AND {OPEN_ORDER_SQL}
               AND substr(created_at, 1, 10) BETWEEN ?2 AND ?3"
        ),
        params![shop_id, range.start_str(), range.end_str()],
    )
}

pub fn delivery_fees(conn: &Connection, shop_id: &str, range: &DateRange) -> Result<f64> {
    sum(
        conn,
        &format!(
            "SELECT COALESCE(SUM(delivery_fee), 0)
             FROM orders
             WHERE shop_id = ?1
               AND {OPEN_ORDER_SQL}
               AND status IN ('delivered', 'failed_delivery')
               AND substr(created_at, 1, 10) BETWEEN ?2 AND ?3"
        ),
        params![shop_id, range.start_str(), range.end_str()],
    )
}

/// Count of open handled orders in the window.
pub fn handled_orders(conn: &Connection, shop_id: &str, range: &DateRange) -> Result<i64> {
    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*)
             FROM orders
             WHERE shop_id = ?1
               AND {OPEN_ORDER_SQL}
               AND status IN ('delivered', 'failed_delivery')
               AND substr(created_at, 1, 10) BETWEEN ?2 AND ?3"
        ),
        params![shop_id, range.start_str(), range.end_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Per-order packaging charge, zero when the shop is not billed for it.
pub fn packaging_fees(conn: &Connection, shop: &Shop, range: &DateRange) -> Result<f64> {
    if !shop.bill_packaging {
        return Ok(0.0);
    }
    let count = handled_orders(conn, &shop.id, range)?;
    Ok(round2(count as f64 * shop.packaging_price))
}

/// Pending storage-fee debts dated inside the window.
pub fn storage_fees(conn: &Connection, shop_id: &str, range: &DateRange) -> Result<f64> {
    sum(
        conn,
        &format!(
            "SELECT COALESCE(SUM(amount), 0)
             FROM debts
             WHERE shop_id = ?1
               AND type = 'storage_fee'
               AND status = 'pending'
               AND {DEBT_DAY_SQL} BETWEEN ?2 AND ?3"
        ),
        params![shop_id, range.start_str(), range.end_str()],
    )
}

/// Pending debts of any type dated strictly before `as_of`.
pub fn previous_debts(conn: &Connection, shop_id: &str, as_of: NaiveDate) -> Result<f64> {
    sum(
        conn,
        &format!(
            "SELECT COALESCE(SUM(amount), 0)
             FROM debts
             WHERE shop_id = ?1
               AND status = 'pending'
               AND {DEBT_DAY_SQL} < ?2"
        ),
        params![shop_id, format_date(as_of)],
    )
}

/// Lifetime payouts recorded for the shop.
pub fn already_remitted_total(conn: &Connection, shop_id: &str) -> Result<f64> {
    sum(
        conn,
        "SELECT COALESCE(SUM(amount), 0)
         FROM remittances
         WHERE shop_id = ?1 AND status IN ('paid', 'partially_paid')",
        params![shop_id],
    )
}

/// Payouts whose period overlaps the window.
pub fn remitted_in_range(conn: &Connection, shop_id: &str, range: &DateRange) -> Result<f64> {
    sum(
        conn,
        "SELECT COALESCE(SUM(amount), 0)
         FROM remittances
         WHERE shop_id = ?1
           AND status IN ('paid', 'partially_paid')
           AND period_start <= ?3 AND period_end >= ?2",
        params![shop_id, range.start_str(), range.end_str()],
    )
}

// ---------------------------------------------------------------------------
// Deliveryman readers
// ---------------------------------------------------------------------------

/// Cash the deliveryman should hold from the day's COD orders.
pub fn expected_collections(conn: &Connection, deliveryman_id: &str, date: &str) -> Result<f64> {
    sum(
        conn,
        &format!(
            "SELECT COALESCE(SUM({ORDER_EXPECTED_CASH_SQL}), 0)
             FROM orders
             WHERE deliveryman_id = ?1
               AND {COLLECTABLE_ORDER_SQL}
               AND {ORDER_DELIVERY_DAY_SQL} = ?2"
        ),
        params![deliveryman_id, date],
    )
}

pub fn collectable_orders(conn: &Connection, deliveryman_id: &str, date: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*)
             FROM orders
             WHERE deliveryman_id = ?1
               AND {COLLECTABLE_ORDER_SQL}
               AND {ORDER_DELIVERY_DAY_SQL} = ?2"
        ),
        params![deliveryman_id, date],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn declared_expenses(conn: &Connection, deliveryman_id: &str, date: &str) -> Result<f64> {
    sum(
        conn,
        "SELECT COALESCE(SUM(amount), 0)
         FROM daily_expenses
         WHERE deliveryman_id = ?1 AND expense_date = ?2",
        params![deliveryman_id, date],
    )
}

/// Cash a cashier has confirmed for the day's orders.
pub fn confirmed_amount(conn: &Connection, deliveryman_id: &str, date: &str) -> Result<f64> {
    sum(
        conn,
        "SELECT COALESCE(SUM(confirmed_amount), 0)
         FROM cash_transactions
         WHERE deliveryman_id = ?1 AND collection_date = ?2 AND status = 'confirmed'",
        params![deliveryman_id, date],
    )
}

pub fn confirmed_orders(conn: &Connection, deliveryman_id: &str, date: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*)
         FROM cash_transactions
         WHERE deliveryman_id = ?1 AND collection_date = ?2 AND status = 'confirmed'",
        params![deliveryman_id, date],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::shops;

    fn setup() -> db::DbState {
        let state = db::test_state();
        {
            let conn = state.lock().unwrap();
            conn.execute_batch(
                "INSERT INTO shops (id, name, bill_packaging, packaging_price)
                     VALUES ('s1', 'Shop 1', 1, 100);
                 INSERT INTO deliverymen (id, name) VALUES ('m1', 'Moussa');

                 INSERT INTO orders (id, shop_id, deliveryman_id, article_amount, delivery_fee,
                                     amount_received, payment_status, status, payment_type,
                                     created_at, delivery_date)
                 VALUES
                   ('o1', 's1', 'm1', 5000, 500, 0, 'cash', 'delivered', 'cod',
                    '2024-03-05 09:00:00', '2024-03-05'),
                   ('o2', 's1', 'm1', 3000, 500, 1000, 'pending', 'failed_delivery', 'cod',
                    '2024-03-05 10:00:00', '2024-03-05'),
                   ('o3', 's1', 'm1', 7000, 500, 0, 'paid_to_supplier', 'delivered', 'cod',
                    '2024-03-05 11:00:00', '2024-03-05'),
                   ('o4', 's1', NULL, 9000, 500, 0, 'cash', 'cancelled', 'cod',
                    '2024-03-05 12:00:00', NULL),
                   ('o5', 's1', 'm1', 4000, 500, 0, 'cash', 'delivered', 'cod',
                    '2024-03-06 09:00:00', '2024-03-06');

                 INSERT INTO debts (id, shop_id, amount, type, status, creation_date, created_at)
                 VALUES
                   ('d1', 's1', 150, 'storage_fee', 'pending', '2024-03-05', '2024-03-05 00:00:00'),
                   ('d2', 's1', 150, 'storage_fee', 'paid', '2024-03-04', '2024-03-04 00:00:00'),
                   ('d3', 's1', 800, 'other', 'pending', NULL, '2024-03-01 12:00:00'),
                   ('d4', 's1', 300, 'expedition', 'pending', '2024-03-05', '2024-03-05 08:00:00');",
            )
            .unwrap();
        }
        state
    }

    fn day(s: &str) -> DateRange {
        DateRange::parse(s, s).unwrap()
    }

    #[test]
    fn test_gains_counts_cash_sales_and_failed_delivery_cash() {
        let state = setup();
        let conn = state.lock().unwrap();
        // o1 article (5000) + o2 amount_received (1000); o3 was paid to supplier
        assert_eq!(gains(&conn, "s1", &day("2024-03-05")).unwrap(), 6000.0);
        assert_eq!(gains(&conn, "s1", &day("2024-03-06")).unwrap(), 4000.0);
    }

    #[test]
    fn test_delivery_and_packaging_fees_skip_cancelled() {
        let state = setup();
        let conn = state.lock().unwrap();
        let range = day("2024-03-05");
        assert_eq!(delivery_fees(&conn, "s1", &range).unwrap(), 1500.0);

        let shop = shops::get_shop(&conn, "s1").unwrap();
        assert_eq!(packaging_fees(&conn, &shop, &range).unwrap(), 300.0);
    }

    #[test]
    fn test_debt_readers_never_overlap() {
        let state = setup();
        let conn = state.lock().unwrap();
        let range = day("2024-03-05");
        assert_eq!(storage_fees(&conn, "s1", &range).unwrap(), 150.0);
        // d3 only: d1/d4 belong to the period, d2 is paid
        assert_eq!(previous_debts(&conn, "s1", range.start).unwrap(), 800.0);
    }

    #[test]
    fn test_empty_window_reads_zero() {
        let state = setup();
        let conn = state.lock().unwrap();
        let range = day("2023-01-01");
        assert_eq!(gains(&conn, "s1", &range).unwrap(), 0.0);
        assert_eq!(delivery_fees(&conn, "s1", &range).unwrap(), 0.0);
        assert_eq!(storage_fees(&conn, "s1", &range).unwrap(), 0.0);
        assert_eq!(remitted_in_range(&conn, "s1", &range).unwrap(), 0.0);
        assert_eq!(already_remitted_total(&conn, "s1").unwrap(), 0.0);
    }

    #[test]
    fn test_settled_orders_leave_shop_readers() {
        let state = setup();
        let conn = state.lock().unwrap();
        conn.execute_batch(
            "INSERT INTO remittances (id, shop_id, amount, payment_date, status, transaction_id,
                                      user_id, period_start, period_end)
             VALUES ('r1', 's1', 3000, '2024-03-06', 'paid', 'tx-1', 'admin',
                     '2024-03-04', '2024-03-05');
             UPDATE orders SET remittance_id = 'r1' WHERE id = 'o1';",
        )
        .unwrap();

        let range = day("2024-03-05");
        assert_eq!(gains(&conn, "s1", &range).unwrap(), 1000.0);
        assert_eq!(delivery_fees(&conn, "s1", &range).unwrap(), 1000.0);
        assert_eq!(handled_orders(&conn, "s1", &range).unwrap(), 2);

        // overlap, not containment
        let wider = DateRange::parse("2024-03-05", "2024-03-09").unwrap();
        assert_eq!(remitted_in_range(&conn, "s1", &wider).unwrap(), 3000.0);
        assert_eq!(remitted_in_range(&conn, "s1", &day("2024-03-06")).unwrap(), 0.0);
    }

    #[test]
    fn test_deliveryman_expected_collections() {
        let state = setup();
        let conn = state.lock().unwrap();
        // o1: 5000 + 500, o2: 1000 kept on failure, o3: fee only
        assert_eq!(expected_collections(&conn, "m1", "2024-03-05").unwrap(), 7000.0);
        assert_eq!(collectable_orders(&conn, "m1", "2024-03-05").unwrap(), 3);
        assert_eq!(confirmed_amount(&conn, "m1", "2024-03-05").unwrap(), 0.0);
        assert_eq!(declared_expenses(&conn, "m1", "2024-03-05").unwrap(), 0.0);
    }
}
