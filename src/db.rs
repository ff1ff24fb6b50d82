//! SQLite persistence layer for the reconciliation engine.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations, the
//! `local_settings` helpers, and the `BEGIN IMMEDIATE` wrapper every
//! multi-row mutation goes through.

use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info};

use crate::error::Result;

/// Shared handle holding one database connection.
///
/// Background jobs open their own `DbState` on the same file; SQLite's write
/// lock serializes them against request handlers.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl DbState {
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        Ok(self.conn.lock()?)
    }
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 5;

/// Initialize the database at `{data_dir}/ledger.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations.
pub fn init(data_dir: &Path) -> Result<DbState> {
    fs::create_dir_all(data_dir)?;

    let db_path = data_dir.join("ledger.db");
    info!("Opening database at {}", db_path.display());

    let conn = open_and_configure(&db_path)?;
    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Fully migrated in-memory database, for embedding and tests.
pub fn open_in_memory() -> Result<DbState> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    run_migrations(&conn)?;
    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;

    Ok(conn)
}

/// Run `f` inside `BEGIN IMMEDIATE`. Any error rolls back every write made
/// by `f`; the write lock is taken up front so existence checks and the
/// inserts that depend on them cannot interleave with another writer.
pub fn immediate_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    conn.execute_batch("BEGIN IMMEDIATE")?;

    match f(conn) {
        Ok(value) => {
            if let Err(e) = conn.execute_batch("COMMIT") {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(e.into());
            }
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    if current < 3 {
        migrate_v3(conn)?;
    }
    if current < 4 {
        migrate_v4(conn)?;
    }
    if current < 5 {
        migrate_v5(conn)?;
    }

    Ok(())
}

/// Migration v1: shops, orders, debts, remittances.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- local_settings (category/key/value store)
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        CREATE TABLE IF NOT EXISTS shops (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            bill_packaging INTEGER NOT NULL DEFAULT 0,
            packaging_price REAL NOT NULL DEFAULT 0,
            bill_storage INTEGER NOT NULL DEFAULT 0,
            storage_price REAL NOT NULL DEFAULT 0,
            payment_name TEXT,
            phone_number_for_payment TEXT,
            payment_operator TEXT,
            status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','inactive')),
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            shop_id TEXT NOT NULL,
            deliveryman_id TEXT,
            article_amount REAL NOT NULL DEFAULT 0,
            delivery_fee REAL NOT NULL DEFAULT 0,
            amount_received REAL NOT NULL DEFAULT 0,
            payment_status TEXT NOT NULL DEFAULT 'pending',
            status TEXT NOT NULL DEFAULT 'pending',
            payment_type TEXT NOT NULL DEFAULT 'cod',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            delivery_date TEXT,
            archived INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY(shop_id) REFERENCES shops(id)
        );

        CREATE TABLE IF NOT EXISTS remittances (
            id TEXT PRIMARY KEY,
            shop_id TEXT NOT NULL,
            amount REAL NOT NULL,
            payment_date TEXT NOT NULL,
            payment_operator TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK(status IN ('pending','partially_paid','paid')),
            transaction_id TEXT UNIQUE NOT NULL,
            comment TEXT,
            user_id TEXT NOT NULL,
            period_start TEXT NOT NULL,
            period_end TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY(shop_id) REFERENCES shops(id)
        );

        -- debts.type may still be '' on rows imported before v4
        CREATE TABLE IF NOT EXISTS debts (
            id TEXT PRIMARY KEY,
            shop_id TEXT NOT NULL,
            amount REAL NOT NULL,
            type TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending','paid')),
            comment TEXT,
            creation_date TEXT,
            remittance_id TEXT,
            created_by TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            paid_at TEXT,
            FOREIGN KEY(shop_id) REFERENCES shops(id),
            FOREIGN KEY(remittance_id) REFERENCES remittances(id)
        );

        CREATE INDEX IF NOT EXISTS idx_orders_shop_created ON orders(shop_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
        CREATE INDEX IF NOT EXISTS idx_debts_shop_status ON debts(shop_id, status);
        CREATE INDEX IF NOT EXISTS idx_remittances_shop ON remittances(shop_id, status);
        CREATE INDEX IF NOT EXISTS idx_local_settings_cat_key ON local_settings(setting_category, setting_key);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        e
    })?;

    info!("Applied migration v1");
    Ok(())
}

/// Migration v2: deliveryman cash reconciliation tables.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS deliverymen (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS daily_expenses (
            id TEXT PRIMARY KEY,
            deliveryman_id TEXT NOT NULL,
            expense_date TEXT NOT NULL,
            amount REAL NOT NULL CHECK(amount > 0),
            description TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY(deliveryman_id) REFERENCES deliverymen(id)
        );

        -- one row per cashier confirmation event
        CREATE TABLE IF NOT EXISTS cash_handovers (
            id TEXT PRIMARY KEY,
            deliveryman_id TEXT NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('single','batch')),
            expected_total REAL NOT NULL,
            paid_amount REAL NOT NULL,
            validated_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(deliveryman_id) REFERENCES deliverymen(id)
        );

        CREATE TABLE IF NOT EXISTS cash_transactions (
            id TEXT PRIMARY KEY,
            order_id TEXT UNIQUE NOT NULL,
            deliveryman_id TEXT NOT NULL,
            collection_date TEXT NOT NULL,
            expected_amount REAL NOT NULL,
            confirmed_amount REAL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending','confirmed')),
            handover_id TEXT,
            confirmed_at TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(order_id) REFERENCES orders(id),
            FOREIGN KEY(deliveryman_id) REFERENCES deliverymen(id),
            FOREIGN KEY(handover_id) REFERENCES cash_handovers(id)
        );

        CREATE TABLE IF NOT EXISTS shortfalls (
            id TEXT PRIMARY KEY,
            deliveryman_id TEXT NOT NULL,
            shortfall_date TEXT NOT NULL,
            original_amount REAL NOT NULL,
            amount REAL NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending','settled')),
            handover_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            settled_by TEXT,
            settled_at TEXT,
            settled_amount REAL NOT NULL DEFAULT 0,
            FOREIGN KEY(deliveryman_id) REFERENCES deliverymen(id),
            FOREIGN KEY(handover_id) REFERENCES cash_handovers(id)
        );

        CREATE TABLE IF NOT EXISTS shortfall_payments (
            id TEXT PRIMARY KEY,
            shortfall_id TEXT NOT NULL,
            amount REAL NOT NULL CHECK(amount > 0),
            paid_by TEXT NOT NULL,
            paid_at TEXT NOT NULL,
            FOREIGN KEY(shortfall_id) REFERENCES shortfalls(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_orders_deliveryman ON orders(deliveryman_id, delivery_date);
        CREATE INDEX IF NOT EXISTS idx_cash_tx_deliveryman_date
            ON cash_transactions(deliveryman_id, collection_date);
        CREATE INDEX IF NOT EXISTS idx_daily_expenses_deliveryman_date
            ON daily_expenses(deliveryman_id, expense_date);
        CREATE INDEX IF NOT EXISTS idx_shortfalls_deliveryman_status
            ON shortfalls(deliveryman_id, status);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        e
    })?;

    info!("Applied migration v2 (deliveryman cash tables)");
    Ok(())
}

/// Migration v3: append-only daily cash closings.
fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cash_closings (
            id TEXT PRIMARY KEY,
            closed_by TEXT NOT NULL,
            closing_date TEXT NOT NULL,
            expected_cash REAL NOT NULL,
            actual_cash_counted REAL NOT NULL,
            difference REAL NOT NULL,
            comment TEXT,
            created_at TEXT NOT NULL,
            UNIQUE(closed_by, closing_date)
        );

        CREATE TRIGGER IF NOT EXISTS cash_closings_no_update
        BEFORE UPDATE ON cash_closings
        BEGIN
            SELECT RAISE(ABORT, 'cash closings are append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS cash_closings_no_delete
        BEFORE DELETE ON cash_closings
        BEGIN
            SELECT RAISE(ABORT, 'cash closings are append-only');
        END;

        INSERT INTO schema_version (version) VALUES (3);
        ",
    )
    .map_err(|e| {
        error!("Migration v3 failed: {e}");
        e
    })?;

    info!("Applied migration v3 (cash closings)");
    Ok(())
}

/// Migration v4: one-time reclassification of legacy empty-type debts.
///
/// Empty-type rows whose comment mentions storage become `storage_fee` with
/// their fee date pinned; every other empty-type row becomes `other`. Extra
/// storage-fee rows for an already-billed (shop, day) are kept as `other` so
/// no amount disappears, then the one-fee-per-day index goes on.
fn migrate_v4(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        UPDATE debts
           SET type = 'storage_fee',
               creation_date = COALESCE(creation_date, substr(created_at, 1, 10))
         WHERE COALESCE(type, '') = ''
           AND (lower(COALESCE(comment, '')) LIKE '%stockage%'
                OR lower(COALESCE(comment, '')) LIKE '%storage%');

        UPDATE debts SET type = 'other' WHERE COALESCE(type, '') = '';

        UPDATE debts
           SET type = 'other'
         WHERE type = 'storage_fee'
           AND rowid NOT IN (
               SELECT MIN(rowid) FROM debts
                WHERE type = 'storage_fee'
                GROUP BY shop_id, creation_date
           );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_debts_storage_fee_per_day
            ON debts(shop_id, creation_date)
            WHERE type = 'storage_fee';

        CREATE TRIGGER IF NOT EXISTS debts_type_check
        BEFORE INSERT ON debts
        WHEN NEW.type NOT IN ('storage_fee','expedition','daily_balance','other')
        BEGIN
            SELECT RAISE(ABORT, 'invalid debt type');
        END;

        INSERT INTO schema_version (version) VALUES (4);
        ",
    )
    .map_err(|e| {
        error!("Migration v4 failed: {e}");
        e
    })?;

    info!("Applied migration v4 (legacy debt type reclassification)");
    Ok(())
}

/// Migration v5: orders remember the payout that settled them.
fn migrate_v5(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        ALTER TABLE orders ADD COLUMN remittance_id TEXT REFERENCES remittances(id);

        CREATE INDEX IF NOT EXISTS idx_orders_shop_open
            ON orders(shop_id, created_at)
            WHERE remittance_id IS NULL;

        INSERT INTO schema_version (version) VALUES (5);
        ",
    )
    .map_err(|e| {
        error!("Migration v5 failed: {e}");
        e
    })?;

    info!("Applied migration v5 (order settlement)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )?;
    Ok(())
}

/// Migrated in-memory state with the same pragmas as production.
#[cfg(test)]
pub fn test_state() -> DbState {
    open_in_memory().expect("open in-memory db")
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .expect("pragma setup");
        conn
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrations_v1_to_latest() {
        let conn = test_db();
        run_migrations(&conn).expect("run_migrations should succeed");

        let tables = table_names(&conn);
        for table in [
            "local_settings",
            "shops",
            "orders",
            "debts",
            "remittances",
            "deliverymen",
            "daily_expenses",
            "cash_handovers",
            "cash_transactions",
            "shortfalls",
            "shortfall_payments",
            "cash_closings",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).expect("first run");
        run_migrations(&conn).expect("second run should succeed");

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .expect("read schema version");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    #[serial]
    fn test_wal_mode_on_file_db() {
        let dir = std::env::temp_dir().join("delivery_ledger_test_wal");
        let _ = std::fs::remove_dir_all(&dir);

        let state = init(&dir).expect("init file db");
        {
            let conn = state.lock().unwrap();
            let mode: String = conn
                .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .expect("read journal_mode");
            assert_eq!(mode.to_lowercase(), "wal", "journal_mode should be WAL");
        }

        drop(state);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_migration_v4_reclassifies_legacy_debts() {
        let conn = test_db();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT DEFAULT (datetime('now'))
            );",
        )
        .unwrap();
        migrate_v1(&conn).unwrap();
        migrate_v2(&conn).unwrap();
        migrate_v3(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO shops (id, name) VALUES ('s1', 'Shop 1');
             INSERT INTO debts (id, shop_id, amount, type, comment, created_at)
                 VALUES ('d1', 's1', 200, '', 'Frais de stockage du jour', '2024-03-01 08:00:00');
             INSERT INTO debts (id, shop_id, amount, type, comment, created_at)
                 VALUES ('d2', 's1', 200, '', 'STORAGE fee', '2024-03-01 09:00:00');
             INSERT INTO debts (id, shop_id, amount, type, comment, created_at)
                 VALUES ('d3', 's1', 900, '', 'casse colis', '2024-03-01 10:00:00');
             INSERT INTO debts (id, shop_id, amount, type, comment, created_at)
                 VALUES ('d4', 's1', 50, 'expedition', NULL, '2024-03-01 10:00:00');",
        )
        .unwrap();

        run_migrations(&conn).expect("v4 on top of legacy rows");

        let type_of = |id: &str| -> String {
            conn.query_row("SELECT type FROM debts WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .unwrap()
        };
        assert_eq!(type_of("d1"), "storage_fee");
        assert_eq!(type_of("d2"), "other", "second fee for the same day is kept as other");
        assert_eq!(type_of("d3"), "other");
        assert_eq!(type_of("d4"), "expedition");

        let fee_date: String = conn
            .query_row("SELECT creation_date FROM debts WHERE id = 'd1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(fee_date, "2024-03-01");

        let total: f64 = conn
            .query_row("SELECT SUM(amount) FROM debts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(total, 1350.0, "reclassification never drops amounts");

        let bad = conn.execute(
            "INSERT INTO debts (id, shop_id, amount, type) VALUES ('d5', 's1', 10, '')",
            [],
        );
        assert!(bad.is_err(), "empty type is rejected after v4");
    }

    #[test]
    fn test_storage_fee_unique_per_shop_and_day() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        conn.execute("INSERT INTO shops (id, name) VALUES ('s1', 'Shop 1')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO debts (id, shop_id, amount, type, creation_date)
             VALUES ('a', 's1', 100, 'storage_fee', '2024-03-01')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO debts (id, shop_id, amount, type, creation_date)
             VALUES ('b', 's1', 100, 'storage_fee', '2024-03-01')",
            [],
        );
        assert!(dup.is_err(), "second storage fee for the same day must be rejected");
    }

    #[test]
    fn test_cash_closings_are_append_only() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO cash_closings (id, closed_by, closing_date, expected_cash,
                actual_cash_counted, difference, created_at)
             VALUES ('c1', 'u1', '2024-03-01', 100, 90, -10, datetime('now'))",
            [],
        )
        .unwrap();
        assert!(conn
            .execute("UPDATE cash_closings SET difference = 0 WHERE id = 'c1'", [])
            .is_err());
        assert!(conn
            .execute("DELETE FROM cash_closings WHERE id = 'c1'", [])
            .is_err());
    }

    #[test]
    fn test_immediate_transaction_rolls_back_on_error() {
        let conn = test_db();
        run_migrations(&conn).unwrap();

        let result: Result<()> = immediate_transaction(&conn, |conn| {
            conn.execute("INSERT INTO shops (id, name) VALUES ('s1', 'Shop 1')", [])?;
            Err(crate::error::LedgerError::validation("boom"))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM shops", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "insert must be rolled back");
    }

    #[test]
    fn test_settings_crud() {
        let conn = test_db();
        run_migrations(&conn).expect("migrations");

        set_setting(&conn, "ledger", "storage_fees_last_date", "2024-03-01").expect("set");
        assert_eq!(
            get_setting(&conn, "ledger", "storage_fees_last_date"),
            Some("2024-03-01".to_string())
        );

        set_setting(&conn, "ledger", "storage_fees_last_date", "2024-03-02").expect("update");
        assert_eq!(
            get_setting(&conn, "ledger", "storage_fees_last_date"),
            Some("2024-03-02".to_string())
        );
        assert!(get_setting(&conn, "ledger", "missing").is_none());
    }
}
