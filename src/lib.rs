//! Delivery Ledger - shop remittance and deliveryman cash reconciliation
//!
//! Computes what the platform owes each shop over a date window and what each
//! deliveryman owes the cashier for a day, then records the payouts,
//! handovers, shortfalls and cash closings that settle those balances.
//!
//! Every operation takes a `&rusqlite::Connection` from a [`db::DbState`];
//! balances are always recomputed from the stored rows.

pub mod cash;
pub mod closing;
pub mod config;
pub mod db;
pub mod debts;
pub mod deliverymen;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod money;
pub mod orders;
pub mod period;
pub mod readers;
pub mod remittance;
pub mod scheduler;
pub mod shops;
pub mod shortfalls;
pub mod storage_fees;

pub use db::DbState;
pub use error::{LedgerError, Result};
pub use period::{DateRange, ReportQuery};
