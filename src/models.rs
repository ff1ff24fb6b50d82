//! Row and result types shared across the engine.
//!
//! Status and type columns are stored as lowercase text; each enum here owns
//! the mapping in both directions so SQL literals stay in one place.

use serde::{Deserialize, Serialize};

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(ShopStatus { Active => "active", Inactive => "inactive" });

text_enum!(OrderStatus {
    Pending => "pending",
    InProgress => "in_progress",
    Delivered => "delivered",
    FailedDelivery => "failed_delivery",
    Cancelled => "cancelled",
    Returned => "returned",
    Reported => "reported",
});

impl OrderStatus {
    /// Terminal orders are frozen; only housekeeping flags may change.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::FailedDelivery | Self::Cancelled | Self::Returned
        )
    }
}

text_enum!(PaymentStatus {
    Cash => "cash",
    PaidToSupplier => "paid_to_supplier",
    Pending => "pending",
});

text_enum!(PaymentType { Cod => "cod", Prepaid => "prepaid" });

text_enum!(
    /// Debt categories. Rows with the legacy empty type are reclassified by
    /// migration v4 and never written again.
    DebtType {
        StorageFee => "storage_fee",
        Expedition => "expedition",
        DailyBalance => "daily_balance",
        Other => "other",
    }
);

text_enum!(DebtStatus { Pending => "pending", Paid => "paid" });

text_enum!(RemittanceStatus {
    Pending => "pending",
    PartiallyPaid => "partially_paid",
    Paid => "paid",
});

text_enum!(CashTransactionStatus { Pending => "pending", Confirmed => "confirmed" });

text_enum!(ShortfallStatus { Pending => "pending", Settled => "settled" });

text_enum!(HandoverKind { Single => "single", Batch => "batch" });

/// Mobile-money provider a shop is paid through. Recorded as metadata only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOperator {
    OrangeMoney,
    MtnMoney,
    Other(String),
}

impl PaymentOperator {
    pub fn as_str(&self) -> &str {
        match self {
            Self::OrangeMoney => "OrangeMoney",
            Self::MtnMoney => "MTNMoney",
            Self::Other(name) => name.as_str(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        let compact: String = trimmed
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        Some(match compact.as_str() {
            "orangemoney" | "om" => Self::OrangeMoney,
            "mtnmoney" | "mtn" | "momo" => Self::MtnMoney,
            _ => Self::Other(trimmed.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Stored rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shop {
    pub id: String,
    pub name: String,
    pub bill_packaging: bool,
    pub packaging_price: f64,
    pub bill_storage: bool,
    pub storage_price: f64,
    pub payment_name: Option<String>,
    pub phone_number_for_payment: Option<String>,
    pub payment_operator: Option<PaymentOperator>,
    pub status: ShopStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub shop_id: String,
    pub deliveryman_id: Option<String>,
    pub article_amount: f64,
    pub delivery_fee: f64,
    pub amount_received: f64,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub payment_type: PaymentType,
    pub created_at: String,
    pub delivery_date: Option<String>,
    /// Payout that settled this order, once its shop has been paid.
    pub remittance_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debt {
    pub id: String,
    pub shop_id: String,
    pub amount: f64,
    pub debt_type: DebtType,
    pub status: DebtStatus,
    pub comment: Option<String>,
    pub creation_date: Option<String>,
    pub remittance_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remittance {
    pub id: String,
    pub shop_id: String,
    pub amount: f64,
    pub payment_date: String,
    pub payment_operator: Option<PaymentOperator>,
    pub status: RemittanceStatus,
    pub transaction_id: String,
    pub comment: Option<String>,
    pub user_id: String,
    pub period_start: String,
    pub period_end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deliveryman {
    pub id: String,
    pub name: String,
    pub active: bool,
}

/// One COD order's cash on its way from a deliveryman to a cashier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashTransaction {
    pub id: String,
    pub order_id: String,
    pub deliveryman_id: String,
    pub collection_date: String,
    pub expected_amount: f64,
    pub confirmed_amount: Option<f64>,
    pub status: CashTransactionStatus,
    pub handover_id: Option<String>,
}

/// A cashier confirmation event covering one or more transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashHandover {
    pub id: String,
    pub deliveryman_id: String,
    pub kind: HandoverKind,
    pub expected_total: f64,
    pub paid_amount: f64,
    pub validated_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shortfall {
    pub id: String,
    pub deliveryman_id: String,
    pub shortfall_date: String,
    pub original_amount: f64,
    pub amount: f64,
    pub status: ShortfallStatus,
    pub handover_id: Option<String>,
    pub created_at: String,
    pub settled_by: Option<String>,
    pub settled_at: Option<String>,
    pub settled_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyExpense {
    pub id: String,
    pub deliveryman_id: String,
    pub expense_date: String,
    pub amount: f64,
    pub description: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashClosing {
    pub id: String,
    pub closed_by: String,
    pub closing_date: String,
    pub expected_cash: f64,
    pub actual_cash_counted: f64,
    pub difference: f64,
    pub comment: Option<String>,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Computed results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeesBreakdown {
    pub delivery_fees: f64,
    pub packaging_fees: f64,
    pub storage_fees: f64,
}

impl FeesBreakdown {
    pub fn total(&self) -> f64 {
        self.delivery_fees + self.packaging_fees + self.storage_fees
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopBalance {
    pub shop_id: String,
    pub shop_name: String,
    pub period_start: String,
    pub period_end: String,
    pub gains: f64,
    pub fees: FeesBreakdown,
    pub previous_debts: f64,
    /// Payouts whose period overlaps the window; informational only.
    pub already_remitted: f64,
    pub amount_to_remit: f64,
    pub status: RemittanceStatus,
}

impl ShopBalance {
    /// Presentation helper: rows with no money movement at all.
    pub fn has_activity(&self) -> bool {
        self.gains != 0.0
            || self.fees.total() != 0.0
            || self.previous_debts != 0.0
            || self.already_remitted != 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverymanBalance {
    pub deliveryman_id: String,
    pub date: String,
    pub expected_amount: f64,
    pub confirmed_amount: f64,
    pub daily_expenses_total: f64,
    pub due_amount: f64,
    pub shortfall_amount: f64,
    pub total_orders: i64,
    pub confirmed_orders: i64,
    pub pending_orders: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageFeeRun {
    pub date: String,
    pub created: usize,
    pub already_present: usize,
    pub debt_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationOutcome {
    pub handover_id: String,
    pub deliveryman_id: String,
    pub transaction_ids: Vec<String>,
    pub expected_total: f64,
    pub paid_amount: f64,
    pub shortfall_id: Option<String>,
    pub shortfall_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub shortfall_id: String,
    pub amount_paid: f64,
    pub remaining: f64,
    pub status: ShortfallStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_enum_round_trip_and_case() {
        assert_eq!(OrderStatus::parse("Failed_Delivery"), Some(OrderStatus::FailedDelivery));
        assert_eq!(OrderStatus::FailedDelivery.as_str(), "failed_delivery");
        assert_eq!(DebtType::parse(""), None);
        assert_eq!(PaymentType::parse("COD"), Some(PaymentType::Cod));
    }

    #[test]
    fn test_terminal_order_statuses() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Returned.is_terminal());
        assert!(!OrderStatus::InProgress.is_terminal());
        assert!(!OrderStatus::Reported.is_terminal());
    }

    #[test]
    fn test_payment_operator_aliases() {
        assert_eq!(PaymentOperator::parse("Orange Money"), Some(PaymentOperator::OrangeMoney));
        assert_eq!(PaymentOperator::parse("MTNMoney"), Some(PaymentOperator::MtnMoney));
        assert_eq!(
            PaymentOperator::parse("Wave"),
            Some(PaymentOperator::Other("Wave".to_string()))
        );
        assert_eq!(PaymentOperator::parse("  "), None);
    }

    #[test]
    fn test_fees_total() {
        let fees = FeesBreakdown {
            delivery_fees: 500.0,
            packaging_fees: 100.0,
            storage_fees: 50.0,
        };
        assert_eq!(fees.total(), 650.0);
    }
}
