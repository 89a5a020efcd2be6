//! Canonical entities and the normalized records connectors hand to the
//! reconciler.
//!
//! Normalized records are the only shape that crosses the connector
//! boundary: money already parsed to `Decimal`, dates already parsed to
//! UTC timestamps, missing numeric fields already zeroed.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// One upstream commerce order, as persisted.
///
/// `id` is the upstream natural key and the idempotency key: re-ingesting
/// the same order updates this row in place. `fees_total` and
/// `refund_total` may be raised later by the payment pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: String,
    pub identity_key: String,
    pub customer_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub gross_total: Decimal,
    pub net_total: Decimal,
    pub refund_total: Decimal,
    pub fees_total: Decimal,
}

/// One coupon application tied to an order. The full set for an order is
/// replaced wholesale on every re-ingestion of that order.
#[derive(Debug, Clone, PartialEq)]
pub struct CouponUsage {
    pub order_id: String,
    pub code: String,
    pub discount: Decimal,
    pub customer_email: Option<String>,
}

/// Aggregate identity derived from orders. `id` is the identity key.
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
    pub first_order_date: DateTime<Utc>,
    pub last_order_date: DateTime<Utc>,
    pub order_count: u32,
    pub total_spent: Decimal,
    pub total_refunds: Decimal,
    pub total_net: Decimal,
    pub ltv_estimate: Decimal,
}

/// Upstream advertising platform. One variant per ads connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdPlatform {
    Meta,
}

impl AdPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdPlatform::Meta => "meta",
        }
    }
}

/// One (date, platform, campaign) spend observation.
#[derive(Debug, Clone, PartialEq)]
pub struct AdSpend {
    pub platform: AdPlatform,
    pub date: NaiveDate,
    pub campaign: Option<String>,
    pub spend: Decimal,
    pub impressions: Option<i64>,
    pub clicks: Option<i64>,
}

/// Normalized order record leaving the order-platform connector.
#[derive(Debug, Clone)]
pub struct NormalizedOrder {
    pub id: String,
    pub email: Option<String>,
    /// Upstream customer id, if the platform knows the buyer.
    pub platform_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub gross_total: Decimal,
    pub refund_total: Decimal,
    pub coupons: Vec<NormalizedCoupon>,
}

#[derive(Debug, Clone)]
pub struct NormalizedCoupon {
    pub code: String,
    pub discount: Decimal,
}

/// Normalized charge record leaving the payment-platform connector.
/// `order_ref` is the embedded external order reference; charges without
/// one cannot be linked and are skipped by the reconciler.
#[derive(Debug, Clone)]
pub struct NormalizedCharge {
    pub id: String,
    pub order_ref: Option<String>,
    pub fee: Decimal,
    pub refunded: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Normalized campaign-day row leaving the ads-platform connector.
#[derive(Debug, Clone)]
pub struct NormalizedAdRow {
    pub date: NaiveDate,
    pub campaign: Option<String>,
    pub spend: Decimal,
    pub impressions: Option<i64>,
    pub clicks: Option<i64>,
}

/// Resolved sync window bounds, echoed back in every run report.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WindowBounds {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

/// Outcome of one order-platform sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSyncReport {
    pub processed: u64,
    pub imported: u64,
    pub updated: u64,
    /// Orders whose coupon replacement failed (logged, non-fatal).
    pub coupon_errors: u64,
    pub customers_flushed: u64,
    pub window: WindowBounds,
}

/// Outcome of one payment-platform sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSyncReport {
    pub processed: u64,
    /// Charges applied to a matching order.
    pub linked: u64,
    /// Charges with no order reference, or a reference matching no order.
    pub skipped: u64,
    /// Customers recomputed because a linked order's totals changed.
    pub customers_flushed: u64,
    pub window: WindowBounds,
}

/// Outcome of one ads-platform sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct AdSyncReport {
    pub fetched: u64,
    /// Rows deleted from the window before the fresh insert.
    pub replaced: u64,
    pub window: WindowBounds,
}

impl NormalizedOrder {
    /// Derive the identity key used to merge orders into one Customer:
    /// normalized email, else platform customer id, else a guest fallback
    /// unique to this order.
    pub fn identity_key(&self) -> String {
        if let Some(email) = self.email.as_deref() {
            let normalized = email.trim().to_lowercase();
            if !normalized.is_empty() {
                return normalized;
            }
        }
        if let Some(cid) = self.platform_customer_id.as_deref() {
            return format!("customer:{cid}");
        }
        format!("guest:{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn order(email: Option<&str>, customer_id: Option<&str>) -> NormalizedOrder {
        NormalizedOrder {
            id: "9001".to_string(),
            email: email.map(str::to_string),
            platform_customer_id: customer_id.map(str::to_string),
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            gross_total: Decimal::ZERO,
            refund_total: Decimal::ZERO,
            coupons: vec![],
        }
    }

    #[test]
    fn test_identity_prefers_normalized_email() {
        let o = order(Some("  Jane.Doe@Example.COM "), Some("42"));
        assert_eq!(o.identity_key(), "jane.doe@example.com");
    }

    #[test]
    fn test_identity_falls_back_to_customer_id() {
        let o = order(None, Some("42"));
        assert_eq!(o.identity_key(), "customer:42");
        // Blank email is treated as absent
        let o = order(Some("   "), Some("42"));
        assert_eq!(o.identity_key(), "customer:42");
    }

    #[test]
    fn test_identity_guest_fallback_is_per_order() {
        let o = order(None, None);
        assert_eq!(o.identity_key(), "guest:9001");
    }
}
