//! Persistence layer.
//!
//! The `Store` trait is the repository boundary: the reconciler, metrics
//! engine, and facade only ever see this trait, so tests substitute an
//! in-memory SQLite database for the on-disk one.

mod sqlite;

pub use sqlite::{run_migrations, SqliteStore};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::types::{AdPlatform, AdSpend, CouponUsage, Customer, Order};

/// Monetary totals over a set of orders, folded as `Decimal`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTotals {
    pub gross: Decimal,
    pub net: Decimal,
    pub count: u64,
}

/// Repository over the canonical store. Every write path is idempotent:
/// orders upsert by natural id, customers upsert by identity key, coupon
/// and ad-spend rows are replaced wholesale.
pub trait Store: Send + Sync {
    // orders
    fn get_order(&self, id: &str) -> Result<Option<Order>>;
    fn put_order(&self, order: &Order) -> Result<()>;
    fn orders_for_identity(&self, identity_key: &str) -> Result<Vec<Order>>;
    fn latest_order_created_at(&self) -> Result<Option<DateTime<Utc>>>;
    fn order_totals_since(&self, since: DateTime<Utc>) -> Result<OrderTotals>;

    // coupon usages
    fn replace_coupon_usages(&self, order_id: &str, rows: &[CouponUsage]) -> Result<()>;
    fn coupon_usages_for_order(&self, order_id: &str) -> Result<Vec<CouponUsage>>;

    // customers
    fn get_customer(&self, id: &str) -> Result<Option<Customer>>;
    fn put_customer(&self, customer: &Customer) -> Result<()>;
    fn count_new_customers(&self, since: DateTime<Utc>) -> Result<u64>;
    fn count_repeat_customers(&self, since: DateTime<Utc>) -> Result<u64>;
    /// All customers in arrival order; ranking happens in the metrics
    /// engine so tie-breaking stays stable.
    fn customers_by_arrival(&self) -> Result<Vec<Customer>>;

    // ad spend
    /// Delete the platform's rows within `[since, until]` and insert the
    /// fresh ones in a single transaction. Returns the number deleted.
    fn replace_ad_spend_window(
        &self,
        platform: AdPlatform,
        since: NaiveDate,
        until: NaiveDate,
        rows: &[AdSpend],
    ) -> Result<u64>;
    fn latest_ad_spend_date(&self, platform: AdPlatform) -> Result<Option<NaiveDate>>;
    fn sum_ad_spend_since(&self, since: NaiveDate) -> Result<Decimal>;
}
