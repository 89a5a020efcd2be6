//! Per-customer aggregation.
//!
//! `CustomerAggregate` is the pure merge fold: start from one order,
//! merge each further order by incrementing the count, adding monetary
//! contributions, and extending the date bounds. The run-level
//! `RunAggregator` tracks which identity keys a pass touched and, at
//! flush, recomputes each touched customer from its complete persisted
//! order set by folding through that same merge — so a short sync window
//! can never leave a customer's lifetime totals stale.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::store::Store;
use crate::types::{Customer, Order};

/// Rolling aggregate for one identity key.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerAggregate {
    pub identity_key: String,
    pub email: Option<String>,
    pub first_order_date: DateTime<Utc>,
    pub last_order_date: DateTime<Utc>,
    pub order_count: u32,
    pub total_spent: Decimal,
    pub total_refunds: Decimal,
    pub total_net: Decimal,
}

impl CustomerAggregate {
    /// Initialize from a single order.
    pub fn from_order(order: &Order) -> Self {
        Self {
            identity_key: order.identity_key.clone(),
            email: order.customer_email.clone(),
            first_order_date: order.created_at,
            last_order_date: order.created_at,
            order_count: 1,
            total_spent: order.gross_total,
            total_refunds: order.refund_total,
            total_net: order.net_total,
        }
    }

    /// Merge one more order into the aggregate: running sums plus min/max
    /// date extension. Never recomputes from scratch.
    pub fn merge(&mut self, order: &Order) {
        self.order_count += 1;
        self.total_spent += order.gross_total;
        self.total_refunds += order.refund_total;
        self.total_net += order.net_total;
        self.first_order_date = self.first_order_date.min(order.created_at);
        self.last_order_date = self.last_order_date.max(order.created_at);
        if self.email.is_none() {
            self.email = order.customer_email.clone();
        }
    }

    /// Fold a complete order set. `None` for an empty set.
    pub fn from_orders(orders: &[Order]) -> Option<Self> {
        let mut iter = orders.iter();
        let mut agg = Self::from_order(iter.next()?);
        for order in iter {
            agg.merge(order);
        }
        Some(agg)
    }

    /// Materialize as the persisted Customer row. The LTV estimate is
    /// currently the lifetime net total.
    pub fn into_customer(self) -> Customer {
        Customer {
            id: self.identity_key,
            email: self.email,
            first_order_date: self.first_order_date,
            last_order_date: self.last_order_date,
            order_count: self.order_count,
            total_spent: self.total_spent,
            total_refunds: self.total_refunds,
            ltv_estimate: self.total_net,
            total_net: self.total_net,
        }
    }
}

/// Tracks the identity keys one reconciliation pass touches.
#[derive(Debug, Default)]
pub struct RunAggregator {
    touched: HashSet<String>,
}

impl RunAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an order for this identity was processed.
    pub fn observe(&mut self, order: &Order) {
        self.touched.insert(order.identity_key.clone());
    }

    pub fn touched(&self) -> usize {
        self.touched.len()
    }

    /// Recompute and upsert every touched customer from its complete
    /// persisted order set. Returns how many rows were written.
    pub fn flush(&self, store: &dyn Store) -> Result<u64> {
        let mut flushed = 0;
        for identity_key in &self.touched {
            let orders = store.orders_for_identity(identity_key)?;
            if let Some(aggregate) = CustomerAggregate::from_orders(&orders) {
                store.put_customer(&aggregate.into_customer())?;
                flushed += 1;
            }
        }
        Ok(flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap()
    }

    fn order(id: &str, day: u32, gross: &str, refund: &str, fees: &str) -> Order {
        let gross_total = d(gross);
        let refund_total = d(refund);
        let fees_total = d(fees);
        Order {
            id: id.to_string(),
            identity_key: "jane@example.com".to_string(),
            customer_email: Some("jane@example.com".to_string()),
            created_at: ts(day),
            net_total: crate::money::net_total(gross_total, refund_total, fees_total),
            gross_total,
            refund_total,
            fees_total,
        }
    }

    #[test]
    fn test_single_order_aggregate() {
        let agg = CustomerAggregate::from_order(&order("1", 3, "100", "0", "0"));
        assert_eq!(agg.order_count, 1);
        assert_eq!(agg.total_spent, d("100"));
        assert_eq!(agg.total_net, d("100"));
        assert_eq!(agg.first_order_date, ts(3));
        assert_eq!(agg.last_order_date, ts(3));
    }

    #[test]
    fn test_merge_extends_bounds_and_sums() {
        // Order B: gross 200, refund 50, fees 10 -> net 140
        let mut agg = CustomerAggregate::from_order(&order("a", 10, "100", "0", "0"));
        agg.merge(&order("b", 4, "200", "50", "10"));

        assert_eq!(agg.order_count, 2);
        assert_eq!(agg.total_spent, d("300"));
        assert_eq!(agg.total_refunds, d("50"));
        assert_eq!(agg.total_net, d("240"));
        // Out-of-order arrival still lands on the true min/max
        assert_eq!(agg.first_order_date, ts(4));
        assert_eq!(agg.last_order_date, ts(10));
    }

    #[test]
    fn test_fold_matches_pairwise_merge() {
        let orders = vec![
            order("a", 1, "50", "0", "0"),
            order("b", 2, "150", "0", "0"),
            order("c", 3, "30", "25", "10"),
        ];
        let folded = CustomerAggregate::from_orders(&orders).unwrap();
        assert_eq!(folded.order_count, 3);
        assert_eq!(folded.total_spent, d("230"));
        // Order c clamps to net 0 at the order level before aggregation
        assert_eq!(folded.total_net, d("200"));
        assert!(CustomerAggregate::from_orders(&[]).is_none());
    }

    #[test]
    fn test_into_customer_sets_ltv_to_net() {
        let customer =
            CustomerAggregate::from_order(&order("1", 1, "80", "0", "0")).into_customer();
        assert_eq!(customer.id, "jane@example.com");
        assert_eq!(customer.ltv_estimate, customer.total_net);
    }

    #[test]
    fn test_run_aggregator_flush_recomputes_from_store() {
        let store = crate::store::SqliteStore::open_in_memory().unwrap();
        // An older order already persisted, outside any plausible window
        let old = order("old", 1, "500", "0", "0");
        store.put_order(&old).unwrap();

        let fresh = order("new", 20, "100", "0", "0");
        store.put_order(&fresh).unwrap();

        let mut agg = RunAggregator::new();
        agg.observe(&fresh);
        assert_eq!(agg.touched(), 1);
        assert_eq!(agg.flush(&store).unwrap(), 1);

        // The flushed row covers the full history, not just this run
        let customer = store.get_customer("jane@example.com").unwrap().unwrap();
        assert_eq!(customer.order_count, 2);
        assert_eq!(customer.total_spent, d("600"));
        assert_eq!(customer.first_order_date, ts(1));
        assert_eq!(customer.last_order_date, ts(20));
    }
}
