//! Read-side KPI computation.
//!
//! Pure functions over the persisted store for a given lookback instant.
//! Monetary math stays in `Decimal` end to end; only the repeat rate is a
//! plain ratio.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::Result;
use crate::store::Store;

/// Point-in-time KPI values over a window.
#[derive(Debug, Clone, Serialize)]
pub struct KpiSummary {
    pub gross: Decimal,
    pub net: Decimal,
    pub aov: Decimal,
    pub repeat_rate: f64,
    pub roas: Decimal,
}

/// One row of the top-customer ranking.
#[derive(Debug, Clone, Serialize)]
pub struct TopCustomer {
    pub email: String,
    pub order_count: u32,
    pub total_net: Decimal,
}

/// Average order value: gross divided by order count, zero for an empty
/// window.
pub fn aov(gross: Decimal, count: u64) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        gross / Decimal::from(count)
    }
}

/// Fraction of active customers in the window with more than one lifetime
/// order. Zero when the window saw no customers at all.
pub fn repeat_rate(new_customers: u64, repeat_customers: u64) -> f64 {
    let denom = new_customers + repeat_customers;
    if denom == 0 {
        0.0
    } else {
        repeat_customers as f64 / denom as f64
    }
}

/// Return on ad spend: gross divided by spend, zero when nothing was
/// spent.
pub fn roas(gross: Decimal, ad_spend: Decimal) -> Decimal {
    if ad_spend > Decimal::ZERO {
        gross / ad_spend
    } else {
        Decimal::ZERO
    }
}

/// Compute the KPI summary for orders, customers, and ad spend at or
/// after `since`.
pub fn kpi_summary(store: &dyn Store, since: DateTime<Utc>) -> Result<KpiSummary> {
    let totals = store.order_totals_since(since)?;
    let new_customers = store.count_new_customers(since)?;
    let repeat_customers = store.count_repeat_customers(since)?;
    let ad_spend = store.sum_ad_spend_since(since.date_naive())?;

    Ok(KpiSummary {
        gross: totals.gross,
        net: totals.net,
        aov: aov(totals.gross, totals.count),
        repeat_rate: repeat_rate(new_customers, repeat_customers),
        roas: roas(totals.gross, ad_spend),
    })
}

/// Top customers by lifetime net revenue, descending. Ties keep arrival
/// order (the sort is stable over rows read in insertion order).
pub fn top_customers(store: &dyn Store, limit: usize) -> Result<Vec<TopCustomer>> {
    let mut customers = store.customers_by_arrival()?;
    customers.sort_by(|a, b| b.total_net.cmp(&a.total_net));
    customers.truncate(limit);
    Ok(customers
        .into_iter()
        .map(|c| TopCustomer {
            email: c.email.unwrap_or_else(|| c.id.clone()),
            order_count: c.order_count,
            total_net: c.total_net,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{AdPlatform, AdSpend, Customer, Order};
    use chrono::{NaiveDate, TimeZone};

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_aov_is_arithmetic_mean() {
        // aov([{gross:50},{gross:150}]) = 100
        assert_eq!(aov(d("200"), 2), d("100"));
        // aov([]) = 0
        assert_eq!(aov(Decimal::ZERO, 0), Decimal::ZERO);
    }

    #[test]
    fn test_repeat_rate() {
        assert!((repeat_rate(80, 20) - 0.2).abs() < 1e-9);
        assert_eq!(repeat_rate(0, 0), 0.0);
    }

    #[test]
    fn test_roas_guards_zero_spend() {
        assert_eq!(roas(d("300"), d("100")), d("3"));
        assert_eq!(roas(d("300"), Decimal::ZERO), Decimal::ZERO);
    }

    fn seed_order(store: &SqliteStore, id: &str, day: u32, gross: &str, net: &str) {
        let order = Order {
            id: id.to_string(),
            identity_key: format!("{id}@example.com"),
            customer_email: Some(format!("{id}@example.com")),
            created_at: ts(day),
            gross_total: d(gross),
            net_total: d(net),
            refund_total: Decimal::ZERO,
            fees_total: Decimal::ZERO,
        };
        store.put_order(&order).unwrap();
    }

    fn seed_customer(store: &SqliteStore, id: &str, count: u32, net: &str, first: u32, last: u32) {
        store
            .put_customer(&Customer {
                id: id.to_string(),
                email: Some(id.to_string()),
                first_order_date: ts(first),
                last_order_date: ts(last),
                order_count: count,
                total_spent: d(net),
                total_refunds: Decimal::ZERO,
                total_net: d(net),
                ltv_estimate: d(net),
            })
            .unwrap();
    }

    #[test]
    fn test_kpi_summary_over_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed_order(&store, "1", 10, "100.00", "100.00");
        seed_order(&store, "2", 12, "200.00", "140.00");
        // Outside the window
        seed_order(&store, "0", 1, "999.00", "999.00");

        seed_customer(&store, "new@x.com", 1, "100.00", 10, 10);
        seed_customer(&store, "repeat@x.com", 2, "140.00", 1, 12);

        store
            .replace_ad_spend_window(
                AdPlatform::Meta,
                "2025-06-09".parse::<NaiveDate>().unwrap(),
                "2025-06-12".parse::<NaiveDate>().unwrap(),
                &[AdSpend {
                    platform: AdPlatform::Meta,
                    date: "2025-06-10".parse().unwrap(),
                    campaign: None,
                    spend: d("100.00"),
                    impressions: None,
                    clicks: None,
                }],
            )
            .unwrap();

        let kpis = kpi_summary(&store, ts(9)).unwrap();
        assert_eq!(kpis.gross, d("300.00"));
        assert_eq!(kpis.net, d("240.00"));
        assert_eq!(kpis.aov, d("150.00"));
        // One new + one repeat active in the window
        assert!((kpis.repeat_rate - 0.5).abs() < 1e-9);
        assert_eq!(kpis.roas, d("3"));
    }

    #[test]
    fn test_top_customers_ranking_and_stable_ties() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed_customer(&store, "small@x.com", 1, "10.00", 1, 1);
        seed_customer(&store, "tie-first@x.com", 2, "50.00", 1, 2);
        seed_customer(&store, "big@x.com", 4, "400.00", 1, 3);
        seed_customer(&store, "tie-second@x.com", 1, "50.00", 1, 4);

        let top = top_customers(&store, 3).unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].email, "big@x.com");
        // Equal totals keep arrival order
        assert_eq!(top[1].email, "tie-first@x.com");
        assert_eq!(top[2].email, "tie-second@x.com");
    }

    #[test]
    fn test_top_customers_limit() {
        let store = SqliteStore::open_in_memory().unwrap();
        seed_customer(&store, "a@x.com", 1, "10.00", 1, 1);
        let top = top_customers(&store, 10).unwrap();
        assert_eq!(top.len(), 1);
    }
}
