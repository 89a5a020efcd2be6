//! Query facade.
//!
//! The only surface external consumers (dashboard, chat tooling) touch.
//! Stateless pass-through to the metrics engine that clamps request
//! bounds before they reach the store.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::metrics::{self, KpiSummary, TopCustomer};
use crate::store::Store;

pub const MIN_SINCE_DAYS: u32 = 1;
pub const MAX_SINCE_DAYS: u32 = 365;
pub const DEFAULT_SINCE_DAYS: u32 = 30;

pub const MIN_LIMIT: usize = 1;
pub const MAX_LIMIT: usize = 50;
pub const DEFAULT_LIMIT: usize = 10;

/// KPI summary plus the window it was computed over.
#[derive(Debug, Clone, Serialize)]
pub struct KpiAnswer {
    pub since: DateTime<Utc>,
    #[serde(flatten)]
    pub kpis: KpiSummary,
}

#[derive(Clone)]
pub struct QueryFacade {
    store: Arc<dyn Store>,
}

impl QueryFacade {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// KPI summary for the last `since_days` days, clamped to 1–365.
    pub fn kpi_summary(&self, since_days: u32) -> Result<KpiAnswer> {
        self.kpi_summary_at(since_days, Utc::now())
    }

    fn kpi_summary_at(&self, since_days: u32, now: DateTime<Utc>) -> Result<KpiAnswer> {
        let days = since_days.clamp(MIN_SINCE_DAYS, MAX_SINCE_DAYS);
        let since = now - Duration::days(days as i64);
        Ok(KpiAnswer {
            since,
            kpis: metrics::kpi_summary(self.store.as_ref(), since)?,
        })
    }

    /// Top customers by lifetime net revenue, limit clamped to 1–50.
    pub fn top_customers(&self, limit: usize) -> Result<Vec<TopCustomer>> {
        metrics::top_customers(self.store.as_ref(), limit.clamp(MIN_LIMIT, MAX_LIMIT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::Customer;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn facade_with_customers(n: usize) -> QueryFacade {
        let store = SqliteStore::open_in_memory().unwrap();
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        for i in 0..n {
            store
                .put_customer(&Customer {
                    id: format!("c{i}@example.com"),
                    email: Some(format!("c{i}@example.com")),
                    first_order_date: at,
                    last_order_date: at,
                    order_count: 1,
                    total_spent: Decimal::from(i as i64),
                    total_refunds: Decimal::ZERO,
                    total_net: Decimal::from(i as i64),
                    ltv_estimate: Decimal::from(i as i64),
                })
                .unwrap();
        }
        QueryFacade::new(Arc::new(store))
    }

    #[test]
    fn test_limit_clamped_to_upper_bound() {
        let facade = facade_with_customers(60);
        assert_eq!(facade.top_customers(500).unwrap().len(), MAX_LIMIT);
    }

    #[test]
    fn test_limit_clamped_to_lower_bound() {
        let facade = facade_with_customers(5);
        assert_eq!(facade.top_customers(0).unwrap().len(), 1);
    }

    #[test]
    fn test_since_days_clamped() {
        let facade = facade_with_customers(0);
        let now = Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap();

        let answer = facade.kpi_summary_at(0, now).unwrap();
        assert_eq!(answer.since, now - Duration::days(MIN_SINCE_DAYS as i64));

        let answer = facade.kpi_summary_at(10_000, now).unwrap();
        assert_eq!(answer.since, now - Duration::days(MAX_SINCE_DAYS as i64));
    }
}
