//! Deterministic chat fallback.
//!
//! Builds a grounded, templated KPI summary straight from the query
//! facade. The model-backed assistant (tool-calling loop over the same
//! facade) lives outside this service; this text is what callers get
//! when no language-model credential is configured.

use crate::error::Result;
use crate::facade::{QueryFacade, DEFAULT_SINCE_DAYS};

const TOP_CUSTOMER_COUNT: usize = 5;

/// Render the current KPIs and top customers as one sentence of plain
/// text over the default 30-day window.
pub fn fallback_summary(facade: &QueryFacade) -> Result<String> {
    let answer = facade.kpi_summary(DEFAULT_SINCE_DAYS)?;
    let customers = facade.top_customers(TOP_CUSTOMER_COUNT)?;

    let kpis = &answer.kpis;
    let customer_list = if customers.is_empty() {
        "none yet".to_string()
    } else {
        customers
            .iter()
            .map(|c| {
                format!(
                    "{} ({} orders, ${})",
                    c.email,
                    c.order_count,
                    c.total_net.round_dp(2)
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    };

    Ok(format!(
        "KPIs for the last {DEFAULT_SINCE_DAYS} days: Gross {}, Net {}, AOV {}, \
         Repeat Rate {:.1}%, ROAS {}x. Top customers: {}.",
        kpis.gross.round_dp(2),
        kpis.net.round_dp(2),
        kpis.aov.round_dp(2),
        kpis.repeat_rate * 100.0,
        kpis.roas.round_dp(2),
        customer_list
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SqliteStore, Store};
    use crate::types::{Customer, Order};
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_summary_on_empty_store() {
        let facade = QueryFacade::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let text = fallback_summary(&facade).unwrap();
        assert!(text.contains("Gross 0"));
        assert!(text.contains("Top customers: none yet."));
    }

    #[test]
    fn test_summary_reflects_store_contents() {
        let store = SqliteStore::open_in_memory().unwrap();
        let recent = Utc::now() - Duration::days(2);
        store
            .put_order(&Order {
                id: "1".to_string(),
                identity_key: "jane@example.com".to_string(),
                customer_email: Some("jane@example.com".to_string()),
                created_at: recent,
                gross_total: d("150.00"),
                net_total: d("150.00"),
                refund_total: Decimal::ZERO,
                fees_total: Decimal::ZERO,
            })
            .unwrap();
        store
            .put_customer(&Customer {
                id: "jane@example.com".to_string(),
                email: Some("jane@example.com".to_string()),
                first_order_date: recent,
                last_order_date: recent,
                order_count: 1,
                total_spent: d("150.00"),
                total_refunds: Decimal::ZERO,
                total_net: d("150.00"),
                ltv_estimate: d("150.00"),
            })
            .unwrap();

        let facade = QueryFacade::new(Arc::new(store));
        let text = fallback_summary(&facade).unwrap();
        assert!(text.contains("Gross 150.00"), "got: {text}");
        assert!(text.contains("jane@example.com (1 orders, $150.00)"));
    }
}
