//! WooCommerce order connector.
//!
//! REST with query-string credentials (`consumer_key`/`consumer_secret`)
//! against `/wp-json/wc/v3/orders`. Pagination is by page number in
//! ascending date order; the page after the last full one comes back
//! short (or empty), which ends the sequence.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use super::{read_json, OrderSource, Page};
use crate::config::{require, Config};
use crate::error::{Error, Result};
use crate::money;
use crate::types::{NormalizedCoupon, NormalizedOrder, WindowBounds};

pub struct WooConnector {
    client: reqwest::Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    page_size: u32,
}

/// Wire shape of a WooCommerce order. Deserialization failure of a page
/// is fatal for the pass; optional fields normalize to zero/absent.
#[derive(Debug, Deserialize)]
struct WooOrder {
    id: i64,
    date_created_gmt: String,
    total: String,
    #[serde(default)]
    customer_id: i64,
    #[serde(default)]
    billing: WooBilling,
    #[serde(default)]
    coupon_lines: Vec<WooCouponLine>,
    #[serde(default)]
    refunds: Vec<WooRefund>,
}

#[derive(Debug, Default, Deserialize)]
struct WooBilling {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WooCouponLine {
    code: String,
    #[serde(default)]
    discount: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WooRefund {
    /// Woo reports refund totals as negative amounts.
    #[serde(default)]
    total: Option<String>,
}

impl WooConnector {
    pub fn from_config(config: &Config, client: reqwest::Client) -> Result<Self> {
        Ok(Self {
            client,
            base_url: require(&config.woo_base_url, "WOO_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            consumer_key: require(&config.woo_consumer_key, "WOO_CONSUMER_KEY")?.to_string(),
            consumer_secret: require(&config.woo_consumer_secret, "WOO_CONSUMER_SECRET")?
                .to_string(),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl OrderSource for WooConnector {
    async fn fetch_page(
        &self,
        window: &WindowBounds,
        cursor: Option<String>,
    ) -> Result<Page<NormalizedOrder>> {
        let page: u32 = cursor.as_deref().unwrap_or("1").parse().unwrap_or(1);
        let url = format!("{}/wp-json/wc/v3/orders", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("after", woo_timestamp(window.since)),
                ("before", woo_timestamp(window.until)),
                ("per_page", self.page_size.to_string()),
                ("page", page.to_string()),
                ("orderby", "date".to_string()),
                ("order", "asc".to_string()),
                ("consumer_key", self.consumer_key.clone()),
                ("consumer_secret", self.consumer_secret.clone()),
            ])
            .send()
            .await?;

        let raw: Vec<WooOrder> = read_json(response).await?;
        let full_page = raw.len() as u32 == self.page_size;
        let records = raw
            .into_iter()
            .map(normalize_order)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            records,
            next: full_page.then(|| (page + 1).to_string()),
        })
    }
}

/// Woo's GMT timestamps carry no offset suffix.
fn woo_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn parse_woo_date(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| Error::MalformedRecord(format!("unparseable order date: {raw:?}")))
}

fn normalize_order(raw: WooOrder) -> Result<NormalizedOrder> {
    let refund_total = raw
        .refunds
        .iter()
        .map(|r| money::parse_amount(r.total.as_deref()).map(|amount| amount.abs()))
        .sum::<Result<_>>()?;

    let coupons = raw
        .coupon_lines
        .into_iter()
        .map(|line| {
            Ok(NormalizedCoupon {
                code: line.code,
                discount: money::parse_amount(line.discount.as_deref())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(NormalizedOrder {
        id: raw.id.to_string(),
        email: raw.billing.email.filter(|e| !e.trim().is_empty()),
        platform_customer_id: (raw.customer_id > 0).then(|| raw.customer_id.to_string()),
        created_at: parse_woo_date(&raw.date_created_gmt)?,
        gross_total: money::parse_amount(Some(&raw.total))?,
        refund_total,
        coupons,
    })
}
