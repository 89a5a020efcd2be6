//! Meta Ads spend connector.
//!
//! REST with API-key (`access_token` query parameter) auth against the
//! Graph API insights edge, campaign level, one row per campaign-day.
//! Pagination follows `paging.cursors.after` while `paging.next` is
//! present.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use super::{read_json, AdSpendSource, Page};
use crate::config::{require, Config};
use crate::error::{Error, Result};
use crate::money;
use crate::types::{AdPlatform, NormalizedAdRow, WindowBounds};

const GRAPH_BASE: &str = "https://graph.facebook.com/v19.0";

pub struct MetaConnector {
    client: reqwest::Client,
    access_token: String,
    ad_account_id: String,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
struct InsightsPage {
    #[serde(default)]
    data: Vec<InsightRow>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    cursors: Option<Cursors>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Cursors {
    #[serde(default)]
    after: Option<String>,
}

/// One campaign-day insight row. The Graph API sends every numeric field
/// as a string.
#[derive(Debug, Deserialize)]
struct InsightRow {
    date_start: String,
    #[serde(default)]
    campaign_name: Option<String>,
    #[serde(default)]
    spend: Option<String>,
    #[serde(default)]
    impressions: Option<String>,
    #[serde(default)]
    clicks: Option<String>,
}

impl MetaConnector {
    pub fn from_config(config: &Config, client: reqwest::Client) -> Result<Self> {
        Ok(Self {
            client,
            access_token: require(&config.meta_access_token, "META_ACCESS_TOKEN")?.to_string(),
            ad_account_id: require(&config.meta_ad_account_id, "META_AD_ACCOUNT_ID")?.to_string(),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl AdSpendSource for MetaConnector {
    fn platform(&self) -> AdPlatform {
        AdPlatform::Meta
    }

    async fn fetch_page(
        &self,
        window: &WindowBounds,
        cursor: Option<String>,
    ) -> Result<Page<NormalizedAdRow>> {
        let url = format!("{GRAPH_BASE}/act_{}/insights", self.ad_account_id);
        let time_range = format!(
            r#"{{"since":"{}","until":"{}"}}"#,
            window.since.date_naive(),
            window.until.date_naive()
        );

        let mut query = vec![
            ("level", "campaign".to_string()),
            ("time_increment", "1".to_string()),
            ("fields", "campaign_name,spend,impressions,clicks".to_string()),
            ("time_range", time_range),
            ("limit", self.page_size.to_string()),
            ("access_token", self.access_token.clone()),
        ];
        if let Some(after) = cursor {
            query.push(("after", after));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        let page: InsightsPage = read_json(response).await?;

        // A cursor is only worth following while the API advertises a next
        // page; the final page still carries cursors.
        let next = page.paging.as_ref().and_then(|p| {
            p.next
                .as_ref()
                .and_then(|_| p.cursors.as_ref())
                .and_then(|c| c.after.clone())
        });
        let records = page
            .data
            .into_iter()
            .map(normalize_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page { records, next })
    }
}

fn normalize_row(raw: InsightRow) -> Result<NormalizedAdRow> {
    let date = raw
        .date_start
        .parse::<NaiveDate>()
        .map_err(|_| Error::MalformedRecord(format!("unparseable insight date: {:?}", raw.date_start)))?;

    Ok(NormalizedAdRow {
        date,
        campaign: raw.campaign_name.filter(|c| !c.is_empty()),
        spend: money::parse_amount(raw.spend.as_deref())?,
        impressions: raw.impressions.as_deref().and_then(|v| v.parse().ok()),
        clicks: raw.clicks.as_deref().and_then(|v| v.parse().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_normalize_campaign_day_row() {
        let raw: InsightRow = serde_json::from_str(
            r#"{
                "date_start": "2025-07-01",
                "date_stop": "2025-07-01",
                "campaign_name": "summer-sale",
                "spend": "42.17",
                "impressions": "10544",
                "clicks": "312"
            }"#,
        )
        .unwrap();

        let row = normalize_row(raw).unwrap();
        assert_eq!(row.date, "2025-07-01".parse::<NaiveDate>().unwrap());
        assert_eq!(row.campaign.as_deref(), Some("summer-sale"));
        assert_eq!(row.spend, "42.17".parse::<Decimal>().unwrap());
        assert_eq!(row.impressions, Some(10544));
        assert_eq!(row.clicks, Some(312));
    }

    #[test]
    fn test_missing_numerics_default_to_zero_or_absent() {
        let raw: InsightRow =
            serde_json::from_str(r#"{ "date_start": "2025-07-01" }"#).unwrap();
        let row = normalize_row(raw).unwrap();
        assert_eq!(row.spend, Decimal::ZERO);
        assert!(row.campaign.is_none());
        assert!(row.impressions.is_none());
        assert!(row.clicks.is_none());
    }

    #[test]
    fn test_cursor_only_followed_while_next_present() {
        let last_page: InsightsPage = serde_json::from_str(
            r#"{ "data": [], "paging": { "cursors": { "after": "xyz" } } }"#,
        )
        .unwrap();
        let paging = last_page.paging.unwrap();
        assert!(paging.next.is_none());

        let mid_page: InsightsPage = serde_json::from_str(
            r#"{ "data": [], "paging": { "cursors": { "after": "xyz" },
                 "next": "https://graph.facebook.com/..." } }"#,
        )
        .unwrap();
        let paging = mid_page.paging.unwrap();
        assert!(paging.next.is_some());
        assert_eq!(paging.cursors.unwrap().after.as_deref(), Some("xyz"));
    }

    #[test]
    fn test_bad_date_is_malformed() {
        let raw: InsightRow =
            serde_json::from_str(r#"{ "date_start": "July 1" }"#).unwrap();
        assert!(normalize_row(raw).is_err());
    }
}
