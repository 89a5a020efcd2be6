//! Stripe charge connector.
//!
//! REST with a bearer secret key against `/v1/charges`, cursor pagination
//! (`starting_after` + `has_more`). Balance transactions are expanded in
//! the same request so processing fees ride along with each charge.
//! Amounts arrive as integer minor units and are normalized to two-place
//! decimals.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

use super::{read_json, ChargeSource, Page};
use crate::config::{require, Config};
use crate::error::{Error, Result};
use crate::money;
use crate::types::{NormalizedCharge, WindowBounds};

const CHARGES_URL: &str = "https://api.stripe.com/v1/charges";

/// Metadata key carrying the external order reference set at checkout.
const ORDER_REF_KEY: &str = "order_id";

pub struct StripeConnector {
    client: reqwest::Client,
    secret_key: String,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
struct ChargeList {
    data: Vec<StripeCharge>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct StripeCharge {
    id: String,
    created: i64,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    amount_refunded: i64,
    /// Present as an object because the request expands it; null until the
    /// charge settles.
    #[serde(default)]
    balance_transaction: Option<BalanceTransaction>,
}

#[derive(Debug, Deserialize)]
struct BalanceTransaction {
    #[serde(default)]
    fee: i64,
}

impl StripeConnector {
    pub fn from_config(config: &Config, client: reqwest::Client) -> Result<Self> {
        Ok(Self {
            client,
            secret_key: require(&config.stripe_secret_key, "STRIPE_SECRET_KEY")?.to_string(),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl ChargeSource for StripeConnector {
    async fn fetch_page(
        &self,
        window: &WindowBounds,
        cursor: Option<String>,
    ) -> Result<Page<NormalizedCharge>> {
        let mut query = vec![
            ("created[gte]", window.since.timestamp().to_string()),
            ("created[lte]", window.until.timestamp().to_string()),
            ("limit", self.page_size.to_string()),
            ("expand[]", "data.balance_transaction".to_string()),
        ];
        if let Some(after) = cursor {
            query.push(("starting_after", after));
        }

        let response = self
            .client
            .get(CHARGES_URL)
            .bearer_auth(&self.secret_key)
            .query(&query)
            .send()
            .await?;

        let list: ChargeList = read_json(response).await?;
        let next = if list.has_more {
            list.data.last().map(|charge| charge.id.clone())
        } else {
            None
        };
        let records = list
            .data
            .into_iter()
            .map(normalize_charge)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page { records, next })
    }
}

fn normalize_charge(raw: StripeCharge) -> Result<NormalizedCharge> {
    let created_at = DateTime::from_timestamp(raw.created, 0)
        .ok_or_else(|| Error::MalformedRecord(format!("charge {} has invalid created", raw.id)))?;
    let fee = raw
        .balance_transaction
        .map(|bt| money::from_minor_units(bt.fee))
        .unwrap_or_default();

    Ok(NormalizedCharge {
        order_ref: raw
            .metadata
            .get(ORDER_REF_KEY)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        id: raw.id,
        fee,
        refunded: money::from_minor_units(raw.amount_refunded),
        created_at,
    })
}
