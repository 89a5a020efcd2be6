//! Upstream source connectors.
//!
//! Each connector speaks its platform's protocol (query-string auth for
//! WooCommerce, bearer token for Stripe, API-key parameter for Meta) but
//! exposes the same page-at-a-time contract to the reconciler: ask for a
//! page, get normalized records plus an opaque cursor for the next one.
//! Connectors never retry and never paginate in parallel; a non-success
//! response fails the pass immediately with the status and a truncated
//! body, and the scheduler re-runs the whole idempotent pass.

pub mod meta;
pub mod stripe;
pub mod woo;

pub use meta::MetaConnector;
pub use stripe::StripeConnector;
pub use woo::WooConnector;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::types::{AdPlatform, NormalizedAdRow, NormalizedCharge, NormalizedOrder, WindowBounds};

/// One page of normalized records. `next = None` means the sequence is
/// exhausted; anything else is the cursor for the following fetch.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub next: Option<String>,
}

#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn fetch_page(
        &self,
        window: &WindowBounds,
        cursor: Option<String>,
    ) -> Result<Page<NormalizedOrder>>;
}

#[async_trait]
pub trait ChargeSource: Send + Sync {
    async fn fetch_page(
        &self,
        window: &WindowBounds,
        cursor: Option<String>,
    ) -> Result<Page<NormalizedCharge>>;
}

#[async_trait]
pub trait AdSpendSource: Send + Sync {
    fn platform(&self) -> AdPlatform;

    async fn fetch_page(
        &self,
        window: &WindowBounds,
        cursor: Option<String>,
    ) -> Result<Page<NormalizedAdRow>>;
}

/// Read a JSON response body, turning a non-success status into
/// `UpstreamFetch` (with the body truncated) and a shape mismatch into
/// `MalformedRecord`.
pub(crate) async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::upstream(status.as_u16(), &body));
    }
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| Error::MalformedRecord(format!("upstream page did not match schema: {e}")))
}
