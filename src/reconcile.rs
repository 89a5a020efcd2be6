//! Reconciliation passes.
//!
//! Each pass drives one connector page-by-page (strictly sequential,
//! bounded by the `max_pages` safety valve) and writes through idempotent
//! store paths, so re-running a pass with the same upstream data changes
//! nothing. Fatal errors abort the pass; pages already written stay
//! committed and the next invocation resumes safely.

use crate::aggregate::RunAggregator;
use crate::connectors::{AdSpendSource, ChargeSource, OrderSource};
use crate::error::Result;
use crate::money;
use crate::store::Store;
use crate::types::{
    AdSpend, AdSyncReport, CouponUsage, NormalizedOrder, Order, OrderSyncReport,
    PaymentSyncReport, WindowBounds,
};

/// Ingest orders from the order platform.
///
/// For each record: derive the identity key, upsert the Order by natural
/// id, replace its coupon rows wholesale, and note the identity for the
/// aggregate flush. Fees already attached by the payment pass survive the
/// upsert; a coupon failure is logged and counted, never fatal.
pub async fn sync_orders(
    store: &dyn Store,
    source: &dyn OrderSource,
    window: WindowBounds,
    max_pages: u32,
) -> Result<OrderSyncReport> {
    let mut report = OrderSyncReport {
        processed: 0,
        imported: 0,
        updated: 0,
        coupon_errors: 0,
        customers_flushed: 0,
        window,
    };
    let mut aggregator = RunAggregator::new();
    let mut cursor = None;

    for page_no in 0..max_pages {
        let page = source.fetch_page(&window, cursor).await?;
        log::debug!("orders page {}: {} records", page_no + 1, page.records.len());

        for mut record in page.records {
            report.processed += 1;
            let coupons = std::mem::take(&mut record.coupons);
            let existing = store.get_order(&record.id)?;
            let is_new = existing.is_none();
            let order = merge_order(record, existing.as_ref());

            store.put_order(&order)?;
            if is_new {
                report.imported += 1;
            } else {
                report.updated += 1;
            }
            aggregator.observe(&order);

            let usages: Vec<CouponUsage> = coupons
                .into_iter()
                .map(|coupon| CouponUsage {
                    order_id: order.id.clone(),
                    code: coupon.code,
                    discount: coupon.discount,
                    customer_email: order.customer_email.clone(),
                })
                .collect();
            if let Err(e) = store.replace_coupon_usages(&order.id, &usages) {
                log::warn!("coupon replacement failed for order {}: {e}", order.id);
                report.coupon_errors += 1;
            }
        }

        cursor = page.next;
        if cursor.is_none() {
            break;
        }
        if page_no + 1 == max_pages {
            log::warn!("order sync stopped at the {max_pages}-page safety valve");
        }
    }

    report.customers_flushed = aggregator.flush(store)?;
    log::info!(
        "order sync: {} processed, {} imported, {} updated, {} customers flushed",
        report.processed,
        report.imported,
        report.updated,
        report.customers_flushed
    );
    Ok(report)
}

/// Build the Order row for an incoming record, preserving what the order
/// platform does not know: processing fees belong to the payment pass.
fn merge_order(record: NormalizedOrder, existing: Option<&Order>) -> Order {
    let identity_key = record.identity_key();
    let fees_total = existing.map(|o| o.fees_total).unwrap_or_default();
    Order {
        net_total: money::net_total(record.gross_total, record.refund_total, fees_total),
        id: record.id,
        identity_key,
        customer_email: record.email,
        created_at: record.created_at,
        gross_total: record.gross_total,
        refund_total: record.refund_total,
        fees_total,
    }
}

/// Attach payment fees and refunds to existing orders.
///
/// Charges without an embedded order reference cannot be linked and are
/// counted as skipped; so are references that match no persisted order.
/// This pass never creates orders, but it does re-flush the aggregates of
/// customers whose order totals it changed, keeping Customer rows
/// consistent with the orders attributed to them.
pub async fn sync_payments(
    store: &dyn Store,
    source: &dyn ChargeSource,
    window: WindowBounds,
    max_pages: u32,
) -> Result<PaymentSyncReport> {
    let mut report = PaymentSyncReport {
        processed: 0,
        linked: 0,
        skipped: 0,
        customers_flushed: 0,
        window,
    };
    let mut aggregator = RunAggregator::new();
    let mut cursor = None;

    for page_no in 0..max_pages {
        let page = source.fetch_page(&window, cursor).await?;

        for charge in page.records {
            report.processed += 1;
            let Some(order_ref) = charge.order_ref.as_deref() else {
                report.skipped += 1;
                continue;
            };
            let Some(mut order) = store.get_order(order_ref)? else {
                log::debug!("charge {} references unknown order {order_ref}", charge.id);
                report.skipped += 1;
                continue;
            };

            order.fees_total = charge.fee;
            order.refund_total = charge.refunded;
            order.net_total =
                money::net_total(order.gross_total, order.refund_total, order.fees_total);
            store.put_order(&order)?;
            aggregator.observe(&order);
            report.linked += 1;
        }

        cursor = page.next;
        if cursor.is_none() {
            break;
        }
        if page_no + 1 == max_pages {
            log::warn!("payment sync stopped at the {max_pages}-page safety valve");
        }
    }

    report.customers_flushed = aggregator.flush(store)?;
    log::info!(
        "payment sync: {} processed, {} linked, {} skipped, {} customers flushed",
        report.processed,
        report.linked,
        report.skipped,
        report.customers_flushed
    );
    Ok(report)
}

/// Replace the ads platform's spend rows within the window.
///
/// All pages are collected first so the delete-and-insert happens in one
/// transaction; a mid-fetch failure therefore leaves the previous rows
/// untouched.
pub async fn sync_ad_spend(
    store: &dyn Store,
    source: &dyn AdSpendSource,
    window: WindowBounds,
    max_pages: u32,
) -> Result<AdSyncReport> {
    let platform = source.platform();
    let mut rows: Vec<AdSpend> = Vec::new();
    let mut cursor = None;

    for page_no in 0..max_pages {
        let page = source.fetch_page(&window, cursor).await?;
        rows.extend(page.records.into_iter().map(|r| AdSpend {
            platform,
            date: r.date,
            campaign: r.campaign,
            spend: r.spend,
            impressions: r.impressions,
            clicks: r.clicks,
        }));

        cursor = page.next;
        if cursor.is_none() {
            break;
        }
        if page_no + 1 == max_pages {
            log::warn!("ad spend sync stopped at the {max_pages}-page safety valve");
        }
    }

    let replaced = store.replace_ad_spend_window(
        platform,
        window.since.date_naive(),
        window.until.date_naive(),
        &rows,
    )?;

    log::info!(
        "ad spend sync: {} rows fetched, {} replaced for {}",
        rows.len(),
        replaced,
        platform.as_str()
    );
    Ok(AdSyncReport {
        fetched: rows.len() as u64,
        replaced,
        window,
    })
}
