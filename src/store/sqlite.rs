//! SQLite implementation of the `Store` repository.
//!
//! Schema lives in `/sql`, one numbered file per table, all `IF NOT
//! EXISTS` so the loader is idempotent. Monetary columns are decimal text
//! and are never summed in SQL; totals fold `Decimal` values in Rust.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use super::{OrderTotals, Store};
use crate::error::{Error, Result};
use crate::money;
use crate::types::{AdPlatform, AdSpend, CouponUsage, Customer, Order};

const SCHEMA: &[&str] = &[
    include_str!("../../sql/01_orders.sql"),
    include_str!("../../sql/02_coupon_usages.sql"),
    include_str!("../../sql/03_customers.sql"),
    include_str!("../../sql/04_ad_spend.sql"),
];

/// Run the embedded schema migrations. Safe to call on every startup.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    for sql in SCHEMA {
        conn.execute_batch(sql)?;
    }
    Ok(())
}

/// SQLite-backed store. The connection is held behind a mutex; each
/// ingestion run is a single sequential batch, so contention is between
/// runs, not within one.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and apply migrations.
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn timestamp_to_datetime(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| Error::MalformedRecord(format!("corrupt stored timestamp: {ts}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    raw.parse::<NaiveDate>()
        .map_err(|_| Error::MalformedRecord(format!("corrupt stored date: {raw:?}")))
}

/// Raw order row as read from SQLite, before decimal/timestamp parsing.
type RawOrderRow = (String, String, Option<String>, i64, String, String, String, String);

fn order_from_row(row: RawOrderRow) -> Result<Order> {
    let (id, identity_key, customer_email, created_at, gross, net, refund, fees) = row;
    Ok(Order {
        id,
        identity_key,
        customer_email,
        created_at: timestamp_to_datetime(created_at)?,
        gross_total: money::from_db(&gross)?,
        net_total: money::from_db(&net)?,
        refund_total: money::from_db(&refund)?,
        fees_total: money::from_db(&fees)?,
    })
}

type RawCustomerRow = (
    String,
    Option<String>,
    i64,
    i64,
    u32,
    String,
    String,
    String,
    String,
);

fn customer_from_row(row: RawCustomerRow) -> Result<Customer> {
    let (id, email, first, last, order_count, spent, refunds, net, ltv) = row;
    Ok(Customer {
        id,
        email,
        first_order_date: timestamp_to_datetime(first)?,
        last_order_date: timestamp_to_datetime(last)?,
        order_count,
        total_spent: money::from_db(&spent)?,
        total_refunds: money::from_db(&refunds)?,
        total_net: money::from_db(&net)?,
        ltv_estimate: money::from_db(&ltv)?,
    })
}

const SELECT_ORDER: &str = "SELECT id, identity_key, customer_email, created_at, \
     gross_total, net_total, refund_total, fees_total FROM orders";

const SELECT_CUSTOMER: &str = "SELECT id, email, first_order_date, last_order_date, \
     order_count, total_spent, total_refunds, total_net, ltv_estimate FROM customers";

impl Store for SqliteStore {
    fn get_order(&self, id: &str) -> Result<Option<Order>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<RawOrderRow> = conn
            .query_row(
                &format!("{SELECT_ORDER} WHERE id = ?1"),
                params![id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()?;
        row.map(order_from_row).transpose()
    }

    fn put_order(&self, order: &Order) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO orders (
                id, identity_key, customer_email, created_at,
                gross_total, net_total, refund_total, fees_total, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                identity_key = excluded.identity_key,
                customer_email = excluded.customer_email,
                created_at = excluded.created_at,
                gross_total = excluded.gross_total,
                net_total = excluded.net_total,
                refund_total = excluded.refund_total,
                fees_total = excluded.fees_total,
                updated_at = excluded.updated_at
            "#,
            params![
                order.id,
                order.identity_key,
                order.customer_email,
                order.created_at.timestamp(),
                money::to_db(order.gross_total),
                money::to_db(order.net_total),
                money::to_db(order.refund_total),
                money::to_db(order.fees_total),
                Utc::now().timestamp(),
            ],
        )?;
        Ok(())
    }

    fn orders_for_identity(&self, identity_key: &str) -> Result<Vec<Order>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_ORDER} WHERE identity_key = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt
            .query_map(params![identity_key], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<std::result::Result<Vec<RawOrderRow>, _>>()?;
        rows.into_iter().map(order_from_row).collect()
    }

    fn latest_order_created_at(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let ts: Option<i64> =
            conn.query_row("SELECT MAX(created_at) FROM orders", [], |row| row.get(0))?;
        ts.map(timestamp_to_datetime).transpose()
    }

    fn order_totals_since(&self, since: DateTime<Utc>) -> Result<OrderTotals> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT gross_total, net_total FROM orders WHERE created_at >= ?1")?;
        let rows = stmt
            .query_map(params![since.timestamp()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<(String, String)>, _>>()?;

        let mut totals = OrderTotals {
            gross: Decimal::ZERO,
            net: Decimal::ZERO,
            count: 0,
        };
        for (gross, net) in rows {
            totals.gross += money::from_db(&gross)?;
            totals.net += money::from_db(&net)?;
            totals.count += 1;
        }
        Ok(totals)
    }

    fn replace_coupon_usages(&self, order_id: &str, rows: &[CouponUsage]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM coupon_usages WHERE order_id = ?1",
            params![order_id],
        )?;
        for usage in rows {
            tx.execute(
                "INSERT INTO coupon_usages (order_id, code, discount, customer_email) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    usage.order_id,
                    usage.code,
                    money::to_db(usage.discount),
                    usage.customer_email,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn coupon_usages_for_order(&self, order_id: &str) -> Result<Vec<CouponUsage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT order_id, code, discount, customer_email FROM coupon_usages \
             WHERE order_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![order_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(order_id, code, discount, customer_email)| {
                Ok(CouponUsage {
                    order_id,
                    code,
                    discount: money::from_db(&discount)?,
                    customer_email,
                })
            })
            .collect()
    }

    fn get_customer(&self, id: &str) -> Result<Option<Customer>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<RawCustomerRow> = conn
            .query_row(
                &format!("{SELECT_CUSTOMER} WHERE id = ?1"),
                params![id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                    ))
                },
            )
            .optional()?;
        row.map(customer_from_row).transpose()
    }

    fn put_customer(&self, customer: &Customer) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        // ON CONFLICT rather than INSERT OR REPLACE: updates keep the row's
        // rowid, which is the arrival order top-customer ties rely on.
        conn.execute(
            r#"
            INSERT INTO customers (
                id, email, first_order_date, last_order_date, order_count,
                total_spent, total_refunds, total_net, ltv_estimate, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                first_order_date = excluded.first_order_date,
                last_order_date = excluded.last_order_date,
                order_count = excluded.order_count,
                total_spent = excluded.total_spent,
                total_refunds = excluded.total_refunds,
                total_net = excluded.total_net,
                ltv_estimate = excluded.ltv_estimate,
                updated_at = excluded.updated_at
            "#,
            params![
                customer.id,
                customer.email,
                customer.first_order_date.timestamp(),
                customer.last_order_date.timestamp(),
                customer.order_count,
                money::to_db(customer.total_spent),
                money::to_db(customer.total_refunds),
                money::to_db(customer.total_net),
                money::to_db(customer.ltv_estimate),
                Utc::now().timestamp(),
            ],
        )?;
        Ok(())
    }

    fn count_new_customers(&self, since: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM customers WHERE first_order_date >= ?1",
            params![since.timestamp()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_repeat_customers(&self, since: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM customers WHERE order_count > 1 AND last_order_date >= ?1",
            params![since.timestamp()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn customers_by_arrival(&self) -> Result<Vec<Customer>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{SELECT_CUSTOMER} ORDER BY rowid"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            })?
            .collect::<std::result::Result<Vec<RawCustomerRow>, _>>()?;
        rows.into_iter().map(customer_from_row).collect()
    }

    fn replace_ad_spend_window(
        &self,
        platform: AdPlatform,
        since: NaiveDate,
        until: NaiveDate,
        rows: &[AdSpend],
    ) -> Result<u64> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM ad_spend WHERE platform = ?1 AND date >= ?2 AND date <= ?3",
            params![platform.as_str(), since.to_string(), until.to_string()],
        )?;
        let now = Utc::now().timestamp();
        for row in rows {
            tx.execute(
                "INSERT INTO ad_spend (platform, date, campaign, spend, impressions, clicks, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row.platform.as_str(),
                    row.date.to_string(),
                    row.campaign,
                    money::to_db(row.spend),
                    row.impressions,
                    row.clicks,
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(deleted as u64)
    }

    fn latest_ad_spend_date(&self, platform: AdPlatform) -> Result<Option<NaiveDate>> {
        let conn = self.conn.lock().unwrap();
        let date: Option<String> = conn.query_row(
            "SELECT MAX(date) FROM ad_spend WHERE platform = ?1",
            params![platform.as_str()],
            |row| row.get(0),
        )?;
        date.as_deref().map(parse_date).transpose()
    }

    fn sum_ad_spend_since(&self, since: NaiveDate) -> Result<Decimal> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT spend FROM ad_spend WHERE date >= ?1")?;
        let rows = stmt
            .query_map(params![since.to_string()], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        let mut total = Decimal::ZERO;
        for spend in rows {
            total += money::from_db(&spend)?;
        }
        Ok(total)
    }
}
