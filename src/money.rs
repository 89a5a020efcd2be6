//! Fixed-point money helpers.
//!
//! Every monetary value in the pipeline is a `rust_decimal::Decimal`:
//! parsed here at the connector boundary, aggregated as `Decimal`, and
//! persisted as decimal text. Binary floats never hold money.

use rust_decimal::Decimal;

use crate::error::{Error, Result};

/// Parse an upstream monetary string, treating an absent or empty field as
/// zero. Upstream APIs send money as strings ("129.99"); a present but
/// unparseable value is a malformed record, not a silent zero.
pub fn parse_amount(raw: Option<&str>) -> Result<Decimal> {
    match raw {
        None => Ok(Decimal::ZERO),
        Some(s) if s.trim().is_empty() => Ok(Decimal::ZERO),
        Some(s) => s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| Error::MalformedRecord(format!("unparseable amount: {s:?}"))),
    }
}

/// Convert integer minor units (e.g. Stripe cents) to a Decimal.
pub fn from_minor_units(units: i64) -> Decimal {
    Decimal::new(units, 2)
}

/// Net total for an order: `max(0, gross - refund - fees)`.
pub fn net_total(gross: Decimal, refund: Decimal, fees: Decimal) -> Decimal {
    let net = gross - refund - fees;
    if net.is_sign_negative() {
        Decimal::ZERO
    } else {
        net
    }
}

/// Serialize a Decimal for a TEXT column.
pub fn to_db(amount: Decimal) -> String {
    amount.to_string()
}

/// Parse a Decimal read back from a TEXT column. Stored values are our own
/// output, so failure here means the store is corrupt.
pub fn from_db(text: &str) -> Result<Decimal> {
    text.parse::<Decimal>()
        .map_err(|_| Error::MalformedRecord(format!("corrupt stored amount: {text:?}")))
}
