//! merchflow — commerce ETL pipeline and KPI engine.
//!
//! Ingests orders (WooCommerce), charges (Stripe), and ad spend (Meta)
//! through page-at-a-time connectors, reconciles them into a canonical
//! SQLite store with idempotent writes, and serves KPI queries (gross,
//! net, AOV, repeat rate, ROAS) plus top-customer rankings over it.
//!
//! Data flows one direction:
//! connector → sync window resolver → reconciler → aggregator → store →
//! metrics engine → query facade.

pub mod aggregate;
pub mod chat;
pub mod config;
pub mod connectors;
pub mod error;
pub mod facade;
pub mod metrics;
pub mod money;
pub mod reconcile;
pub mod server;
pub mod store;
pub mod sync_window;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
