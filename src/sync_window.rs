//! Sync window resolution.
//!
//! Computes the `[since, until]` range a connector should request. Pure
//! with respect to the store: the caller passes the persisted
//! high-water-mark in, and no writes happen here.

use chrono::{DateTime, Duration, Utc};

use crate::types::WindowBounds;

/// Lookback for an explicit full backfill with no start given.
pub const FULL_BACKFILL_DAYS: i64 = 365;

/// Overlap subtracted from the high-water-mark so upstream records that
/// arrive out of strict chronological order are still revisited.
pub const OVERLAP_DAYS: i64 = 1;

/// Lookback when no prior data exists and nothing explicit was asked for.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 90;

/// Caller-supplied window parameters, straight off the trigger request.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowRequest {
    pub after: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub full: bool,
}

/// Resolve the window to request from an upstream.
///
/// Precedence:
/// 1. explicit `after` (and optional `until`)
/// 2. `full` backfill: a fixed long lookback
/// 3. high-water-mark minus the overlap margin
/// 4. the short default lookback
pub fn resolve(
    request: &WindowRequest,
    high_water_mark: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> WindowBounds {
    let until = request.until.unwrap_or(now);

    let since = if let Some(after) = request.after {
        after
    } else if request.full {
        now - Duration::days(FULL_BACKFILL_DAYS)
    } else if let Some(hwm) = high_water_mark {
        hwm - Duration::days(OVERLAP_DAYS)
    } else {
        now - Duration::days(DEFAULT_LOOKBACK_DAYS)
    };

    WindowBounds { since, until }
}
