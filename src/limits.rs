//! Hard bounds on engine inputs. Out-of-range requests are rejected with
//! `EngineError::LimitExceeded`, never silently clamped.

use crate::model::Minutes;

/// Longest single booking the engine will accept.
pub const MAX_BOOKING_DURATION_MINUTES: Minutes = 24 * 60;

/// Furthest ahead of "today" (shop-local) a date may be queried or booked.
pub const MAX_ADVANCE_DAYS: u64 = 365;

pub const MAX_NOTES_LEN: usize = 2_000;

/// Ceiling on grid size for a single day; stops degenerate step values from
/// producing unbounded slot lists.
pub const MAX_SLOTS_PER_DAY: usize = 1_000;
