mod availability;
mod capacity;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{collect_busy, free_staff, slot_grid, staff_slots};
pub use capacity::{capacity_slots, overlap_count, DEAL_LEAD_MINUTES, DEAL_SLOT_STEP_MINUTES};
pub use error::EngineError;

use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::model::{DayHours, Shop, Span};
use crate::providers::{BookingRepository, Roster, ScheduleProvider};

/// The availability and conflict engine. Purely synchronous; all state comes
/// in through the provider traits on `P`, and "now" is read once per public
/// call so a single request sees one consistent instant.
pub struct Engine<P> {
    pub store: P,
}

impl<P> Engine<P> {
    pub fn new(store: P) -> Self {
        Self { store }
    }
}

impl<P> Engine<P>
where
    P: ScheduleProvider + Roster + BookingRepository,
{
    /// Localized open/close window for `date`, or `None` when the shop is
    /// closed (no hours row, inactive row, or holiday).
    pub(super) fn open_window(&self, shop: &Shop, tz: Tz, date: NaiveDate) -> Option<Span> {
        if self.store.is_holiday(shop.id, date) {
            return None;
        }
        let hours = self.store.day_hours(shop.id, date.weekday())?;
        if !hours.active {
            return None;
        }
        day_window(date, &hours, tz)
    }
}

// ── Timezone localization ────────────────────────────────────────

/// Resolve a shop's IANA timezone, degrading to UTC when the configuration
/// is missing or unrecognized. The fallback is logged and counted: slots
/// computed in the wrong zone look valid, so the signal must not be silent.
pub fn resolve_timezone(shop: &Shop) -> Tz {
    match shop.timezone.as_deref() {
        Some(name) => match name.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(shop = %shop.id, timezone = name, "unrecognized shop timezone, falling back to UTC");
                metrics::counter!(crate::observability::TIMEZONE_FALLBACKS_TOTAL).increment(1);
                Tz::UTC
            }
        },
        None => {
            tracing::warn!(shop = %shop.id, "shop has no timezone configured, falling back to UTC");
            metrics::counter!(crate::observability::TIMEZONE_FALLBACKS_TOTAL).increment(1);
            Tz::UTC
        }
    }
}

/// Shop-local wall time on `date` as a UTC instant. DST-ambiguous times
/// resolve to the earlier offset; times inside a spring-forward gap yield
/// `None`.
fn localize(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    match date.and_time(time).and_local_timezone(tz) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// `[open, close)` for the day as UTC instants. A day whose open or close
/// cannot be represented (DST gap) or whose hours are inverted counts as
/// closed.
pub(crate) fn day_window(date: NaiveDate, hours: &DayHours, tz: Tz) -> Option<Span> {
    let open = localize(date, hours.open, tz)?;
    let close = localize(date, hours.close, tz)?;
    (open < close).then(|| Span::new(open, close))
}

/// The calendar date it currently is at the shop.
pub(crate) fn local_today(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}
