use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// How many alternative slots a conflict rejection carries.
pub(crate) const ALTERNATIVE_SUGGESTIONS: usize = 5;

pub(crate) fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

pub(crate) fn validate_duration(minutes: Minutes) -> Result<(), EngineError> {
    if minutes <= 0 {
        return Err(EngineError::LimitExceeded("duration must be positive"));
    }
    if minutes > MAX_BOOKING_DURATION_MINUTES {
        return Err(EngineError::LimitExceeded("duration too long"));
    }
    Ok(())
}

pub(crate) fn validate_notes(notes: Option<&str>) -> Result<(), EngineError> {
    if notes.is_some_and(|n| n.len() > MAX_NOTES_LEN) {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    Ok(())
}

/// First active booking of `staff_id` overlapping `span`, skipping `exclude`.
/// The single overlap predicate decides; this is the reassignment check and
/// the busy test share one code path.
pub(crate) fn find_collision<'a>(
    staff_id: Ulid,
    span: &Span,
    bookings: &'a [Booking],
    exclude: Option<Ulid>,
) -> Option<&'a Booking> {
    bookings.iter().find(|b| {
        b.is_active()
            && exclude != Some(b.id)
            && b.kind.staff_id() == Some(staff_id)
            && b.span.overlaps(span)
    })
}

/// Up to [`ALTERNATIVE_SUGGESTIONS`] service slots that are not the slot the
/// caller just failed to get.
pub(crate) fn staff_alternatives(slots: &[StaffSlot], requested_start: DateTime<Utc>) -> Vec<Span> {
    slots
        .iter()
        .filter(|s| s.span.start != requested_start)
        .map(|s| s.span)
        .take(ALTERNATIVE_SUGGESTIONS)
        .collect()
}

/// Up to [`ALTERNATIVE_SUGGESTIONS`] deal slots with capacity left, skipping
/// the requested start.
pub(crate) fn capacity_alternatives(
    slots: &[CapacitySlot],
    requested_start: DateTime<Utc>,
) -> Vec<Span> {
    slots
        .iter()
        .filter(|s| s.is_available() && s.span.start != requested_start)
        .map(|s| s.span)
        .take(ALTERNATIVE_SUGGESTIONS)
        .collect()
}
