use chrono::{DateTime, Duration, Utc};
use ulid::Ulid;

use crate::limits::MAX_SLOTS_PER_DAY;
use crate::model::*;

// ── Slot grid ────────────────────────────────────────────────────

/// Ordered candidate windows `[start, start + duration)` over `window`,
/// advancing by `step`, stopping once a window would spill past the close.
///
/// Windows starting before `min_start` are skipped entirely — never
/// truncated — so the grid cadence stays uniform across the day.
pub fn slot_grid(
    window: &Span,
    duration_minutes: Minutes,
    step_minutes: Minutes,
    min_start: Option<DateTime<Utc>>,
) -> Vec<Span> {
    let mut slots = Vec::new();
    if duration_minutes <= 0 || step_minutes <= 0 {
        return slots;
    }
    let duration = Duration::minutes(duration_minutes);
    let step = Duration::minutes(step_minutes);

    let mut start = window.start;
    let mut steps = 0usize;
    while start + duration <= window.end {
        steps += 1;
        if steps > MAX_SLOTS_PER_DAY {
            break;
        }
        if min_start.is_none_or(|min| start >= min) {
            slots.push(Span::new(start, start + duration));
        }
        start = start + step;
    }
    slots
}

// ── Busy intervals ───────────────────────────────────────────────

/// Busy intervals for `staff_ids` from active bookings plus manual blocks.
/// Shop-wide blocks (no staff set) fan out to one interval per staff member.
///
/// No merging: duplicates are harmless because callers only ever test "does
/// any interval overlap this slot".
pub fn collect_busy(
    staff_ids: &[Ulid],
    bookings: &[Booking],
    blocks: &[ManualBlock],
) -> Vec<BusyInterval> {
    let mut busy = Vec::new();
    for booking in bookings {
        if !booking.is_active() {
            continue;
        }
        if let Some(staff_id) = booking.kind.staff_id()
            && staff_ids.contains(&staff_id)
        {
            busy.push(BusyInterval {
                staff_id,
                span: booking.span,
            });
        }
    }
    for block in blocks {
        match block.staff_id {
            Some(staff_id) => {
                if staff_ids.contains(&staff_id) {
                    busy.push(BusyInterval {
                        staff_id,
                        span: block.span,
                    });
                }
            }
            None => busy.extend(staff_ids.iter().map(|&staff_id| BusyInterval {
                staff_id,
                span: block.span,
            })),
        }
    }
    busy
}

// ── Staff availability ───────────────────────────────────────────

/// Eligible staff minus everyone with a busy interval overlapping `slot`.
/// Preserves the (sorted) order of `eligible`.
pub fn free_staff(slot: &Span, eligible: &[Ulid], busy: &[BusyInterval]) -> Vec<Ulid> {
    let mut free: Vec<Ulid> = eligible.to_vec();
    for interval in busy {
        if interval.span.overlaps(slot) {
            free.retain(|&s| s != interval.staff_id);
        }
    }
    free
}

/// Grid slots that still have at least one free staff member, each carrying
/// its free-staff list. Slots with nobody free are omitted.
pub fn staff_slots(grid: &[Span], eligible: &[Ulid], busy: &[BusyInterval]) -> Vec<StaffSlot> {
    grid.iter()
        .filter_map(|slot| {
            let free = free_staff(slot, eligible, busy);
            (!free.is_empty()).then(|| StaffSlot {
                span: *slot,
                free_staff: free,
            })
        })
        .collect()
}
