use ulid::Ulid;

use crate::model::*;

/// Deal grids always advance by a fixed step, independent of deal duration,
/// so overlapping package windows share capacity fairly across the day.
pub const DEAL_SLOT_STEP_MINUTES: Minutes = 30;

/// Fixed lead time before the soonest bookable deal start on the current day.
pub const DEAL_LEAD_MINUTES: Minutes = 15;

/// Active deal bookings whose span overlaps `slot`, minus `exclude` (used by
/// reschedules so a booking never counts against itself).
pub fn overlap_count(slot: &Span, bookings: &[Booking], exclude: Option<Ulid>) -> u32 {
    bookings
        .iter()
        .filter(|b| b.is_active() && b.kind.is_deal())
        .filter(|b| exclude != Some(b.id))
        .filter(|b| b.span.overlaps(slot))
        .count() as u32
}

/// Capacity view of every grid slot. Unlike service slots, fully booked
/// slots stay in the result with `slots_left = 0` so callers can show
/// "fully booked" instead of hiding the time.
pub fn capacity_slots(
    grid: &[Span],
    bookings: &[Booking],
    max_concurrent: u32,
    exclude: Option<Ulid>,
) -> Vec<CapacitySlot> {
    grid.iter()
        .map(|slot| CapacitySlot {
            span: *slot,
            slots_left: max_concurrent.saturating_sub(overlap_count(slot, bookings, exclude)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::slot_grid;
    use chrono::{DateTime, TimeZone, Utc};

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 3, h, m, 0).unwrap()
    }

    fn deal_booking(start: DateTime<Utc>, minutes: Minutes) -> Booking {
        Booking {
            id: Ulid::new(),
            customer_id: Ulid::new(),
            shop_id: Ulid::new(),
            kind: BookingKind::Deal { deal_id: Ulid::new() },
            span: Span::from_start(start, minutes),
            status: BookingStatus::Pending,
            notes: None,
            cancellation: None,
        }
    }

    #[test]
    fn scenario_two_overlapping_bookings_capacity_three() {
        // max_concurrent = 3, two pending deal bookings overlapping
        // 14:00–15:30 → the 14:00 slot reports slots_left = 1.
        let window = Span::new(t(9, 0), t(18, 0));
        let grid = slot_grid(&window, 90, DEAL_SLOT_STEP_MINUTES, None);
        let bookings = vec![deal_booking(t(14, 0), 90), deal_booking(t(14, 30), 90)];
        let slots = capacity_slots(&grid, &bookings, 3, None);

        let at_14 = slots.iter().find(|s| s.span.start == t(14, 0)).unwrap();
        assert_eq!(at_14.slots_left, 1);
        assert!(at_14.is_available());
    }

    #[test]
    fn full_slots_kept_with_zero_left() {
        let window = Span::new(t(9, 0), t(12, 0));
        let grid = slot_grid(&window, 60, DEAL_SLOT_STEP_MINUTES, None);
        let bookings = vec![deal_booking(t(9, 0), 60)];
        let slots = capacity_slots(&grid, &bookings, 1, None);

        assert_eq!(slots.len(), grid.len());
        let at_9 = slots.iter().find(|s| s.span.start == t(9, 0)).unwrap();
        assert_eq!(at_9.slots_left, 0);
        assert!(!at_9.is_available());
        // 10:00 does not overlap the 09:00–10:00 booking.
        let at_10 = slots.iter().find(|s| s.span.start == t(10, 0)).unwrap();
        assert_eq!(at_10.slots_left, 1);
    }

    #[test]
    fn capacity_conservation() {
        let window = Span::new(t(9, 0), t(18, 0));
        let grid = slot_grid(&window, 60, DEAL_SLOT_STEP_MINUTES, None);
        let bookings = vec![
            deal_booking(t(9, 0), 120),
            deal_booking(t(10, 0), 60),
            deal_booking(t(10, 30), 90),
            deal_booking(t(16, 0), 60),
        ];
        let max = 4;
        for slot in capacity_slots(&grid, &bookings, max, None) {
            let overlapping = overlap_count(&slot.span, &bookings, None);
            assert_eq!(slot.slots_left + overlapping, max);
        }
    }

    #[test]
    fn slots_left_never_negative() {
        let window = Span::new(t(9, 0), t(11, 0));
        let grid = slot_grid(&window, 60, DEAL_SLOT_STEP_MINUTES, None);
        let bookings = vec![
            deal_booking(t(9, 0), 120),
            deal_booking(t(9, 0), 120),
            deal_booking(t(9, 30), 60),
        ];
        for slot in capacity_slots(&grid, &bookings, 1, None) {
            assert_eq!(slot.slots_left, 0);
        }
    }

    #[test]
    fn excluded_booking_not_counted() {
        let window = Span::new(t(9, 0), t(12, 0));
        let grid = slot_grid(&window, 60, DEAL_SLOT_STEP_MINUTES, None);
        let bookings = vec![deal_booking(t(9, 0), 60)];
        let excluded = bookings[0].id;
        let slots = capacity_slots(&grid, &bookings, 1, Some(excluded));
        assert!(slots.iter().all(|s| s.slots_left == 1));
    }

    #[test]
    fn non_deal_and_inactive_bookings_ignored() {
        let slot = Span::new(t(9, 0), t(10, 0));
        let mut cancelled = deal_booking(t(9, 0), 60);
        cancelled.status = BookingStatus::Cancelled;
        let mut service = deal_booking(t(9, 0), 60);
        service.kind = BookingKind::Service {
            service_id: Ulid::new(),
            staff_id: Ulid::new(),
        };
        assert_eq!(overlap_count(&slot, &[cancelled, service], None), 0);
    }
}
