//! Data-access seams between the engine and its host application.
//!
//! The engine never reaches into a database or ORM. Everything it needs —
//! schedules, rosters, booking state — arrives through these traits, so the
//! whole engine runs against fabricated data in tests (see `store`).

use chrono::{NaiveDate, Weekday};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::*;

/// Shop reference data: identity, timezone, capacity, weekly hours, holidays.
pub trait ScheduleProvider {
    fn shop(&self, shop_id: Ulid) -> Option<Shop>;

    /// Weekly hours row for one weekday. `None` means closed that day.
    fn day_hours(&self, shop_id: Ulid, weekday: Weekday) -> Option<DayHours>;

    /// Whether the shop is fully closed on `date` regardless of weekly hours.
    fn is_holiday(&self, shop_id: Ulid, date: NaiveDate) -> bool;
}

/// Services, deals and staff, including the service→staff assignment.
pub trait Roster {
    fn service(&self, service_id: Ulid) -> Option<Service>;

    fn deal(&self, deal_id: Ulid) -> Option<Deal>;

    fn staff(&self, staff_id: Ulid) -> Option<StaffMember>;

    /// Active staff of the service's shop explicitly assigned to it, sorted
    /// by id. An empty list means the service cannot be booked at all —
    /// there is no "any staff" fallback.
    fn eligible_staff(&self, service_id: Ulid) -> Vec<Ulid>;
}

/// Transaction-scoped view of one shop's booking state. Reads return fresh
/// data as of the transaction; writes become visible to other transactions
/// only after [`BookingRepository::with_txn`] returns `Ok`.
pub trait BookingTxn {
    /// Active (pending/confirmed) service bookings for any of `staff_ids`
    /// whose span overlaps `window`.
    fn active_service_bookings(&self, staff_ids: &[Ulid], window: &Span) -> Vec<Booking>;

    /// Active deal bookings of the shop whose span overlaps `window`.
    fn active_deal_bookings(&self, window: &Span) -> Vec<Booking>;

    /// Manual blocks of the shop whose span overlaps `window`.
    fn manual_blocks(&self, window: &Span) -> Vec<ManualBlock>;

    fn booking(&self, id: Ulid) -> Option<Booking>;

    fn insert(&mut self, booking: Booking);

    fn update(&mut self, booking: Booking);
}

/// Booking state, split into a read path for availability queries and an
/// atomic write path for commit-time validation.
pub trait BookingRepository {
    /// See [`BookingTxn::active_service_bookings`]; may serve a snapshot.
    fn active_service_bookings(
        &self,
        shop_id: Ulid,
        staff_ids: &[Ulid],
        window: &Span,
    ) -> Vec<Booking>;

    fn active_deal_bookings(&self, shop_id: Ulid, window: &Span) -> Vec<Booking>;

    fn manual_blocks(&self, shop_id: Ulid, window: &Span) -> Vec<ManualBlock>;

    fn booking(&self, id: Ulid) -> Option<Booking>;

    /// Run `f` atomically with respect to every other transaction touching
    /// the same shop. The commit-time conflict re-check and the booking write
    /// must both happen inside `f`; the implementation's isolation is what
    /// serializes two racing writers so the loser observes the winner's row.
    fn with_txn<T>(
        &self,
        shop_id: Ulid,
        f: impl FnOnce(&mut dyn BookingTxn) -> Result<T, EngineError>,
    ) -> Result<T, EngineError>
    where
        Self: Sized;
}
