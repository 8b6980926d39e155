use chrono::{DateTime, Duration, Utc};
use ulid::Ulid;

use crate::model::*;
use crate::observability::{
    REASSIGNMENTS_TOTAL, RESERVATIONS_TOTAL, RESERVATION_CONFLICTS_TOTAL, STALE_SLOTS_TOTAL,
};
use crate::providers::{BookingRepository, BookingTxn, Roster, ScheduleProvider};

use super::availability::{collect_busy, free_staff, slot_grid, staff_slots};
use super::capacity::{capacity_slots, overlap_count, DEAL_LEAD_MINUTES, DEAL_SLOT_STEP_MINUTES};
use super::conflict::{
    capacity_alternatives, find_collision, now_utc, staff_alternatives, validate_duration,
    validate_notes,
};
use super::queries::validate_date;
use super::{local_today, resolve_timezone, Engine, EngineError};

impl<P> Engine<P>
where
    P: ScheduleProvider + Roster + BookingRepository,
{
    /// Validate and persist a new booking. The availability the caller read
    /// is re-derived inside the shop transaction before the insert; a racing
    /// writer that took the slot first turns this into `StaleSlot` with
    /// fresh alternatives.
    pub fn reserve(&self, request: ReservationRequest) -> Result<Booking, EngineError> {
        self.reserve_at(request, now_utc())
    }

    pub(super) fn reserve_at(
        &self,
        request: ReservationRequest,
        now: DateTime<Utc>,
    ) -> Result<Booking, EngineError> {
        validate_notes(request.notes.as_deref())?;
        let ReservationRequest {
            id,
            customer_id,
            item,
            start,
            notes,
        } = request;
        match item {
            ReservationItem::Service {
                service_id,
                staff_id,
            } => self.reserve_service(id, customer_id, service_id, staff_id, start, notes, now),
            ReservationItem::Deal { deal_id } => {
                self.reserve_deal(id, customer_id, deal_id, start, notes, now)
            }
        }
    }

    fn reserve_service(
        &self,
        id: Ulid,
        customer_id: Ulid,
        service_id: Ulid,
        requested_staff: Option<Ulid>,
        start: DateTime<Utc>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Booking, EngineError> {
        let service = self
            .store
            .service(service_id)
            .ok_or(EngineError::NotFound(service_id))?;
        if !service.active {
            return Err(EngineError::Inactive(service_id));
        }
        validate_duration(service.duration_minutes)?;
        let shop = self
            .store
            .shop(service.shop_id)
            .ok_or(EngineError::NotFound(service.shop_id))?;
        let tz = resolve_timezone(&shop);
        let today = local_today(tz, now);
        let date = start.with_timezone(&tz).date_naive();
        validate_date(date, today)?;
        let window = self
            .open_window(&shop, tz, date)
            .ok_or(EngineError::ShopClosed)?;

        let eligible = self.store.eligible_staff(service_id);
        if eligible.is_empty() {
            return Err(EngineError::NoEligibleStaff);
        }
        if let Some(staff_id) = requested_staff {
            let staff = self
                .store
                .staff(staff_id)
                .ok_or(EngineError::NotFound(staff_id))?;
            if !staff.active {
                return Err(EngineError::Inactive(staff_id));
            }
            if staff.shop_id != shop.id || !eligible.contains(&staff_id) {
                return Err(EngineError::IneligibleStaff(staff_id));
            }
        }

        let min_start = (date == today).then(|| now + Duration::minutes(service.buffer_minutes));
        let grid = slot_grid(
            &window,
            service.duration_minutes,
            service.duration_minutes,
            min_start,
        );
        let requested = Span::from_start(start, service.duration_minutes);

        // Read-time check: the request must name a slot the grid surfaces,
        // with the wanted staff (or anyone, for auto-assignment) still free.
        let open = self.service_open_slots(shop.id, &grid, &eligible, &window, None);
        let free_now = open
            .iter()
            .find(|s| s.span.start == start)
            .is_some_and(|s| match requested_staff {
                Some(staff_id) => s.free_staff.contains(&staff_id),
                None => true,
            });
        if !free_now {
            metrics::counter!(RESERVATION_CONFLICTS_TOTAL, "kind" => "service").increment(1);
            return Err(EngineError::SlotNotAvailable {
                alternatives: staff_alternatives(&open, start),
            });
        }

        // Commit-time re-check inside the shop transaction.
        let result = self.store.with_txn(shop.id, |txn| {
            if txn.booking(id).is_some() {
                return Err(EngineError::AlreadyExists(id));
            }
            let bookings = txn.active_service_bookings(&eligible, &window);
            let blocks = txn.manual_blocks(&window);
            let busy = collect_busy(&eligible, &bookings, &blocks);
            let free = free_staff(&requested, &eligible, &busy);
            let staff_id = match requested_staff {
                Some(staff_id) if free.contains(&staff_id) => staff_id,
                // Auto-assign: eligible list is sorted, so the first free
                // entry is the lowest id — deterministic across retries.
                None if !free.is_empty() => free[0],
                _ => {
                    let open = staff_slots(&grid, &eligible, &busy);
                    return Err(EngineError::StaleSlot {
                        alternatives: staff_alternatives(&open, start),
                    });
                }
            };
            let booking = Booking {
                id,
                customer_id,
                shop_id: shop.id,
                kind: BookingKind::Service {
                    service_id,
                    staff_id,
                },
                span: requested,
                status: BookingStatus::Pending,
                notes,
                cancellation: None,
            };
            txn.insert(booking.clone());
            Ok(booking)
        });
        record_reserve_outcome("service", &result);
        result
    }

    fn reserve_deal(
        &self,
        id: Ulid,
        customer_id: Ulid,
        deal_id: Ulid,
        start: DateTime<Utc>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Booking, EngineError> {
        let deal = self
            .store
            .deal(deal_id)
            .ok_or(EngineError::NotFound(deal_id))?;
        if !deal.active {
            return Err(EngineError::Inactive(deal_id));
        }
        validate_duration(deal.duration_minutes)?;
        let shop = self
            .store
            .shop(deal.shop_id)
            .ok_or(EngineError::NotFound(deal.shop_id))?;
        let tz = resolve_timezone(&shop);
        let today = local_today(tz, now);
        let date = start.with_timezone(&tz).date_naive();
        validate_date(date, today)?;
        let window = self
            .open_window(&shop, tz, date)
            .ok_or(EngineError::ShopClosed)?;

        let min_start = (date == today).then(|| now + Duration::minutes(DEAL_LEAD_MINUTES));
        let grid = slot_grid(&window, deal.duration_minutes, DEAL_SLOT_STEP_MINUTES, min_start);
        let requested = Span::from_start(start, deal.duration_minutes);
        let max = shop.max_concurrent_deal_bookings;

        let bookings = self.store.active_deal_bookings(shop.id, &window);
        let slots = capacity_slots(&grid, &bookings, max, None);
        let Some(slot) = slots.iter().find(|s| s.span.start == start) else {
            metrics::counter!(RESERVATION_CONFLICTS_TOTAL, "kind" => "deal").increment(1);
            return Err(EngineError::SlotNotAvailable {
                alternatives: capacity_alternatives(&slots, start),
            });
        };
        if !slot.is_available() {
            metrics::counter!(RESERVATION_CONFLICTS_TOTAL, "kind" => "deal").increment(1);
            return Err(EngineError::CapacityExceeded {
                alternatives: capacity_alternatives(&slots, start),
            });
        }

        let result = self.store.with_txn(shop.id, |txn| {
            if txn.booking(id).is_some() {
                return Err(EngineError::AlreadyExists(id));
            }
            let bookings = txn.active_deal_bookings(&window);
            if overlap_count(&requested, &bookings, None) >= max {
                let slots = capacity_slots(&grid, &bookings, max, None);
                return Err(EngineError::StaleSlot {
                    alternatives: capacity_alternatives(&slots, start),
                });
            }
            let booking = Booking {
                id,
                customer_id,
                shop_id: shop.id,
                kind: BookingKind::Deal { deal_id },
                span: requested,
                status: BookingStatus::Pending,
                notes,
                cancellation: None,
            };
            txn.insert(booking.clone());
            Ok(booking)
        });
        record_reserve_outcome("deal", &result);
        result
    }

    /// Move an active booking to a new start. Identical checks to `reserve`,
    /// except the booking never counts against its own busy/capacity
    /// accounting — moving inside its own window is legal.
    pub fn reschedule(
        &self,
        booking_id: Ulid,
        new_start: DateTime<Utc>,
    ) -> Result<Booking, EngineError> {
        self.reschedule_at(booking_id, new_start, now_utc())
    }

    pub(super) fn reschedule_at(
        &self,
        booking_id: Ulid,
        new_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Booking, EngineError> {
        let booking = self
            .store
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if !booking.status.is_active() {
            return Err(EngineError::BookingClosed {
                booking_id,
                status: booking.status,
            });
        }
        match booking.kind {
            BookingKind::Service {
                service_id,
                staff_id,
            } => self.reschedule_service(&booking, service_id, staff_id, new_start, now),
            BookingKind::Deal { deal_id } => {
                self.reschedule_deal(&booking, deal_id, new_start, now)
            }
        }
    }

    fn reschedule_service(
        &self,
        booking: &Booking,
        service_id: Ulid,
        staff_id: Ulid,
        new_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Booking, EngineError> {
        let service = self
            .store
            .service(service_id)
            .ok_or(EngineError::NotFound(service_id))?;
        validate_duration(service.duration_minutes)?;
        let shop = self
            .store
            .shop(booking.shop_id)
            .ok_or(EngineError::NotFound(booking.shop_id))?;
        let tz = resolve_timezone(&shop);
        let today = local_today(tz, now);
        let date = new_start.with_timezone(&tz).date_naive();
        validate_date(date, today)?;
        let window = self
            .open_window(&shop, tz, date)
            .ok_or(EngineError::ShopClosed)?;
        let eligible = self.store.eligible_staff(service_id);

        let min_start = (date == today).then(|| now + Duration::minutes(service.buffer_minutes));
        let grid = slot_grid(
            &window,
            service.duration_minutes,
            service.duration_minutes,
            min_start,
        );
        let requested = Span::from_start(new_start, service.duration_minutes);
        let booking_id = booking.id;
        let staff_set = [staff_id];

        let in_grid = grid.iter().any(|s| s.start == new_start);
        let bookings = exclude(
            self.store
                .active_service_bookings(shop.id, &staff_set, &window),
            booking_id,
        );
        let blocks = self.store.manual_blocks(shop.id, &window);
        let busy = collect_busy(&staff_set, &bookings, &blocks);
        if !in_grid || !free_staff(&requested, &staff_set, &busy).contains(&staff_id) {
            metrics::counter!(RESERVATION_CONFLICTS_TOTAL, "kind" => "service").increment(1);
            let open = self.service_open_slots(shop.id, &grid, &eligible, &window, Some(booking_id));
            return Err(EngineError::SlotNotAvailable {
                alternatives: staff_alternatives(&open, new_start),
            });
        }

        let result = self.store.with_txn(shop.id, |txn| {
            let mut current = txn
                .booking(booking_id)
                .ok_or(EngineError::NotFound(booking_id))?;
            if !current.status.is_active() {
                return Err(EngineError::BookingClosed {
                    booking_id,
                    status: current.status,
                });
            }
            let bookings = exclude(txn.active_service_bookings(&staff_set, &window), booking_id);
            let blocks = txn.manual_blocks(&window);
            let busy = collect_busy(&staff_set, &bookings, &blocks);
            if !free_staff(&requested, &staff_set, &busy).contains(&staff_id) {
                let all = exclude(txn.active_service_bookings(&eligible, &window), booking_id);
                let busy_all = collect_busy(&eligible, &all, &blocks);
                let open = staff_slots(&grid, &eligible, &busy_all);
                return Err(EngineError::StaleSlot {
                    alternatives: staff_alternatives(&open, new_start),
                });
            }
            current.span = requested;
            txn.update(current.clone());
            Ok(current)
        });
        record_reschedule_outcome("service", &result);
        result
    }

    fn reschedule_deal(
        &self,
        booking: &Booking,
        deal_id: Ulid,
        new_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Booking, EngineError> {
        let deal = self
            .store
            .deal(deal_id)
            .ok_or(EngineError::NotFound(deal_id))?;
        validate_duration(deal.duration_minutes)?;
        let shop = self
            .store
            .shop(booking.shop_id)
            .ok_or(EngineError::NotFound(booking.shop_id))?;
        let tz = resolve_timezone(&shop);
        let today = local_today(tz, now);
        let date = new_start.with_timezone(&tz).date_naive();
        validate_date(date, today)?;
        let window = self
            .open_window(&shop, tz, date)
            .ok_or(EngineError::ShopClosed)?;

        let min_start = (date == today).then(|| now + Duration::minutes(DEAL_LEAD_MINUTES));
        let grid = slot_grid(&window, deal.duration_minutes, DEAL_SLOT_STEP_MINUTES, min_start);
        let requested = Span::from_start(new_start, deal.duration_minutes);
        let max = shop.max_concurrent_deal_bookings;
        let booking_id = booking.id;

        let bookings = self.store.active_deal_bookings(shop.id, &window);
        let slots = capacity_slots(&grid, &bookings, max, Some(booking_id));
        let Some(slot) = slots.iter().find(|s| s.span.start == new_start) else {
            metrics::counter!(RESERVATION_CONFLICTS_TOTAL, "kind" => "deal").increment(1);
            return Err(EngineError::SlotNotAvailable {
                alternatives: capacity_alternatives(&slots, new_start),
            });
        };
        if !slot.is_available() {
            metrics::counter!(RESERVATION_CONFLICTS_TOTAL, "kind" => "deal").increment(1);
            return Err(EngineError::CapacityExceeded {
                alternatives: capacity_alternatives(&slots, new_start),
            });
        }

        let result = self.store.with_txn(shop.id, |txn| {
            let mut current = txn
                .booking(booking_id)
                .ok_or(EngineError::NotFound(booking_id))?;
            if !current.status.is_active() {
                return Err(EngineError::BookingClosed {
                    booking_id,
                    status: current.status,
                });
            }
            let bookings = txn.active_deal_bookings(&window);
            if overlap_count(&requested, &bookings, Some(booking_id)) >= max {
                let slots = capacity_slots(&grid, &bookings, max, Some(booking_id));
                return Err(EngineError::StaleSlot {
                    alternatives: capacity_alternatives(&slots, new_start),
                });
            }
            current.span = requested;
            txn.update(current.clone());
            Ok(current)
        });
        record_reschedule_outcome("deal", &result);
        result
    }

    /// Hand a service booking to a different staff member, keeping its time.
    /// The new staff must be active, belong to the shop, be eligible for the
    /// service, differ from the current assignee, and have no overlapping
    /// active booking.
    pub fn reassign_staff(
        &self,
        booking_id: Ulid,
        new_staff_id: Ulid,
    ) -> Result<Booking, EngineError> {
        let booking = self
            .store
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let BookingKind::Service {
            service_id,
            staff_id: current_staff,
        } = booking.kind
        else {
            return Err(EngineError::NotAServiceBooking(booking_id));
        };
        if !booking.status.is_active() {
            return Err(EngineError::BookingClosed {
                booking_id,
                status: booking.status,
            });
        }
        if new_staff_id == current_staff {
            return Err(EngineError::SameStaff(new_staff_id));
        }
        let staff = self
            .store
            .staff(new_staff_id)
            .ok_or(EngineError::NotFound(new_staff_id))?;
        if !staff.active {
            return Err(EngineError::Inactive(new_staff_id));
        }
        if staff.shop_id != booking.shop_id
            || !self.store.eligible_staff(service_id).contains(&new_staff_id)
        {
            return Err(EngineError::IneligibleStaff(new_staff_id));
        }

        let result = self.store.with_txn(booking.shop_id, |txn| {
            let mut current = txn
                .booking(booking_id)
                .ok_or(EngineError::NotFound(booking_id))?;
            if !current.status.is_active() {
                return Err(EngineError::BookingClosed {
                    booking_id,
                    status: current.status,
                });
            }
            let others = txn.active_service_bookings(&[new_staff_id], &current.span);
            if let Some(colliding) =
                find_collision(new_staff_id, &current.span, &others, Some(booking_id))
            {
                return Err(EngineError::ReassignmentConflict {
                    booking_id: colliding.id,
                    span: colliding.span,
                    item: self.item_name(&colliding.kind),
                });
            }
            current.kind = BookingKind::Service {
                service_id,
                staff_id: new_staff_id,
            };
            txn.update(current.clone());
            Ok(current)
        });
        if let Ok(b) = &result {
            tracing::info!(booking = %b.id, staff = %new_staff_id, "staff reassigned");
            metrics::counter!(REASSIGNMENTS_TOTAL).increment(1);
        }
        result
    }

    /// Drive the booking state machine. `cancellation` metadata is recorded
    /// only when `to` is `Cancelled`.
    pub fn transition(
        &self,
        booking_id: Ulid,
        to: BookingStatus,
        cancellation: Option<Cancellation>,
    ) -> Result<Booking, EngineError> {
        let booking = self
            .store
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let result = self.store.with_txn(booking.shop_id, |txn| {
            let mut current = txn
                .booking(booking_id)
                .ok_or(EngineError::NotFound(booking_id))?;
            if !current.status.can_transition_to(to) {
                return Err(EngineError::InvalidTransition {
                    from: current.status,
                    to,
                });
            }
            current.status = to;
            if to == BookingStatus::Cancelled {
                current.cancellation = cancellation;
            }
            txn.update(current.clone());
            Ok(current)
        });
        if let Ok(b) = &result {
            tracing::info!(booking = %b.id, status = %b.status, "booking status changed");
        }
        result
    }

    pub fn confirm(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        self.transition(booking_id, BookingStatus::Confirmed, None)
    }

    pub fn cancel(
        &self,
        booking_id: Ulid,
        cancellation: Cancellation,
    ) -> Result<Booking, EngineError> {
        self.transition(booking_id, BookingStatus::Cancelled, Some(cancellation))
    }

    /// Open slots from the repository's read path, optionally with one
    /// booking excluded from the accounting (reschedules).
    fn service_open_slots(
        &self,
        shop_id: Ulid,
        grid: &[Span],
        eligible: &[Ulid],
        window: &Span,
        excluded: Option<Ulid>,
    ) -> Vec<StaffSlot> {
        let mut bookings = self
            .store
            .active_service_bookings(shop_id, eligible, window);
        if let Some(id) = excluded {
            bookings.retain(|b| b.id != id);
        }
        let blocks = self.store.manual_blocks(shop_id, window);
        let busy = collect_busy(eligible, &bookings, &blocks);
        staff_slots(grid, eligible, &busy)
    }

    fn item_name(&self, kind: &BookingKind) -> String {
        match kind {
            BookingKind::Service { service_id, .. } => self
                .store
                .service(*service_id)
                .map(|s| s.name)
                .unwrap_or_else(|| "service".into()),
            BookingKind::Deal { deal_id } => self
                .store
                .deal(*deal_id)
                .map(|d| d.name)
                .unwrap_or_else(|| "deal".into()),
        }
    }
}

fn exclude(bookings: Vec<Booking>, id: Ulid) -> Vec<Booking> {
    bookings.into_iter().filter(|b| b.id != id).collect()
}

fn record_reserve_outcome(kind: &'static str, result: &Result<Booking, EngineError>) {
    match result {
        Ok(b) => {
            tracing::info!(booking = %b.id, shop = %b.shop_id, kind, "booking reserved");
            metrics::counter!(RESERVATIONS_TOTAL, "kind" => kind).increment(1);
        }
        Err(EngineError::StaleSlot { .. }) => {
            tracing::warn!(kind, "slot taken between read and commit");
            metrics::counter!(STALE_SLOTS_TOTAL, "kind" => kind).increment(1);
        }
        Err(_) => {}
    }
}

fn record_reschedule_outcome(kind: &'static str, result: &Result<Booking, EngineError>) {
    match result {
        Ok(b) => tracing::info!(booking = %b.id, kind, "booking rescheduled"),
        Err(EngineError::StaleSlot { .. }) => {
            metrics::counter!(STALE_SLOTS_TOTAL, "kind" => kind).increment(1);
        }
        Err(_) => {}
    }
}
