use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use ulid::Ulid;

use crate::limits::MAX_ADVANCE_DAYS;
use crate::model::*;
use crate::observability::AVAILABILITY_QUERIES_TOTAL;
use crate::providers::{BookingRepository, Roster, ScheduleProvider};

use super::availability::{collect_busy, slot_grid, staff_slots};
use super::capacity::{capacity_slots, DEAL_LEAD_MINUTES, DEAL_SLOT_STEP_MINUTES};
use super::conflict::{now_utc, validate_duration};
use super::{local_today, resolve_timezone, Engine, EngineError};

impl<P> Engine<P>
where
    P: ScheduleProvider + Roster + BookingRepository,
{
    /// Bookable slots for a service on `date`, each with the staff still
    /// free to take it. Closed days and staff-less services yield an empty
    /// list, not an error — the write path is where those become distinct
    /// rejections.
    pub fn service_availability(
        &self,
        service_id: Ulid,
        date: NaiveDate,
        buffer_override: Option<Minutes>,
    ) -> Result<Vec<StaffSlot>, EngineError> {
        metrics::counter!(AVAILABILITY_QUERIES_TOTAL, "kind" => "service").increment(1);
        self.service_availability_at(service_id, date, buffer_override, now_utc())
    }

    pub(super) fn service_availability_at(
        &self,
        service_id: Ulid,
        date: NaiveDate,
        buffer_override: Option<Minutes>,
        now: DateTime<Utc>,
    ) -> Result<Vec<StaffSlot>, EngineError> {
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
        validate_date(date, today)?;

        let Some(window) = self.open_window(&shop, tz, date) else {
            tracing::debug!(shop = %shop.id, %date, "shop closed, no service slots");
            return Ok(Vec::new());
        };

        let eligible = self.store.eligible_staff(service_id);
        if eligible.is_empty() {
            // Deliberate policy: unassigned services are closed for booking.
            tracing::debug!(service = %service_id, "no eligible staff, no slots");
            return Ok(Vec::new());
        }

        let buffer = buffer_override.unwrap_or(service.buffer_minutes);
        let min_start = (date == today).then(|| now + Duration::minutes(buffer));
        let grid = slot_grid(&window, service.duration_minutes, service.duration_minutes, min_start);

        let bookings = self
            .store
            .active_service_bookings(shop.id, &eligible, &window);
        let blocks = self.store.manual_blocks(shop.id, &window);
        let busy = collect_busy(&eligible, &bookings, &blocks);

        Ok(staff_slots(&grid, &eligible, &busy))
    }

    /// Capacity view of a deal's day: every grid slot with its remaining
    /// concurrency budget, including fully booked slots at `slots_left = 0`.
    pub fn deal_availability(
        &self,
        deal_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<CapacitySlot>, EngineError> {
        metrics::counter!(AVAILABILITY_QUERIES_TOTAL, "kind" => "deal").increment(1);
        self.deal_availability_at(deal_id, date, now_utc())
    }

    pub(super) fn deal_availability_at(
        &self,
        deal_id: Ulid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<CapacitySlot>, EngineError> {
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
        validate_date(date, today)?;

        let Some(window) = self.open_window(&shop, tz, date) else {
            tracing::debug!(shop = %shop.id, %date, "shop closed, no deal slots");
            return Ok(Vec::new());
        };

        let min_start = (date == today).then(|| now + Duration::minutes(DEAL_LEAD_MINUTES));
        let grid = slot_grid(&window, deal.duration_minutes, DEAL_SLOT_STEP_MINUTES, min_start);

        let bookings = self.store.active_deal_bookings(shop.id, &window);
        Ok(capacity_slots(
            &grid,
            &bookings,
            shop.max_concurrent_deal_bookings,
            None,
        ))
    }

    /// Effective localized open/close window for `date`, `None` when closed.
    pub fn shop_hours(&self, shop_id: Ulid, date: NaiveDate) -> Result<Option<Span>, EngineError> {
        let shop = self
            .store
            .shop(shop_id)
            .ok_or(EngineError::NotFound(shop_id))?;
        let tz = resolve_timezone(&shop);
        Ok(self.open_window(&shop, tz, date))
    }

    pub fn is_open(&self, shop_id: Ulid, date: NaiveDate) -> Result<bool, EngineError> {
        Ok(self.shop_hours(shop_id, date)?.is_some())
    }
}

pub(super) fn validate_date(date: NaiveDate, today: NaiveDate) -> Result<(), EngineError> {
    if date < today {
        return Err(EngineError::PastDateRequested);
    }
    if date > today + Days::new(MAX_ADVANCE_DAYS) {
        return Err(EngineError::LimitExceeded("date too far ahead"));
    }
    Ok(())
}
