//! In-memory reference implementation of every provider trait.
//!
//! Each shop's booking state lives in its own `RwLock`ed ledger, so
//! `with_txn` serializes all writers of a shop on one lock while leaving
//! other shops untouched. Reference data (shops, hours, rosters) sits in
//! plain concurrent maps.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{NaiveDate, Weekday};
use dashmap::DashMap;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::*;
use crate::providers::{BookingRepository, BookingTxn, Roster, ScheduleProvider};

/// Bookings and manual blocks of a single shop, both sorted by `span.start`.
#[derive(Debug, Default)]
pub struct ShopLedger {
    bookings: Vec<Booking>,
    blocks: Vec<ManualBlock>,
}

impl ShopLedger {
    fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.span.start < booking.span.start);
        self.bookings.insert(pos, booking);
    }

    fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    fn get(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Bookings whose span overlaps the window. Binary search skips
    /// everything starting at or after `window.end`.
    fn overlapping_bookings<'a>(&'a self, window: &'a Span) -> impl Iterator<Item = &'a Booking> {
        let right = self
            .bookings
            .partition_point(|b| b.span.start < window.end);
        self.bookings[..right]
            .iter()
            .filter(move |b| b.span.end > window.start)
    }

    fn service_bookings(&self, staff_ids: &[Ulid], window: &Span) -> Vec<Booking> {
        self.overlapping_bookings(window)
            .filter(|b| b.is_active())
            .filter(|b| b.kind.staff_id().is_some_and(|s| staff_ids.contains(&s)))
            .cloned()
            .collect()
    }

    fn deal_bookings(&self, window: &Span) -> Vec<Booking> {
        self.overlapping_bookings(window)
            .filter(|b| b.is_active() && b.kind.is_deal())
            .cloned()
            .collect()
    }

    fn blocks_in(&self, window: &Span) -> Vec<ManualBlock> {
        self.blocks
            .iter()
            .filter(|blk| blk.span.overlaps(window))
            .cloned()
            .collect()
    }
}

pub struct InMemoryStore {
    shops: DashMap<Ulid, Shop>,
    hours: DashMap<(Ulid, Weekday), DayHours>,
    holidays: DashMap<Ulid, HashSet<NaiveDate>>,
    services: DashMap<Ulid, Service>,
    deals: DashMap<Ulid, Deal>,
    staff: DashMap<Ulid, StaffMember>,
    /// service id → assigned staff ids
    assignments: DashMap<Ulid, Vec<Ulid>>,
    ledgers: DashMap<Ulid, Arc<RwLock<ShopLedger>>>,
    /// Reverse lookup: booking id → shop id.
    booking_to_shop: DashMap<Ulid, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            shops: DashMap::new(),
            hours: DashMap::new(),
            holidays: DashMap::new(),
            services: DashMap::new(),
            deals: DashMap::new(),
            staff: DashMap::new(),
            assignments: DashMap::new(),
            ledgers: DashMap::new(),
            booking_to_shop: DashMap::new(),
        }
    }

    // ── Seeding ──────────────────────────────────────────────

    pub fn add_shop(&self, shop: Shop) {
        self.shops.insert(shop.id, shop);
    }

    pub fn set_day_hours(&self, shop_id: Ulid, weekday: Weekday, hours: DayHours) {
        self.hours.insert((shop_id, weekday), hours);
    }

    /// Same hours for all seven weekdays.
    pub fn set_week_hours(&self, shop_id: Ulid, hours: DayHours) {
        use Weekday::*;
        for weekday in [Mon, Tue, Wed, Thu, Fri, Sat, Sun] {
            self.set_day_hours(shop_id, weekday, hours);
        }
    }

    pub fn add_holiday(&self, shop_id: Ulid, date: NaiveDate) {
        self.holidays.entry(shop_id).or_default().insert(date);
    }

    pub fn add_service(&self, service: Service) {
        self.services.insert(service.id, service);
    }

    pub fn add_deal(&self, deal: Deal) {
        self.deals.insert(deal.id, deal);
    }

    pub fn add_staff(&self, member: StaffMember) {
        self.staff.insert(member.id, member);
    }

    /// Assign a staff member to a service. Idempotent.
    pub fn assign_service(&self, staff_id: Ulid, service_id: Ulid) {
        let mut assigned = self.assignments.entry(service_id).or_default();
        if !assigned.contains(&staff_id) {
            assigned.push(staff_id);
        }
    }

    pub fn add_manual_block(&self, block: ManualBlock) {
        let ledger = self.ledger(block.shop_id);
        let mut guard = ledger.write().unwrap_or_else(PoisonError::into_inner);
        guard.blocks.push(block);
        guard.blocks.sort_by_key(|b| b.span.start);
    }

    /// Insert a booking directly, bypassing engine validation. Fixture use.
    pub fn insert_booking(&self, booking: Booking) {
        let ledger = self.ledger(booking.shop_id);
        let mut guard = ledger.write().unwrap_or_else(PoisonError::into_inner);
        self.booking_to_shop.insert(booking.id, booking.shop_id);
        guard.insert_booking(booking);
    }

    pub fn booking_count(&self, shop_id: Ulid) -> usize {
        self.ledger(shop_id)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .bookings
            .len()
    }

    fn ledger(&self, shop_id: Ulid) -> Arc<RwLock<ShopLedger>> {
        self.ledgers.entry(shop_id).or_default().clone()
    }
}

// ── Provider impls ───────────────────────────────────────────────

impl ScheduleProvider for InMemoryStore {
    fn shop(&self, shop_id: Ulid) -> Option<Shop> {
        self.shops.get(&shop_id).map(|s| s.value().clone())
    }

    fn day_hours(&self, shop_id: Ulid, weekday: Weekday) -> Option<DayHours> {
        self.hours.get(&(shop_id, weekday)).map(|h| *h.value())
    }

    fn is_holiday(&self, shop_id: Ulid, date: NaiveDate) -> bool {
        self.holidays
            .get(&shop_id)
            .is_some_and(|dates| dates.contains(&date))
    }
}

impl Roster for InMemoryStore {
    fn service(&self, service_id: Ulid) -> Option<Service> {
        self.services.get(&service_id).map(|s| s.value().clone())
    }

    fn deal(&self, deal_id: Ulid) -> Option<Deal> {
        self.deals.get(&deal_id).map(|d| d.value().clone())
    }

    fn staff(&self, staff_id: Ulid) -> Option<StaffMember> {
        self.staff.get(&staff_id).map(|s| s.value().clone())
    }

    fn eligible_staff(&self, service_id: Ulid) -> Vec<Ulid> {
        let Some(service) = self.service(service_id) else {
            return Vec::new();
        };
        let Some(assigned) = self.assignments.get(&service_id) else {
            return Vec::new();
        };
        let mut eligible: Vec<Ulid> = assigned
            .iter()
            .filter(|id| {
                self.staff
                    .get(*id)
                    .is_some_and(|s| s.active && s.shop_id == service.shop_id)
            })
            .copied()
            .collect();
        eligible.sort();
        eligible
    }
}

struct LedgerTxn<'a> {
    shop_id: Ulid,
    ledger: &'a mut ShopLedger,
    booking_to_shop: &'a DashMap<Ulid, Ulid>,
}

impl BookingTxn for LedgerTxn<'_> {
    fn active_service_bookings(&self, staff_ids: &[Ulid], window: &Span) -> Vec<Booking> {
        self.ledger.service_bookings(staff_ids, window)
    }

    fn active_deal_bookings(&self, window: &Span) -> Vec<Booking> {
        self.ledger.deal_bookings(window)
    }

    fn manual_blocks(&self, window: &Span) -> Vec<ManualBlock> {
        self.ledger.blocks_in(window)
    }

    fn booking(&self, id: Ulid) -> Option<Booking> {
        self.ledger.get(id).cloned()
    }

    fn insert(&mut self, booking: Booking) {
        self.booking_to_shop.insert(booking.id, self.shop_id);
        self.ledger.insert_booking(booking);
    }

    fn update(&mut self, booking: Booking) {
        // Remove + reinsert keeps the start-time sort order after reschedules.
        self.ledger.remove_booking(booking.id);
        self.ledger.insert_booking(booking);
    }
}

impl BookingRepository for InMemoryStore {
    fn active_service_bookings(
        &self,
        shop_id: Ulid,
        staff_ids: &[Ulid],
        window: &Span,
    ) -> Vec<Booking> {
        self.ledger(shop_id)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .service_bookings(staff_ids, window)
    }

    fn active_deal_bookings(&self, shop_id: Ulid, window: &Span) -> Vec<Booking> {
        self.ledger(shop_id)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .deal_bookings(window)
    }

    fn manual_blocks(&self, shop_id: Ulid, window: &Span) -> Vec<ManualBlock> {
        self.ledger(shop_id)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .blocks_in(window)
    }

    fn booking(&self, id: Ulid) -> Option<Booking> {
        let shop_id = *self.booking_to_shop.get(&id)?;
        self.ledger(shop_id)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn with_txn<T>(
        &self,
        shop_id: Ulid,
        f: impl FnOnce(&mut dyn BookingTxn) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let ledger = self.ledger(shop_id);
        let mut guard = ledger.write().unwrap_or_else(PoisonError::into_inner);
        let mut txn = LedgerTxn {
            shop_id,
            ledger: &mut guard,
            booking_to_shop: &self.booking_to_shop,
        };
        f(&mut txn)
    }
}
