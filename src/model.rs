use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Whole minutes — the duration unit used across the booking domain.
pub type Minutes = i64;

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Span {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn from_start(start: DateTime<Utc>, duration_minutes: Minutes) -> Self {
        Self::new(start, start + Duration::minutes(duration_minutes))
    }

    pub fn duration_minutes(&self) -> Minutes {
        (self.end - self.start).num_minutes()
    }

    /// The one overlap predicate. Slot generation, commit-time validation and
    /// reassignment checks must all route through this — divergent copies of
    /// the formula are a correctness risk.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

// ── Booking ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    /// Only active bookings occupy a busy interval or a capacity unit.
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::NoShow
        )
    }

    /// `pending → confirmed → completed`; active bookings may be cancelled or
    /// marked no-show; terminal states accept nothing.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Completed)
                | (Pending | Confirmed, Cancelled)
                | (Pending | Confirmed, NoShow)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoShow => "no_show",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a booking is for. Service bookings bind a staff member; deal bookings
/// are staff-less and draw on the shop's shared capacity instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingKind {
    Service { service_id: Ulid, staff_id: Ulid },
    Deal { deal_id: Ulid },
}

impl BookingKind {
    pub fn staff_id(&self) -> Option<Ulid> {
        match self {
            BookingKind::Service { staff_id, .. } => Some(*staff_id),
            BookingKind::Deal { .. } => None,
        }
    }

    pub fn is_deal(&self) -> bool {
        matches!(self, BookingKind::Deal { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Customer,
    Staff,
    Owner,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub by: CancelledBy,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub customer_id: Ulid,
    pub shop_id: Ulid,
    pub kind: BookingKind,
    pub span: Span,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub cancellation: Option<Cancellation>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

// ── Reference data supplied by providers ─────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop {
    pub id: Ulid,
    pub name: String,
    /// IANA timezone name. Missing or unrecognized values degrade to UTC.
    pub timezone: Option<String>,
    /// Shop-wide cap on concurrently active deal bookings.
    pub max_concurrent_deal_bookings: u32,
}

/// Open/close wall-clock hours for one weekday. No row, or `active = false`,
/// means the shop is closed that day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: Ulid,
    pub shop_id: Ulid,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub shop_id: Ulid,
    pub name: String,
    pub duration_minutes: Minutes,
    /// Minimum lead time before the soonest bookable start when the target
    /// date is today.
    pub buffer_minutes: Minutes,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: Ulid,
    pub shop_id: Ulid,
    pub name: String,
    pub duration_minutes: Minutes,
    pub price_cents: i64,
    pub active: bool,
}

/// A blackout interval independent of bookings. `staff_id = None` blocks
/// every staff member of the shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualBlock {
    pub id: Ulid,
    pub shop_id: Ulid,
    pub staff_id: Option<Ulid>,
    pub span: Span,
}

// ── Derived values (computed per request, never persisted) ───────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyInterval {
    pub staff_id: Ulid,
    pub span: Span,
}

/// A bookable service slot with the staff still free to take it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffSlot {
    pub span: Span,
    pub free_staff: Vec<Ulid>,
}

/// A deal slot. Fully booked slots are still surfaced with `slots_left = 0`
/// so callers can render "fully booked" instead of omitting the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySlot {
    pub span: Span,
    pub slots_left: u32,
}

impl CapacitySlot {
    pub fn is_available(&self) -> bool {
        self.slots_left > 0
    }
}

// ── Write-path requests ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationItem {
    /// `staff_id = None` asks the engine to auto-assign the first eligible
    /// staff member free for the slot.
    Service {
        service_id: Ulid,
        staff_id: Option<Ulid>,
    },
    Deal { deal_id: Ulid },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    /// Caller-minted id for the booking to create.
    pub id: Ulid,
    pub customer_id: Ulid,
    pub item: ReservationItem,
    pub start: DateTime<Utc>,
    pub notes: Option<String>,
}
