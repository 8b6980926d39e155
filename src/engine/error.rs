use ulid::Ulid;

use crate::model::{BookingStatus, Span};

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Entity exists but is flagged inactive (service, deal or staff member).
    Inactive(Ulid),
    ShopClosed,
    /// The service has no explicitly assigned staff; it cannot be booked.
    NoEligibleStaff,
    PastDateRequested,
    /// Requested time is not a slot the grid would surface, or the read-time
    /// check found nobody free. Carries up to 5 alternative slots.
    SlotNotAvailable { alternatives: Vec<Span> },
    /// Deal slot has no capacity left. Carries up to 5 alternative slots.
    CapacityExceeded { alternatives: Vec<Span> },
    /// The commit-time re-check found the slot taken since availability was
    /// read. Carries up to 5 alternative slots from a fresh calculation.
    StaleSlot { alternatives: Vec<Span> },
    /// The candidate staff member already has an active booking overlapping
    /// the target window.
    ReassignmentConflict {
        booking_id: Ulid,
        span: Span,
        item: String,
    },
    /// Staff member cannot perform the booked service (or belongs to another
    /// shop).
    IneligibleStaff(Ulid),
    /// Reassignment to the currently assigned staff member is a no-op.
    SameStaff(Ulid),
    /// Booking is in a terminal status; no time/staff/status changes allowed.
    BookingClosed {
        booking_id: Ulid,
        status: BookingStatus,
    },
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    NotAServiceBooking(Ulid),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Inactive(id) => write!(f, "inactive: {id}"),
            EngineError::ShopClosed => write!(f, "shop is closed on the requested date"),
            EngineError::NoEligibleStaff => {
                write!(f, "no staff assigned to this service")
            }
            EngineError::PastDateRequested => write!(f, "requested date is in the past"),
            EngineError::SlotNotAvailable { alternatives } => write!(
                f,
                "slot not available ({} alternatives offered)",
                alternatives.len()
            ),
            EngineError::CapacityExceeded { alternatives } => write!(
                f,
                "no deal capacity left for this slot ({} alternatives offered)",
                alternatives.len()
            ),
            EngineError::StaleSlot { alternatives } => write!(
                f,
                "slot was taken since availability was read ({} alternatives offered)",
                alternatives.len()
            ),
            EngineError::ReassignmentConflict {
                booking_id,
                span,
                item,
            } => write!(
                f,
                "staff already booked for {item} ({booking_id}) from {} to {}",
                span.start, span.end
            ),
            EngineError::IneligibleStaff(id) => {
                write!(f, "staff member {id} cannot perform this service")
            }
            EngineError::SameStaff(id) => {
                write!(f, "staff member {id} is already assigned to this booking")
            }
            EngineError::BookingClosed { booking_id, status } => {
                write!(f, "booking {booking_id} is {status} and can no longer change")
            }
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid status transition: {from} -> {to}")
            }
            EngineError::NotAServiceBooking(id) => {
                write!(f, "booking {id} has no staff to reassign")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
