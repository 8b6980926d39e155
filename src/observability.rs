// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: availability queries served. Labels: kind (service|deal).
pub const AVAILABILITY_QUERIES_TOTAL: &str = "openchair_availability_queries_total";

/// Counter: bookings committed. Labels: kind (service|deal).
pub const RESERVATIONS_TOTAL: &str = "openchair_reservations_total";

/// Counter: reservations rejected at the read-time check. Labels: kind.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "openchair_reservation_conflicts_total";

/// Counter: reservations rejected by the commit-time re-check — a second
/// writer won the slot between read and commit. Labels: kind.
pub const STALE_SLOTS_TOTAL: &str = "openchair_stale_slots_total";

/// Counter: staff reassignments committed.
pub const REASSIGNMENTS_TOTAL: &str = "openchair_reassignments_total";

/// Counter: shops whose timezone configuration fell back to UTC.
pub const TIMEZONE_FALLBACKS_TOTAL: &str = "openchair_timezone_fallbacks_total";
