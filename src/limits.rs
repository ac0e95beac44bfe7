//! Hard bounds on what a single process will hold or accept.

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_PURPOSE_LEN: usize = 1_024;
pub const MAX_ACTIVE_BOOKINGS_PER_ROOM_DAY: usize = 288;
pub const MAX_HISTORY_PER_BOOKING: usize = 1_000;

/// Default duration bounds, overridable through configuration.
pub const DEFAULT_MIN_BOOKING_MINUTES: i64 = 15;
pub const DEFAULT_MAX_BOOKING_MINUTES: i64 = 720;
