use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, used for audit timestamps.
pub type Ms = i64;

/// Identifier handed to us by the identity service.
pub type UserId = u64;

/// Half-open time-of-day interval `[start, end)` on a single calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Span {
    /// No ordering check here: requests are validated by the engine before
    /// a span ever reaches the conflict checker.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// The whole bookable day, `[00:00, 23:59:59.999)`.
    pub fn whole_day() -> Self {
        let end = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or_default();
        Self::new(NaiveTime::MIN, end)
    }

    pub fn is_ordered(&self) -> bool {
        self.start < self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        self.end.signed_duration_since(self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_time(&self, t: NaiveTime) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// The tuple used purely for overlap comparison. Derived from a booking on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingInterval {
    pub room_id: Ulid,
    pub date: NaiveDate,
    pub span: Span,
}

impl BookingInterval {
    pub fn overlaps(&self, other: &BookingInterval) -> bool {
        self.room_id == other.room_id && self.date == other.date && self.span.overlaps(&other.span)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Active bookings occupy room time.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomStatus {
    Available,
    Unavailable,
    Maintenance,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Unavailable => "unavailable",
            RoomStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "available" => Ok(RoomStatus::Available),
            "unavailable" => Ok(RoomStatus::Unavailable),
            "maintenance" => Ok(RoomStatus::Maintenance),
            other => Err(format!("unknown room status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    FacilityManager,
    RegularUser,
    Moderator,
    Auditor,
    ServiceAccount,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::FacilityManager => "facility_manager",
            Role::RegularUser => "regular_user",
            Role::Moderator => "moderator",
            Role::Auditor => "auditor",
            Role::ServiceAccount => "service_account",
        }
    }

    /// Admins and facility managers act on any booking.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::FacilityManager)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "facility_manager" | "manager" => Ok(Role::FacilityManager),
            "regular_user" | "user" => Ok(Role::RegularUser),
            "moderator" => Ok(Role::Moderator),
            "auditor" => Ok(Role::Auditor),
            "service_account" | "service" => Ok(Role::ServiceAccount),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Who is making a request. `user_id` is `None` only for internal jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<UserId>,
    pub role: Role,
}

impl Actor {
    pub fn user(user_id: UserId, role: Role) -> Self {
        Self {
            user_id: Some(user_id),
            role,
        }
    }

    /// The background completer.
    pub fn system() -> Self {
        Self {
            user_id: None,
            role: Role::ServiceAccount,
        }
    }

    pub fn owns(&self, owner: UserId) -> bool {
        self.user_id == Some(owner)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.user_id {
            Some(id) => write!(f, "{}:{id}", self.role),
            None => write!(f, "{}", self.role),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub room_id: Ulid,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub span: Span,
    pub status: BookingStatus,
    pub purpose: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
    pub cancelled_at: Option<Ms>,
    pub cancelled_by: Option<UserId>,
}

impl Booking {
    pub fn interval(&self) -> BookingInterval {
        BookingInterval {
            room_id: self.room_id,
            date: self.date,
            span: self.span,
        }
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.span.end)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryAction {
    Created,
    Approved,
    Updated,
    Cancelled,
    Completed,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Approved => "approved",
            HistoryAction::Updated => "updated",
            HistoryAction::Cancelled => "cancelled",
            HistoryAction::Completed => "completed",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit fact about a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub room_id: Ulid,
    /// Owner of the booking when the entry was written.
    pub user_id: UserId,
    pub action: HistoryAction,
    /// `None` for internal jobs and for users that have since been forgotten.
    pub changed_by: Option<UserId>,
    pub previous: Option<Span>,
    pub new: Option<Span>,
    pub timestamp: Ms,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub name: Option<String>,
    pub capacity: u32,
    pub status: RoomStatus,
    /// Bookings of every status per date, each day sorted by `span.start`.
    pub days: BTreeMap<NaiveDate, Vec<Booking>>,
    /// Booking id → date, so a booking can be found without scanning days.
    pub dates: HashMap<Ulid, NaiveDate>,
    /// Audit trail per booking, in commit order.
    pub history: HashMap<Ulid, Vec<HistoryEntry>>,
}

impl RoomState {
    pub fn new(id: Ulid, name: Option<String>, capacity: u32, status: RoomStatus) -> Self {
        Self {
            id,
            name,
            capacity,
            status,
            days: BTreeMap::new(),
            dates: HashMap::new(),
            history: HashMap::new(),
        }
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        let date = self.dates.get(id)?;
        self.days.get(date)?.iter().find(|b| b.id == *id)
    }

    /// Insert or replace a booking, keeping its day sorted by start time.
    pub fn upsert_booking(&mut self, booking: Booking) {
        self.remove_booking(&booking.id);
        let day = self.days.entry(booking.date).or_default();
        let pos = day
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.dates.insert(booking.id, booking.date);
        day.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: &Ulid) -> Option<Booking> {
        let date = self.dates.remove(id)?;
        let day = self.days.get_mut(&date)?;
        let pos = day.iter().position(|b| b.id == *id)?;
        let removed = day.remove(pos);
        if day.is_empty() {
            self.days.remove(&date);
        }
        Some(removed)
    }

    /// All bookings on `date` regardless of status, sorted by start.
    pub fn bookings_on(&self, date: &NaiveDate) -> &[Booking] {
        self.days.get(date).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Active bookings on `date` whose span overlaps `query`.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn active_overlapping<'a>(
        &'a self,
        date: &NaiveDate,
        query: &'a Span,
    ) -> impl Iterator<Item = &'a Booking> + 'a {
        let day = self.bookings_on(date);
        let right_bound = day.partition_point(|b| b.span.start < query.end);
        day[..right_bound]
            .iter()
            .filter(move |b| b.is_active() && b.span.end > query.start)
    }

    pub fn all_bookings(&self) -> impl Iterator<Item = &Booking> {
        self.days.values().flat_map(|day| day.iter())
    }

    pub fn active_count_on(&self, date: &NaiveDate) -> usize {
        self.bookings_on(date).iter().filter(|b| b.is_active()).count()
    }

    pub fn history_of(&self, booking_id: &Ulid) -> &[HistoryEntry] {
        self.history
            .get(booking_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn append_history(&mut self, entry: HistoryEntry) {
        self.history.entry(entry.booking_id).or_default().push(entry);
    }

    /// Replace every actor reference to `user_id` with `None`.
    /// Returns the number of references cleared.
    pub fn anonymize(&mut self, user_id: UserId) -> usize {
        let mut cleared = 0;
        for entries in self.history.values_mut() {
            for entry in entries.iter_mut() {
                if entry.changed_by == Some(user_id) {
                    entry.changed_by = None;
                    cleared += 1;
                }
            }
        }
        for day in self.days.values_mut() {
            for booking in day.iter_mut() {
                if booking.cancelled_by == Some(user_id) {
                    booking.cancelled_by = None;
                    cleared += 1;
                }
            }
        }
        cleared
    }
}

/// The event types. This is the WAL record format: one record is one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomUpserted {
        id: Ulid,
        name: Option<String>,
        capacity: u32,
        status: RoomStatus,
    },
    RoomStatusChanged {
        id: Ulid,
        status: RoomStatus,
    },
    /// A booking's state after a transition, together with the audit entry
    /// describing that transition.
    BookingTransition {
        booking: Booking,
        entry: HistoryEntry,
    },
    /// Written by compaction only: a booking with its full audit trail.
    BookingRestored {
        booking: Booking,
        history: Vec<HistoryEntry>,
    },
    UserForgotten {
        user_id: UserId,
    },
}

impl Event {
    /// The room an event belongs to; `None` for events that span all rooms.
    pub fn room_id(&self) -> Option<Ulid> {
        match self {
            Event::RoomUpserted { id, .. } | Event::RoomStatusChanged { id, .. } => Some(*id),
            Event::BookingTransition { booking, .. } | Event::BookingRestored { booking, .. } => {
                Some(booking.room_id)
            }
            Event::UserForgotten { .. } => None,
        }
    }
}

// ── Query types ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub name: Option<String>,
    pub capacity: u32,
    pub status: RoomStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub room_id: Option<Ulid>,
    pub date: Option<NaiveDate>,
    pub status: Option<BookingStatus>,
    pub user_id: Option<UserId>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.room_id.is_none_or(|r| r == booking.room_id)
            && self.date.is_none_or(|d| d == booking.date)
            && self.status.is_none_or(|s| s == booking.status)
            && self.user_id.is_none_or(|u| u == booking.user_id)
    }
}

/// Requested changes to an active booking. `None` leaves a field alone; an
/// empty purpose clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingUpdate {
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
    pub purpose: Option<String>,
}

impl BookingUpdate {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.purpose.is_none()
    }
}

/// Result of a read-only availability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityReport {
    pub room_id: Ulid,
    pub date: NaiveDate,
    pub span: Span,
    pub room_status: RoomStatus,
    /// First overlapping active booking, if any.
    pub conflict: Option<(Ulid, Span)>,
}

impl AvailabilityReport {
    pub fn available(&self) -> bool {
        self.room_status == RoomStatus::Available && self.conflict.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 11, day).unwrap()
    }

    fn booking(start: NaiveTime, end: NaiveTime, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            room_id: Ulid::new(),
            user_id: 1,
            date: d(2),
            span: Span::new(start, end),
            status,
            purpose: None,
            created_at: 0,
            updated_at: 0,
            cancelled_at: None,
            cancelled_by: None,
        }
    }

    #[test]
    fn span_touching_boundary_does_not_overlap() {
        let a = Span::new(t(10, 0), t(11, 30));
        let b = Span::new(t(11, 30), t(12, 0));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn span_partial_overlap() {
        let a = Span::new(t(10, 0), t(11, 30));
        let b = Span::new(t(11, 0), t(12, 0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn span_overlaps_itself() {
        let a = Span::new(t(9, 0), t(9, 15));
        assert!(a.overlaps(&a));
    }

    #[test]
    fn span_containment_overlaps() {
        let outer = Span::new(t(8, 0), t(18, 0));
        let inner = Span::new(t(12, 0), t(12, 30));
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn span_basics() {
        let s = Span::new(t(10, 0), t(11, 30));
        assert_eq!(s.duration_minutes(), 90);
        assert!(s.is_ordered());
        assert!(s.contains_time(t(10, 0)));
        assert!(!s.contains_time(t(11, 30))); // half-open
        assert!(!Span::new(t(11, 0), t(11, 0)).is_ordered());
    }

    #[test]
    fn interval_requires_same_room_and_date() {
        let room = Ulid::new();
        let span = Span::new(t(10, 0), t(11, 0));
        let a = BookingInterval { room_id: room, date: d(2), span };
        let other_day = BookingInterval { room_id: room, date: d(3), span };
        let other_room = BookingInterval { room_id: Ulid::new(), date: d(2), span };
        assert!(a.overlaps(&a));
        assert!(!a.overlaps(&other_day));
        assert!(!a.overlaps(&other_room));
    }

    #[test]
    fn status_helpers() {
        assert!(BookingStatus::Pending.is_active());
        assert!(BookingStatus::Confirmed.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
        assert!(BookingStatus::Completed.is_terminal());
        assert_eq!("Canceled".parse::<BookingStatus>(), Ok(BookingStatus::Cancelled));
        assert!("archived".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn role_parsing_accepts_aliases() {
        assert_eq!("facility_manager".parse::<Role>(), Ok(Role::FacilityManager));
        assert_eq!("manager".parse::<Role>(), Ok(Role::FacilityManager));
        assert_eq!("user".parse::<Role>(), Ok(Role::RegularUser));
        assert!(Role::Admin.is_staff());
        assert!(!Role::Auditor.is_staff());
    }

    #[test]
    fn upsert_keeps_day_sorted() {
        let mut rs = RoomState::new(Ulid::new(), None, 8, RoomStatus::Available);
        rs.upsert_booking(booking(t(14, 0), t(15, 0), BookingStatus::Confirmed));
        rs.upsert_booking(booking(t(9, 0), t(10, 0), BookingStatus::Confirmed));
        rs.upsert_booking(booking(t(11, 0), t(12, 0), BookingStatus::Pending));
        let starts: Vec<_> = rs.bookings_on(&d(2)).iter().map(|b| b.span.start).collect();
        assert_eq!(starts, vec![t(9, 0), t(11, 0), t(14, 0)]);
    }

    #[test]
    fn upsert_moves_modified_booking() {
        let mut rs = RoomState::new(Ulid::new(), None, 8, RoomStatus::Available);
        let mut b = booking(t(9, 0), t(10, 0), BookingStatus::Confirmed);
        rs.upsert_booking(b.clone());
        rs.upsert_booking(booking(t(12, 0), t(13, 0), BookingStatus::Confirmed));

        b.span = Span::new(t(15, 0), t(16, 0));
        rs.upsert_booking(b.clone());

        let day = rs.bookings_on(&d(2));
        assert_eq!(day.len(), 2);
        assert_eq!(day[1].id, b.id);
        assert_eq!(rs.booking(&b.id).unwrap().span, b.span);
    }

    #[test]
    fn active_overlapping_skips_inactive_and_adjacent() {
        let mut rs = RoomState::new(Ulid::new(), None, 8, RoomStatus::Available);
        let hit = booking(t(10, 0), t(11, 30), BookingStatus::Confirmed);
        rs.upsert_booking(hit.clone());
        rs.upsert_booking(booking(t(9, 0), t(10, 0), BookingStatus::Confirmed)); // adjacent
        rs.upsert_booking(booking(t(10, 30), t(11, 0), BookingStatus::Cancelled));
        rs.upsert_booking(booking(t(13, 0), t(14, 0), BookingStatus::Pending)); // after

        let query = Span::new(t(10, 0), t(12, 0));
        let hits: Vec<_> = rs.active_overlapping(&d(2), &query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, hit.id);
    }

    #[test]
    fn active_overlapping_other_date_is_empty() {
        let mut rs = RoomState::new(Ulid::new(), None, 8, RoomStatus::Available);
        rs.upsert_booking(booking(t(10, 0), t(11, 0), BookingStatus::Confirmed));
        let query = Span::new(t(10, 0), t(11, 0));
        assert_eq!(rs.active_overlapping(&d(3), &query).count(), 0);
    }

    #[test]
    fn remove_last_booking_drops_day() {
        let mut rs = RoomState::new(Ulid::new(), None, 8, RoomStatus::Available);
        let b = booking(t(10, 0), t(11, 0), BookingStatus::Confirmed);
        rs.upsert_booking(b.clone());
        assert!(rs.remove_booking(&b.id).is_some());
        assert!(rs.days.is_empty());
        assert!(rs.remove_booking(&b.id).is_none());
    }

    #[test]
    fn anonymize_clears_actor_references_only() {
        let mut rs = RoomState::new(Ulid::new(), None, 8, RoomStatus::Available);
        let mut b = booking(t(10, 0), t(11, 0), BookingStatus::Cancelled);
        b.user_id = 7;
        b.cancelled_by = Some(7);
        rs.upsert_booking(b.clone());
        rs.append_history(HistoryEntry {
            id: Ulid::new(),
            booking_id: b.id,
            room_id: b.room_id,
            user_id: 7,
            action: HistoryAction::Created,
            changed_by: Some(7),
            previous: None,
            new: Some(b.span),
            timestamp: 1,
        });

        assert_eq!(rs.anonymize(7), 2);
        assert_eq!(rs.history_of(&b.id)[0].changed_by, None);
        assert_eq!(rs.history_of(&b.id)[0].user_id, 7);
        assert_eq!(rs.booking(&b.id).unwrap().cancelled_by, None);
        assert_eq!(rs.anonymize(7), 0);
    }

    #[test]
    fn filter_matches_all_fields() {
        let b = booking(t(10, 0), t(11, 0), BookingStatus::Confirmed);
        assert!(BookingFilter::default().matches(&b));
        let f = BookingFilter {
            room_id: Some(b.room_id),
            date: Some(b.date),
            status: Some(BookingStatus::Confirmed),
            user_id: Some(1),
        };
        assert!(f.matches(&b));
        let f = BookingFilter {
            user_id: Some(2),
            ..Default::default()
        };
        assert!(!f.matches(&b));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let b = booking(t(10, 0), t(11, 0), BookingStatus::Confirmed);
        let event = Event::BookingTransition {
            entry: HistoryEntry {
                id: Ulid::new(),
                booking_id: b.id,
                room_id: b.room_id,
                user_id: b.user_id,
                action: HistoryAction::Created,
                changed_by: Some(b.user_id),
                previous: None,
                new: Some(b.span),
                timestamp: 42,
            },
            booking: b,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
