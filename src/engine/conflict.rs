use chrono::NaiveDate;
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::limits::{MAX_NAME_LEN, MAX_PURPOSE_LEN};
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_span(span: &Span, cfg: &EngineConfig) -> Result<(), EngineError> {
    if !span.is_ordered() {
        return Err(EngineError::Validation(format!(
            "end time {} must be after start time {}",
            span.end, span.start
        )));
    }
    let minutes = span.duration_minutes();
    if minutes < cfg.min_booking_minutes {
        return Err(EngineError::Validation(format!(
            "booking must last at least {} minutes",
            cfg.min_booking_minutes
        )));
    }
    if minutes > cfg.max_booking_minutes {
        return Err(EngineError::Validation(format!(
            "booking may last at most {} minutes",
            cfg.max_booking_minutes
        )));
    }
    Ok(())
}

pub(crate) fn validate_date(date: NaiveDate, today: NaiveDate) -> Result<(), EngineError> {
    if date < today {
        return Err(EngineError::Validation(format!(
            "cannot book a date in the past: {date}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_purpose(purpose: Option<&str>) -> Result<(), EngineError> {
    if purpose.is_some_and(|p| p.len() > MAX_PURPOSE_LEN) {
        return Err(EngineError::LimitExceeded("purpose too long"));
    }
    Ok(())
}

pub(crate) fn validate_name(name: Option<&str>) -> Result<(), EngineError> {
    if name.is_some_and(|n| n.len() > MAX_NAME_LEN) {
        return Err(EngineError::LimitExceeded("room name too long"));
    }
    Ok(())
}

pub(crate) fn check_room_open(rs: &RoomState) -> Result<(), EngineError> {
    if rs.status != RoomStatus::Available {
        return Err(EngineError::RoomUnavailable {
            room_id: rs.id,
            status: rs.status,
        });
    }
    Ok(())
}

/// First active booking on `date` overlapping `span`, ignoring `excluding`.
pub(crate) fn find_conflict<'a>(
    rs: &'a RoomState,
    date: &NaiveDate,
    span: &'a Span,
    excluding: Option<Ulid>,
) -> Option<&'a Booking> {
    rs.active_overlapping(date, span)
        .find(|b| Some(b.id) != excluding)
}

/// Admission check. Only meaningful while the caller holds the room's write guard.
pub(crate) fn check_no_conflict(
    rs: &RoomState,
    date: &NaiveDate,
    span: &Span,
    excluding: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(rs, date, span, excluding) {
        Some(existing) => Err(EngineError::Conflict {
            booking_id: existing.id,
            span: existing.span,
        }),
        None => Ok(()),
    }
}
