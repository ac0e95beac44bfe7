use ulid::Ulid;

use crate::model::{BookingStatus, RoomStatus, Span};

use super::transitions::TransitionDenied;

#[derive(Debug)]
pub enum EngineError {
    Validation(String),
    LimitExceeded(&'static str),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    RoomNotFound(Ulid),
    RoomUnavailable {
        room_id: Ulid,
        status: RoomStatus,
    },
    Conflict {
        booking_id: Ulid,
        span: Span,
    },
    /// The room's guard was not acquired within the lock timeout.
    Busy(Ulid),
    IllegalTransition {
        booking_id: Ulid,
        reason: TransitionDenied,
    },
    Forbidden(String),
    Persistence(String),
}

impl EngineError {
    /// Only `Busy` is worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Busy(_))
    }

    pub fn sqlstate(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "22023",
            EngineError::LimitExceeded(_) => "54000",
            EngineError::NotFound(_) | EngineError::RoomNotFound(_) => "02000",
            EngineError::AlreadyExists(_) => "23505",
            EngineError::RoomUnavailable { .. } => "55000",
            EngineError::Conflict { .. } => "23P01",
            EngineError::Busy(_) => "55P03",
            EngineError::IllegalTransition { reason, .. } => match reason {
                TransitionDenied::NotPermitted { .. } => "42501",
                _ => "55000",
            },
            EngineError::Forbidden(_) => "42501",
            EngineError::Persistence(_) => "58030",
        }
    }

    pub(crate) fn terminal(booking_id: Ulid, status: BookingStatus) -> Self {
        EngineError::IllegalTransition {
            booking_id,
            reason: TransitionDenied::Terminal(status),
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::NotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::RoomUnavailable { room_id, status } => {
                write!(f, "room {room_id} is {status} and accepts no bookings")
            }
            EngineError::Conflict { booking_id, span } => {
                write!(f, "conflicts with booking {booking_id} at {span}")
            }
            EngineError::Busy(room_id) => {
                write!(f, "room {room_id} is busy, retry the request")
            }
            EngineError::IllegalTransition { booking_id, reason } => {
                write!(f, "booking {booking_id}: {reason}")
            }
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::Persistence(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
