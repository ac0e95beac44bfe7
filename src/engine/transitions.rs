use std::fmt;

use chrono::NaiveDateTime;

use crate::model::{BookingStatus, HistoryAction, Role};

/// The events that move a booking through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Approve,
    Modify,
    Cancel,
    Complete,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Approve => "approve",
            Transition::Modify => "modify",
            Transition::Cancel => "cancel",
            Transition::Complete => "complete",
        }
    }

    /// Status after applying this transition to a booking in `from`.
    ///
    /// ```text
    /// pending   --approve-->  confirmed
    /// pending   --modify--->  pending
    /// confirmed --modify--->  confirmed
    /// pending   --cancel--->  cancelled
    /// confirmed --cancel--->  cancelled
    /// confirmed --complete->  completed
    /// ```
    pub fn target(&self, from: BookingStatus) -> Result<BookingStatus, TransitionDenied> {
        use BookingStatus::*;
        if from.is_terminal() {
            return Err(TransitionDenied::Terminal(from));
        }
        match (self, from) {
            (Transition::Approve, Pending) => Ok(Confirmed),
            (Transition::Modify, s) => Ok(s),
            (Transition::Cancel, _) => Ok(Cancelled),
            (Transition::Complete, Confirmed) => Ok(Completed),
            (t, from) => Err(TransitionDenied::WrongState {
                from,
                transition: *t,
            }),
        }
    }

    pub fn action(&self) -> HistoryAction {
        match self {
            Transition::Approve => HistoryAction::Approved,
            Transition::Modify => HistoryAction::Updated,
            Transition::Cancel => HistoryAction::Cancelled,
            Transition::Complete => HistoryAction::Completed,
        }
    }

    /// Transitions that (re)claim room time. A modify that leaves the
    /// interval untouched skips the check at the call site.
    pub fn needs_conflict_check(&self) -> bool {
        matches!(self, Transition::Approve | Transition::Modify)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transition was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionDenied {
    Terminal(BookingStatus),
    WrongState {
        from: BookingStatus,
        transition: Transition,
    },
    NotPermitted {
        role: Role,
        transition: Transition,
    },
    NotElapsed {
        ends_at: NaiveDateTime,
    },
}

impl fmt::Display for TransitionDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionDenied::Terminal(status) => {
                write!(f, "booking is {status} and can no longer change")
            }
            TransitionDenied::WrongState { from, transition } => {
                write!(f, "cannot {transition} a {from} booking")
            }
            TransitionDenied::NotPermitted { role, transition } => {
                write!(f, "role {role} may not {transition} this booking")
            }
            TransitionDenied::NotElapsed { ends_at } => {
                write!(f, "booking has not ended yet (ends {ends_at})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    const ALL: [Transition; 4] = [
        Transition::Approve,
        Transition::Modify,
        Transition::Cancel,
        Transition::Complete,
    ];

    #[test]
    fn legal_moves() {
        assert_eq!(Transition::Approve.target(Pending), Ok(Confirmed));
        assert_eq!(Transition::Modify.target(Pending), Ok(Pending));
        assert_eq!(Transition::Modify.target(Confirmed), Ok(Confirmed));
        assert_eq!(Transition::Cancel.target(Pending), Ok(Cancelled));
        assert_eq!(Transition::Cancel.target(Confirmed), Ok(Cancelled));
        assert_eq!(Transition::Complete.target(Confirmed), Ok(Completed));
    }

    #[test]
    fn terminal_states_refuse_everything() {
        for from in [Cancelled, Completed] {
            for t in ALL {
                assert_eq!(t.target(from), Err(TransitionDenied::Terminal(from)));
            }
        }
    }

    #[test]
    fn wrong_source_state() {
        assert!(matches!(
            Transition::Approve.target(Confirmed),
            Err(TransitionDenied::WrongState { from: Confirmed, .. })
        ));
        assert!(matches!(
            Transition::Complete.target(Pending),
            Err(TransitionDenied::WrongState { from: Pending, .. })
        ));
    }

    #[test]
    fn never_moves_backwards() {
        let rank = |s: BookingStatus| match s {
            Pending => 0,
            Confirmed => 1,
            Cancelled | Completed => 2,
        };
        for from in [Pending, Confirmed] {
            for t in ALL {
                if let Ok(to) = t.target(from) {
                    assert!(rank(to) >= rank(from), "{t} took {from} to {to}");
                }
            }
        }
    }

    #[test]
    fn actions_and_conflict_checks() {
        assert_eq!(Transition::Cancel.action(), HistoryAction::Cancelled);
        assert_eq!(Transition::Modify.action(), HistoryAction::Updated);
        assert!(Transition::Approve.needs_conflict_check());
        assert!(!Transition::Cancel.needs_conflict_check());
        assert!(!Transition::Complete.needs_conflict_check());
    }
}
