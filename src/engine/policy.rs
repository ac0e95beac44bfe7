//! Who may do what. Every role check in the engine goes through [`allows`].

use crate::model::{Actor, Role, UserId};

use super::transitions::{Transition, TransitionDenied};
use super::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Create,
    View,
    ViewHistory,
    Modify,
    Cancel,
    Approve,
    /// `elapsed` is whether the booking's end has already passed.
    Complete { elapsed: bool },
    ListAll,
    ManageRooms,
    ForgetUsers,
}

/// `owner` is the booking's owner for booking-scoped capabilities, `None`
/// for everything else.
pub fn allows(actor: &Actor, owner: Option<UserId>, cap: Capability) -> bool {
    let is_owner = owner.is_some_and(|o| actor.owns(o));
    let staff = actor.role.is_staff();
    let role = actor.role;
    match cap {
        Capability::Create => role != Role::Auditor,
        Capability::View | Capability::ViewHistory => {
            is_owner || staff || matches!(role, Role::Auditor | Role::ServiceAccount)
        }
        Capability::Modify | Capability::Cancel => is_owner || staff,
        Capability::Approve => staff,
        Capability::Complete { elapsed } => {
            staff || (elapsed && (is_owner || role == Role::ServiceAccount))
        }
        Capability::ListAll => staff || role == Role::Auditor,
        Capability::ManageRooms => staff || role == Role::ServiceAccount,
        Capability::ForgetUsers => matches!(role, Role::Admin | Role::ServiceAccount),
    }
}

/// Non-transition checks surface as `Forbidden`.
pub fn authorize(actor: &Actor, owner: Option<UserId>, cap: Capability) -> Result<(), EngineError> {
    if allows(actor, owner, cap) {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!("{actor} lacks {cap:?}")))
    }
}

/// Permission half of a booking transition. An owner asking to complete a
/// booking that has not ended is told so rather than being denied outright.
pub fn authorize_transition(
    actor: &Actor,
    owner: UserId,
    transition: Transition,
    elapsed: bool,
) -> Result<(), TransitionDenied> {
    let cap = match transition {
        Transition::Approve => Capability::Approve,
        Transition::Modify => Capability::Modify,
        Transition::Cancel => Capability::Cancel,
        Transition::Complete => Capability::Complete { elapsed },
    };
    if allows(actor, Some(owner), cap) {
        return Ok(());
    }
    Err(TransitionDenied::NotPermitted {
        role: actor.role,
        transition,
    })
}
