//! Call state machine.
//!
//! `Ringing -> Accepted | Rejected | Ended` (caller may cancel before
//! answer), `Accepted -> Ended`.  `Rejected` and `Ended` are terminal.

use causerie_shared::{CallStatus, CoreError, CoreResult};

/// Check one transition; anything not in the table is an
/// [`CoreError::InvalidCallTransition`].
pub fn validate_transition(from: CallStatus, to: CallStatus) -> CoreResult<()> {
    let permitted = matches!(
        (from, to),
        (CallStatus::Ringing, CallStatus::Accepted)
            | (CallStatus::Ringing, CallStatus::Rejected)
            | (CallStatus::Ringing, CallStatus::Ended)
            | (CallStatus::Accepted, CallStatus::Ended)
    );
    if permitted {
        Ok(())
    } else {
        Err(CoreError::InvalidCallTransition { from, to })
    }
}
