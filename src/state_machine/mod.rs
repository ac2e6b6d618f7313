// Invocation lifecycle state machine.
//
// PENDING -> IN_PROGRESS -> {SUCCESS | RETRY | PERMANENTLY_FAILED}, with RETRY
// re-entering IN_PROGRESS on the next claim and sweeps moving rows back to PENDING.

pub mod events;
pub mod guards;
pub mod states;

pub use events::InvocationEvent;
pub use guards::InvocationTransitionGuard;
pub use states::{ClearanceStatus, InvocationStatus};
