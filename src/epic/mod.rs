//! Epic state machine.
//!
//! An epic moves `Planned → ContractsLocked → Implementing → Review →
//! Integrated → Released`, with `Implementing ⇄ Parked` as a detour and
//! `Implementing`/`Review` able to be abandoned straight into `Released`.

mod model;
mod state;

pub use model::Epic;
pub use state::EpicState;
