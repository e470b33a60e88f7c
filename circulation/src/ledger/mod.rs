//! Borrowing and reservation ledgers.
//!
//! The rules live in a pure [`CirculationReducer`]; the storage backends in
//! [`store`](crate::store) decide how the state it reduces is loaded, locked
//! and written back.

mod actions;
mod reducer;
mod state;

pub use actions::{CirculationAction, CirculationEvent};
pub use reducer::{CirculationEnvironment, CirculationReducer};
pub use state::CirculationState;
