pub mod slot;
pub mod state;

pub use slot::*;
pub use state::*;
