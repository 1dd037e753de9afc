pub mod player;
pub mod reviewer;
pub mod state;

pub use player::*;
pub use reviewer::*;
pub use state::*;
