pub mod media_controller;
pub mod processor;
pub mod summary;

pub use media_controller::*;
pub use processor::*;
pub use summary::*;
