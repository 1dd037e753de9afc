pub mod config;
pub mod error;
pub mod results;
pub mod session;
pub mod trial;


pub use config::*;
pub use error::*;
pub use results::*;
pub use session::*;
pub use trial::*;
