pub mod app;
pub mod timeline;

#[cfg(test)]
mod app_test;

pub use app::*;
