//! Build-time configuration.

pub mod board;
pub mod kernel;
