//! Console module - Print and logging facilities.
//!
//! This module provides console output and logging support on top of the
//! serial debug channel.

#[macro_use]
pub mod print;

pub mod logger;

pub use logger::init as init_logger;
