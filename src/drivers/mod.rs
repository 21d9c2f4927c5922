//! Device drivers used during bring-up.

pub mod uart;
