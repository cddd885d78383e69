#![forbid(unsafe_code)]

//! Core: scope lifelines and the logging shim shared by the Tether crates.

pub mod lifeline;
pub mod logging;
