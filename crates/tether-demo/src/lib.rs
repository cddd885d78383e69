#![forbid(unsafe_code)]

//! Profile-editing demo for Tether.
//!
//! Enters a scope holding an optimistic profile cell, opens the edit form,
//! submits a patch against a simulated backend, and reports what every stage
//! of the update looked like.

pub mod cli;
pub mod error;
pub mod logging;
pub mod scenario;

pub use cli::{run, run_from_env};
