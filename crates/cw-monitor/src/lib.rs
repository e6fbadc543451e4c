//! CanWatch monitor: terminal front end over the `cw-stream` core.
//!
//! Re-exports all modules so the end-to-end test crate can drive the
//! presenter and port opener without spawning the binary.

pub mod config;
pub mod logging;
pub mod port;
pub mod presenter;
