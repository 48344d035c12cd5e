//! Library surface of the dispatch CLI.
//!
//! The binary in `main.rs` is a thin argument parser; the command
//! implementations live here so integration tests can drive them
//! without spawning the binary.

pub mod commands;
pub mod output;
