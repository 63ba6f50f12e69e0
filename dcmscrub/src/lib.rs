// dcmscrub/src/lib.rs
//! # dcmscrub CLI
//!
//! Command-line front end over `dcmscrub-core`. The binary in `main.rs` only
//! parses arguments and dispatches; everything it runs is reachable from here
//! so the integration tests can drive the same code.
//!
//! License: MIT OR Apache-2.0

pub mod cli;
pub mod commands;
pub mod logger;
pub mod ui;
