//! # Maturity Application Library
//!
//! The operator CLI for the maturity assessment engine, exposed as a
//! library so the command functions can be driven from integration tests.

pub mod cli;
pub mod config;
