//! # rollbook testkit
//!
//! Test utilities shared across the rollbook crates:
//! - School-domain schema fixtures and pre-wired databases
//! - Property-based generators using proptest
//! - Tracing initialization for test binaries

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

pub use fixtures::*;
pub use generators::*;
