//! Shared type definitions
//!
//! Configuration records and catalog entries shared across the crate.

pub mod config;
pub mod model;
