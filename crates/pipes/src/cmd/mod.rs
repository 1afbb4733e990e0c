//! Command implementations for the Pipes CLI

pub mod query;
pub mod tables;
