//! Subcommand implementations.

pub mod apply;
pub mod classify;
pub mod plan;
pub mod urn;
