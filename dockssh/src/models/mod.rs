//! Data model shared across the crate

pub mod deployment;
pub mod host;
