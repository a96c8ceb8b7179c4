//! Deployment module

pub mod bootstrap;
pub mod compose;
pub mod config;
pub mod fsm;
pub mod hostname;
pub mod lifecycle;
pub mod manifest;
pub mod routing;
