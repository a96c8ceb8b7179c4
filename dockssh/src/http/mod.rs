//! HTTP clients

pub mod launch;

pub use launch::{Launcher, LaunchResponse, RetryingLaunchClient};
