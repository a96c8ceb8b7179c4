//! dockssh Library
//!
//! Remote deployment orchestration: bootstraps a container runtime on a host
//! reachable over ssh, installs per-deployment container stacks behind a
//! reverse proxy, and lists or tears them down again.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod remote;
pub mod storage;
pub mod utils;
