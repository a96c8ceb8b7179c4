//! Local and remote storage layout, settings and the host registry

pub mod layout;
pub mod registry;
pub mod settings;
