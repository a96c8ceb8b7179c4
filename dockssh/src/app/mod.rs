//! Command line application

pub mod options;
pub mod run;
pub mod state;
