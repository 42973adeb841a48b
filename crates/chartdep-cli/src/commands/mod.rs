//! CLI commands

pub mod dep;
pub mod repo;
