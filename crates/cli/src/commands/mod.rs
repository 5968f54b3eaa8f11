//! CLI subcommands

pub mod crd;
pub mod plan;
pub mod status;
