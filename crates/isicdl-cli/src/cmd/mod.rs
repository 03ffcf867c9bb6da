//! Subcommands

pub mod fetch;
