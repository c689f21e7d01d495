//! Subcommand implementations.

pub mod albums;
pub mod auth;
pub mod browse;
pub mod config;
