//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`build`] - Provision a complete lab
//! - [`config`] - Configuration management (init, path, show)
//! - [`info`] - Show the nodes of a built lab
//! - [`ledger`] - Dump the raw build ledger
//! - [`scuttle`] - Delete a lab's instances and ledger entries

pub mod build;
pub mod config;
pub mod info;
pub mod ledger;
pub mod scuttle;
