//! Host configuration engine.
//!
//! Scripts are written in a line-oriented DSL of action blocks (`copy:`,
//! `links:`, `editfiles:` …) guarded by host classes (`webserver.debian::`).
//! Each block is translated into a small general scripting form, parsed,
//! and run against the local host.
//!
//! - **[`engine`]**: segmentation, translation, compilation, execution
//! - **[`resources`]**: filesystem, file-editing and package collaborators
//! - **[`monitor`]**: message bus with dry-run veto
//! - **[`config`]**: TOML settings merged with CLI flags
//! - **[`commands`]**: top-level subcommands (`apply`, `check`, `dump`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod logging;
pub mod monitor;
pub mod platform;
pub mod resources;
