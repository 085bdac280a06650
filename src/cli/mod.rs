//! Command-line interface

pub mod args;
pub mod commands;
pub mod display;

pub use args::{Cli, Commands};
