//! Command-line interface module.

mod args;
pub mod cache;
pub mod run;
pub mod state;

pub use args::{CacheAction, Cli, Commands, StateAction};
