//! Tandem - client core for server-driven UIs.
//!
//! The server describes every screen as a [`spec::PageSpec`]; the client
//! keeps a [`stack::PageStack`] of them in sync with the server, reuses
//! widget state across updates ([`reconcile`]), caches responses on disk
//! ([`cache`]) and persists the stack between runs ([`persist`]).

pub mod app;
pub mod cache;
pub mod config;
pub mod core;
pub mod logger;
pub mod persist;
pub mod reconcile;
pub mod retry;
pub mod server;
pub mod spec;
pub mod stack;
pub mod sync;
