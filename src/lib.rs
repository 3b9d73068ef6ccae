//! bugbot: a Discord bug-report tracker driven by emoji reactions.

pub mod config;
pub mod discord;
pub mod error;
pub mod logging;
pub mod report;
pub mod store;
pub mod tracker;

pub use error::{Error, Result};
