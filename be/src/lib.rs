//! Live bus position tracking with proximity-ranked queries.

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod proximity;
pub mod store;
pub mod sweeper;
