//! Portico Database Layer
//!
//! Postgres repositories used by the ingest engine, plus the traits the engine
//! depends on so it can be tested without a database.

pub mod db;
pub mod engine_traits;

pub use db::*;
pub use engine_traits::*;
