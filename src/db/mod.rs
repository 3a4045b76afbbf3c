//! Database module: entity models and SQL repositories.
//!
//! - `model`: typed domain entities returned by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `tg_watbot::db`; the repository API
//! and the `Wat` entity are re-exported here.

pub mod model;
pub mod repo;

pub use model::Wat;
pub use repo::*;
