//! Core types shared by every part of the engine.

pub mod identifier;
pub mod migration;
pub mod traits;

pub use migration::{Conditions, Filter, Migration};
pub use traits::{Connection, Printer, SqlWarning, Throttler, Verifier};
