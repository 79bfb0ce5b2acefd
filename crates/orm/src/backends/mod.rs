//! Database Backend Abstractions
//!
//! The driver trait, the MySQL implementation used in production and a
//! scripted driver for tests.

pub mod core;
pub mod mock;
pub mod mysql;

// Re-export core traits and types
pub use self::core::*;
pub use mock::{LoggedStatement, MockDriver};
pub use mysql::MySqlDriver;
