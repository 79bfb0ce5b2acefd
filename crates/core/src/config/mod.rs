pub mod app_config;
pub mod database;
pub mod validation;

pub use app_config::*;
pub use database::*;
pub use validation::*;
