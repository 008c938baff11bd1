pub mod config;
pub mod db;
pub mod health;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod validation;

pub use services::engine::{LedgerEngine, LedgerError};
