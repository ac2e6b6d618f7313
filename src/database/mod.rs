//! # Database Layer
//!
//! Pool construction, health checks and embedded schema migrations for the
//! PostgreSQL stores.

pub mod connection;

pub use connection::DatabaseConnection;
