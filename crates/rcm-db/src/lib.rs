//! Postgres access for the agent harness: connection config, pooling,
//! embedded migrations, row models, and per-table query helpers.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
