pub mod auth;
pub mod clients;
pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
