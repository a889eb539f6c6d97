//! Cache implementation modules

pub mod compression;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod invalidation;
pub mod telemetry;
pub mod tier;
pub mod traits;
pub mod ttl;
pub mod types;
