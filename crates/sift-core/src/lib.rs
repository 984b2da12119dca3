//! Configuration loading and wiring of the store, retriever and ingestion pipeline.

pub mod bootstrap;
pub mod config;

pub use bootstrap::{AppContext, resolve_config_path};
pub use config::Config;
