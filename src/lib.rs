//! Keeps machine translations of CMS posts in sync with their
//! default-language source without overwriting human edits.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod openai;
pub mod planner;
pub mod provider;
pub mod reporter;
pub mod retry;
pub mod scheduler;
pub mod security;
pub mod server;
pub mod staleness;
pub mod store;
pub mod worker_pool;
