pub mod api;
pub mod cache;
pub mod config;
pub mod engine;
pub mod engine_http;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod overrides;
pub mod rate_limit;
pub mod redis;
pub mod result;
pub mod server;
pub mod service;
pub mod streaming;
pub mod upstream;
pub mod usage;
