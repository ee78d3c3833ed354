pub mod aggregator;
pub mod backoff;
pub mod config;
pub mod console;
pub mod error;
pub mod metrics;
pub mod mqtt;
pub mod provider;
pub mod publisher;
pub mod runtime;
pub mod sampler;
