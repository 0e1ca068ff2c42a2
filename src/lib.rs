pub mod cache;
pub mod config;
pub mod http;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod reader;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
