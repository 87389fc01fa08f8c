// kvblob serves a deprecated write-once blob store over HTTP

pub mod client;
mod connection;
pub mod engine;
pub mod error;
pub mod feature;
pub mod guard;
pub mod http;
pub mod log_store;
pub mod server;
pub mod service;
pub mod sled;
pub mod thread_pool;

#[cfg(test)]
pub mod tests;
