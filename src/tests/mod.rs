mod cli_test;
mod sled_store;
mod thread_pool;
