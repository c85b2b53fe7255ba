pub mod app;
pub mod config;
pub mod constants;
pub mod db;
pub mod destination;
pub mod error;
pub mod infra;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod run_lock;
pub mod sanitizer;
pub mod storage;
pub mod types;
