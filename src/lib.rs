//! Durable task queue for job-search research
//!
//! Producers enqueue tasks in a SQLite-backed store; a single-consumer
//! processor claims them in creation order and runs the research pipeline.
//! Pipeline stages are memoized in a persistent step cache, and calls to
//! unreliable external systems run in child processes bounded by a timeout.

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod db;
pub mod errors;
pub mod isolated;
pub mod pipeline;
pub mod schema;
pub mod utils;
