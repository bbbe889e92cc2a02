pub mod config;
pub mod error;
pub mod event_log;
pub mod fetch;
pub mod ingest;
pub mod template;
