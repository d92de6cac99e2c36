pub mod config;
pub mod db;
pub mod fetch_error;
pub mod fetcher;
pub mod loader;
pub mod logging;
pub mod notifier;
pub mod parser;
pub mod pipeline;
pub mod record;
