pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod document;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod page_count;
pub mod pool;
pub mod progress;
pub mod provision;
pub mod report;
pub mod util;
