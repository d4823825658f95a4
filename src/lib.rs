pub mod config;
pub mod dataset;
pub mod discovery;
pub mod error;
pub mod level_loader;
pub mod logging;
pub mod mask;
pub mod metadata;
pub mod orchestrator;
pub mod process_info;
pub mod redistribute;
pub mod writer;
