pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliArgs;
pub use config::AdapterConfig;

pub use adapters::{datalake::DataLakeStorage, jao::JaoClient, local::LocalStorage};
pub use crate::core::{
    orchestrator::{IngestionOrchestrator, OrchestratorOptions},
    registry::CorridorRegistry,
    sink::ObjectSink,
    watermark::StateFileWatermarkStore,
};
pub use utils::error::{IngressError, Result};
