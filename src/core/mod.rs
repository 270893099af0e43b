pub mod orchestrator;
pub mod registry;
pub mod sink;
pub mod watermark;

pub use crate::domain::model::{CorridorId, CorridorReport, FetchWindow, IngestedBatch, RunReport};
pub use crate::domain::ports::{CorridorCatalog, FetchClient, Sink, Storage, WatermarkStore};
pub use crate::utils::error::Result;
