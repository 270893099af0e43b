// Domain layer: corridor/window/batch models and the ports the orchestrator drives.

pub mod model;
pub mod ports;
