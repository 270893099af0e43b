// Adapters layer: concrete implementations for external systems (JAO API, Azure, local disk).

pub mod azure_auth;
pub mod datalake;
pub mod jao;
pub mod local;
