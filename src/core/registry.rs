use crate::config::AdapterConfig;
use crate::domain::model::CorridorId;
use crate::domain::ports::CorridorCatalog;
use crate::utils::error::Result;
use std::collections::HashSet;

/// Which corridors one run processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorridorRegistry {
    /// Fixed list from the configuration.
    Static(Vec<CorridorId>),
    /// Ask the API and keep identifiers containing any of the filters
    /// (all of them when no filter is set).
    Discovered { filters: Vec<String> },
}

impl CorridorRegistry {
    pub fn from_config(config: &AdapterConfig) -> Result<Self> {
        Ok(match config.static_corridors()? {
            Some(corridors) => Self::Static(corridors),
            None => Self::Discovered {
                filters: config.corridor_filters().to_vec(),
            },
        })
    }

    pub async fn resolve(&self, catalog: &dyn CorridorCatalog) -> Result<Vec<CorridorId>> {
        let corridors = match self {
            Self::Static(corridors) => corridors.clone(),
            Self::Discovered { filters } => {
                let available = catalog.list_corridors().await?;
                tracing::info!("JAO lists {} corridors", available.len());
                filter_corridors(available, filters)
            }
        };
        Ok(dedup(corridors))
    }
}

pub fn filter_corridors(corridors: Vec<CorridorId>, filters: &[String]) -> Vec<CorridorId> {
    if filters.is_empty() {
        return corridors;
    }
    corridors
        .into_iter()
        .filter(|corridor| {
            filters
                .iter()
                .any(|filter| corridor.as_str().contains(filter.as_str()))
        })
        .collect()
}

fn dedup(corridors: Vec<CorridorId>) -> Vec<CorridorId> {
    let mut seen = HashSet::new();
    corridors
        .into_iter()
        .filter(|corridor| seen.insert(corridor.clone()))
        .collect()
}
