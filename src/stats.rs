use indexmap::IndexMap;
use serde::Serialize;

/// Category names used by the built-in plugins.
pub mod category {
    pub const ENDPOINTS: &str = "Endpoints";
    pub const SERVER_SIDE_ENDPOINTS: &str = "Server Side Endpoints";
    pub const SCHEMAS: &str = "Schemas";
    pub const SERVICES: &str = "Services";
}

/// Named counters for one source during one sync run.
///
/// Categories keep first-increment order so reports are stable.
#[derive(Debug)]
pub struct StatsCounter {
    source_id: String,
    counts: IndexMap<String, u64>,
}

impl StatsCounter {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            counts: IndexMap::new(),
        }
    }

    pub fn increment(&mut self, category: &str) {
        self.increment_by(category, 1);
    }

    pub fn increment_by(&mut self, category: &str, by: u64) {
        *self.counts.entry(category.to_string()).or_insert(0) += by;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            source_id: self.source_id.clone(),
            counts: self.counts.clone(),
        }
    }
}

/// Read-only copy of a [`StatsCounter`] taken after generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub source_id: String,
    pub counts: IndexMap<String, u64>,
}

impl StatsSnapshot {
    pub fn get(&self, category: &str) -> u64 {
        self.counts.get(category).copied().unwrap_or(0)
    }
}
