use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the stats entry carrying whole-run totals.
pub const AGGREGATED_ENTRY: &str = "Aggregated";

/// Engine states that mean the swarm will not produce new traffic on its own.
const FINISHED_STATES: [&str; 2] = ["stopped", "spawning_complete"];

/// Point-in-time report pulled from the load engine.
///
/// Only the fields the coordinator reads are typed; everything else the engine reports is
/// kept in `extra` so that broadcasting a snapshot relays it unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Overall run state as reported by the engine (e.g. `running`, `stopped`).
    #[serde(default)]
    pub state: String,
    /// Per-group aggregate counters, including the `Aggregated` entry.
    #[serde(default)]
    pub stats: Vec<StatsEntry>,
    /// Remaining engine fields, relayed verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Aggregate counters for one named request group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsEntry {
    pub name: String,
    #[serde(default)]
    pub num_requests: u64,
    #[serde(default)]
    pub num_failures: u64,
    #[serde(default)]
    pub avg_response_time: f64,
    #[serde(default)]
    pub current_rps: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatsEntry {
    /// Builds an entry with the counters the coordinator reads and nothing else.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        num_requests: u64,
        num_failures: u64,
        avg_response_time: f64,
        current_rps: f64,
    ) -> Self {
        Self {
            name: name.into(),
            num_requests,
            num_failures,
            avg_response_time,
            current_rps,
            extra: Map::new(),
        }
    }
}

impl StatsSnapshot {
    /// Builds a snapshot from a state string and its entries.
    #[must_use]
    pub fn new(state: impl Into<String>, stats: Vec<StatsEntry>) -> Self {
        Self {
            state: state.into(),
            stats,
            extra: Map::new(),
        }
    }

    /// Returns the whole-run totals, if the engine reported them.
    #[must_use]
    pub fn aggregated(&self) -> Option<&StatsEntry> {
        self.stats
            .iter()
            .find(|entry| entry.name == AGGREGATED_ENTRY)
    }

    /// Whether the engine reports that it stopped or finished spawning its target.
    #[must_use]
    pub fn engine_finished(&self) -> bool {
        FINISHED_STATES.contains(&self.state.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_engine_fields_survive_round_trip() {
        let raw = json!({
            "state": "running",
            "user_count": 10,
            "stats": [{
                "name": "Aggregated",
                "method": "",
                "num_requests": 50,
                "num_failures": 0,
                "avg_response_time": 120.0,
                "current_rps": 5.0,
                "median_response_time": 110
            }]
        });

        let snapshot: StatsSnapshot = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(snapshot.aggregated().unwrap().num_requests, 50);
        assert_eq!(serde_json::to_value(&snapshot).unwrap(), raw);
    }

    #[test]
    fn finished_states() {
        assert!(StatsSnapshot::new("stopped", vec![]).engine_finished());
        assert!(StatsSnapshot::new("spawning_complete", vec![]).engine_finished());
        assert!(!StatsSnapshot::new("running", vec![]).engine_finished());
        assert!(!StatsSnapshot::new("spawning", vec![]).engine_finished());
    }

    #[test]
    fn missing_aggregated_entry() {
        let snapshot = StatsSnapshot::new(
            "running",
            vec![StatsEntry::new("/home", 3, 0, 10.0, 1.0)],
        );
        assert!(snapshot.aggregated().is_none());
    }
}
