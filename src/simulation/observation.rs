// ============================================================================
// Observation
// Per-replication output: player payoffs plus aggregate features
// ============================================================================

use crate::domain::OwnerId;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlayerObservation {
    pub owner: OwnerId,
    pub name: String,
    pub holdings: i64,
    pub cash: i64,
    /// Cash plus holdings valued at the end-of-run oracle price
    pub payoff: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Observation {
    pub players: Vec<PlayerObservation>,
    /// Feature name to value, sorted by name
    pub features: BTreeMap<String, f64>,
}

impl Observation {
    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied()
    }

    pub fn player(&self, owner: OwnerId) -> Option<&PlayerObservation> {
        self.players.iter().find(|p| p.owner == owner)
    }

    pub fn total_payoff(&self) -> f64 {
        self.players.iter().map(|p| p.payoff).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let mut observation = Observation::default();
        observation.features.insert("cda_volume".to_string(), 3.0);
        observation.players.push(PlayerObservation {
            owner: OwnerId(4),
            name: "zi".to_string(),
            holdings: 1,
            cash: -100,
            payoff: 5.0,
        });

        assert_eq!(observation.feature("cda_volume"), Some(3.0));
        assert_eq!(observation.feature("missing"), None);
        assert_eq!(observation.player(OwnerId(4)).unwrap().name, "zi");
        assert_eq!(observation.total_payoff(), 5.0);
    }
}
