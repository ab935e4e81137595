use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;

// ============================================================================
// Reward Configuration
// ============================================================================
//
// Ordered mapping from reward-function identifier to weight. The order is
// the order contributions are combined by the trainer and must survive a
// round trip through storage, so this serializes as a JSON object whose keys
// appear in insertion order.
//
// Identifiers and weights live in one vector of pairs, so the two can never
// differ in length.
//
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RewardConfigError {
    #[error("Reward configuration cannot be empty")]
    Empty,

    #[error("Got {rewards} reward identifiers but {weights} weights")]
    LengthMismatch { rewards: usize, weights: usize },

    #[error("Duplicate reward identifier: {0}")]
    Duplicate(String),

    #[error("Weight for {0} is not a finite number")]
    NonFinite(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewardConfig {
    entries: Vec<(String, f64)>,
}

impl RewardConfig {
    pub fn new<I, S>(entries: I) -> Result<Self, RewardConfigError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut validated = Vec::new();

        for (id, weight) in entries {
            let id = id.into();
            if !weight.is_finite() {
                return Err(RewardConfigError::NonFinite(id));
            }
            if !seen.insert(id.clone()) {
                return Err(RewardConfigError::Duplicate(id));
            }
            validated.push((id, weight));
        }

        if validated.is_empty() {
            return Err(RewardConfigError::Empty);
        }

        Ok(Self { entries: validated })
    }

    /// Build from the parallel arrays carried by a `RewardChange` message
    pub fn from_parts(rewards: Vec<String>, weights: Vec<f64>) -> Result<Self, RewardConfigError> {
        if rewards.is_empty() || weights.is_empty() {
            return Err(RewardConfigError::Empty);
        }
        if rewards.len() != weights.len() {
            return Err(RewardConfigError::LengthMismatch {
                rewards: rewards.len(),
                weights: weights.len(),
            });
        }

        Self::new(rewards.into_iter().zip(weights))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(id, weight)| (id.as_str(), *weight))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Default for RewardConfig {
    /// Weights the trainer ships with when nothing has been saved yet
    fn default() -> Self {
        Self {
            entries: vec![
                ("AerialTouchReward".to_string(), 0.15),
                ("PressureReward".to_string(), 0.2),
                ("GoalScoreSpeed".to_string(), 0.042),
                ("KickoffReward".to_string(), 1.0),
                ("SaveBoostReward".to_string(), 0.012),
                ("PosessionReward".to_string(), 1.3),
                ("EventReward".to_string(), 0.45),
            ],
        }
    }
}

impl Serialize for RewardConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, weight) in self.iter() {
            map.serialize_entry(id, &weight)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RewardConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedWeights;

        impl<'de> Visitor<'de> for OrderedWeights {
            type Value = RewardConfig;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping reward identifiers to weights")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, f64)> = Vec::new();
                while let Some((id, weight)) = access.next_entry::<String, f64>()? {
                    entries.push((id, weight));
                }
                RewardConfig::new(entries).map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_map(OrderedWeights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(config: &RewardConfig) -> Vec<&str> {
        config.iter().map(|(id, _)| id).collect()
    }

    fn weight(config: &RewardConfig, id: &str) -> Option<f64> {
        config.iter().find(|(key, _)| *key == id).map(|(_, weight)| weight)
    }

    #[test]
    fn test_from_parts_accepts_matching_arrays() {
        let config = RewardConfig::from_parts(
            vec!["a".to_string(), "b".to_string()],
            vec![0.5, 0.5],
        )
        .unwrap();

        assert_eq!(config.len(), 2);
        assert_eq!(weight(&config, "a"), Some(0.5));
        assert_eq!(weight(&config, "b"), Some(0.5));
        assert_eq!(weight(&config, "c"), None);
    }

    #[test]
    fn test_from_parts_rejects_length_mismatch() {
        let result = RewardConfig::from_parts(vec!["a".to_string(), "b".to_string()], vec![1.0]);
        assert_eq!(
            result.unwrap_err(),
            RewardConfigError::LengthMismatch { rewards: 2, weights: 1 }
        );
    }

    #[test]
    fn test_from_parts_rejects_empty_arrays() {
        assert_eq!(
            RewardConfig::from_parts(vec![], vec![]).unwrap_err(),
            RewardConfigError::Empty
        );
        assert_eq!(
            RewardConfig::from_parts(vec!["a".to_string()], vec![]).unwrap_err(),
            RewardConfigError::Empty
        );
    }

    #[test]
    fn test_duplicate_identifiers_rejected() {
        let result = RewardConfig::from_parts(
            vec!["a".to_string(), "a".to_string()],
            vec![0.1, 0.2],
        );
        assert_eq!(result.unwrap_err(), RewardConfigError::Duplicate("a".to_string()));
    }

    #[test]
    fn test_non_finite_weight_rejected() {
        let result = RewardConfig::new(vec![("a", f64::NAN)]);
        assert_eq!(result.unwrap_err(), RewardConfigError::NonFinite("a".to_string()));
    }

    #[test]
    fn test_serializes_as_ordered_object() {
        let config = RewardConfig::new(vec![("zeta", 1.0), ("alpha", 0.25), ("mid", 2.0)]).unwrap();
        let json = config.to_json().unwrap();

        assert_eq!(json, r#"{"zeta":1.0,"alpha":0.25,"mid":2.0}"#);

        let restored: RewardConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(ids(&restored), vec!["zeta", "alpha", "mid"]);
        assert_eq!(restored, config);
    }

    #[test]
    fn test_deserialize_rejects_duplicate_keys() {
        let result = serde_json::from_str::<RewardConfig>(r#"{"a":1.0,"a":2.0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_table() {
        let config = RewardConfig::default();
        assert_eq!(config.len(), 7);
        assert_eq!(ids(&config)[0], "AerialTouchReward");
        assert_eq!(weight(&config, "PosessionReward"), Some(1.3));
    }
}
