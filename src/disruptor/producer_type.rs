//! Producer type selection
//!
//! Chooses which sequencer backs a ring buffer: the single-producer variant
//! owns its claim path outright, the multi-producer variant coordinates
//! racing claimers through a CAS loop and per-slot availability flags.

use serde::{Deserialize, Serialize};

/// Specifies how many threads may claim and publish sequences
///
/// # Examples
/// ```
/// use chainring::disruptor::ProducerType;
///
/// assert!(ProducerType::Single.is_single());
/// assert!(ProducerType::Multi.is_multi());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerType {
    /// Exactly one thread claims and publishes. The cursor is advanced
    /// directly and no per-slot availability tracking is needed.
    Single,

    /// Any number of threads claim and publish concurrently. Claims race on
    /// the cursor and consumers only see the contiguous published prefix.
    /// This is the default since it is correct for any number of publishers.
    #[default]
    Multi,
}

impl ProducerType {
    pub fn is_single(&self) -> bool {
        matches!(self, ProducerType::Single)
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, ProducerType::Multi)
    }
}

impl std::fmt::Display for ProducerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProducerType::Single => write!(f, "single"),
            ProducerType::Multi => write!(f, "multi"),
        }
    }
}

impl std::str::FromStr for ProducerType {
    type Err = String;

    /// Accepts "single" or "multi", case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(ProducerType::Single),
            "multi" => Ok(ProducerType::Multi),
            _ => Err(format!(
                "Invalid producer type: '{s}'. Valid values are 'single' or 'multi'"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_producer_type_predicates() {
        assert!(ProducerType::Single.is_single());
        assert!(!ProducerType::Single.is_multi());
        assert!(ProducerType::Multi.is_multi());
        assert_eq!(ProducerType::default(), ProducerType::Multi);
    }

    #[test]
    fn test_producer_type_from_str() {
        assert_eq!(ProducerType::from_str("single").unwrap(), ProducerType::Single);
        assert_eq!(ProducerType::from_str("MULTI").unwrap(), ProducerType::Multi);
        assert!(ProducerType::from_str("both").is_err());
        assert!(ProducerType::from_str("").is_err());
    }

    #[test]
    fn test_producer_type_display_round_trips() {
        for producer_type in [ProducerType::Single, ProducerType::Multi] {
            let parsed = ProducerType::from_str(&producer_type.to_string()).unwrap();
            assert_eq!(parsed, producer_type);
        }
    }

    #[test]
    fn test_producer_type_serde_lowercase() {
        let json = serde_json::to_string(&ProducerType::Single).unwrap();
        assert_eq!(json, "\"single\"");
        let parsed: ProducerType = serde_json::from_str("\"multi\"").unwrap();
        assert_eq!(parsed, ProducerType::Multi);
    }
}
