use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::metadata::types::SchemaClass;

/// How a sync run decides what to fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Fetch and write every schema class
    Full,
    /// Currently identical to `Full`; there is no change tracking on the remote side
    Incremental,
    /// Data and public entities only, without actions
    EntitiesOnly,
    /// Link to an already-synced version with the same modules, else `Full`
    #[default]
    SharingMode,
}

impl SyncStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::Full => "full",
            SyncStrategy::Incremental => "incremental",
            SyncStrategy::EntitiesOnly => "entities_only",
            SyncStrategy::SharingMode => "sharing_mode",
        }
    }

    /// Schema classes fetched when the strategy does fetch
    pub fn classes(&self) -> &'static [SchemaClass] {
        match self {
            SyncStrategy::EntitiesOnly => &[SchemaClass::DataEntities, SchemaClass::PublicEntities],
            SyncStrategy::Full | SyncStrategy::Incremental | SyncStrategy::SharingMode => &[
                SchemaClass::DataEntities,
                SchemaClass::PublicEntities,
                SchemaClass::Enumerations,
                SchemaClass::Labels,
            ],
        }
    }

    pub fn includes_actions(&self) -> bool {
        !matches!(self, SyncStrategy::EntitiesOnly)
    }

    /// True when a successful run leaves a complete copy of the schema.
    /// Only such runs may mark a version synced.
    pub fn is_complete(&self) -> bool {
        self.classes().len() == SchemaClass::ALL.len() && self.includes_actions()
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(SyncStrategy::Full),
            "incremental" => Ok(SyncStrategy::Incremental),
            "entities_only" => Ok(SyncStrategy::EntitiesOnly),
            "sharing_mode" => Ok(SyncStrategy::SharingMode),
            _ => Err(format!("Unknown sync strategy: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SyncStrategy::Full)]
    #[case(SyncStrategy::Incremental)]
    #[case(SyncStrategy::EntitiesOnly)]
    #[case(SyncStrategy::SharingMode)]
    fn strategy_parses_its_own_name(#[case] strategy: SyncStrategy) {
        assert_eq!(strategy.as_str().parse::<SyncStrategy>(), Ok(strategy));
        assert_eq!(
            serde_json::to_string(&strategy).unwrap(),
            format!("\"{}\"", strategy.as_str())
        );
    }

    #[test]
    fn entities_only_skips_enumerations_labels_and_actions() {
        let strategy = SyncStrategy::EntitiesOnly;

        assert!(!strategy.classes().contains(&SchemaClass::Enumerations));
        assert!(!strategy.classes().contains(&SchemaClass::Labels));
        assert!(!strategy.includes_actions());
        assert!(SyncStrategy::Full.includes_actions());
    }

    #[rstest]
    #[case(SyncStrategy::Full, true)]
    #[case(SyncStrategy::Incremental, true)]
    #[case(SyncStrategy::SharingMode, true)]
    #[case(SyncStrategy::EntitiesOnly, false)]
    fn only_all_class_strategies_are_complete(#[case] strategy: SyncStrategy, #[case] complete: bool) {
        assert_eq!(strategy.is_complete(), complete);
    }
}
