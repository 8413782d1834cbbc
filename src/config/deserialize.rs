// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles target lists (shorthand or detailed) and bounded fractions.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::TargetConfig;

pub fn deserialize_targets<'de, D>(deserializer: D) -> Result<NonEmpty<TargetConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<TargetEntry> = Vec::deserialize(deserializer)?;
    let targets = values
        .into_iter()
        .map(TargetEntry::into_target_config)
        .collect::<Result<Vec<_>, _>>()
        .map_err(serde::de::Error::custom)?;

    NonEmpty::from_vec(targets)
        .ok_or_else(|| serde::de::Error::custom("at least one target is required"))
}

/// A ratio in `[0.0, 1.0]`.
pub fn deserialize_fraction<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(serde::de::Error::custom(format!(
            "expected a fraction between 0 and 1, got {value}"
        )));
    }
    Ok(value)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetEntry {
    Simple(String),
    Detailed(TargetConfig),
}

impl TargetEntry {
    fn into_target_config(self) -> Result<TargetConfig, String> {
        match self {
            TargetEntry::Simple(s) => TargetConfig::parse(&s),
            TargetEntry::Detailed(c) => Ok(c.normalized()),
        }
    }
}
