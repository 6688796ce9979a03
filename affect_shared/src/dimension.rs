use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Affective dimension a model is trained to predict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetDimension {
    Arousal,
    Valence,
}

impl TargetDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetDimension::Arousal => "arousal",
            TargetDimension::Valence => "valence",
        }
    }

    pub fn all() -> [TargetDimension; 2] {
        [TargetDimension::Arousal, TargetDimension::Valence]
    }
}

impl fmt::Display for TargetDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetDimension {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "arousal" => Ok(TargetDimension::Arousal),
            "valence" => Ok(TargetDimension::Valence),
            other => Err(format!("unknown target dimension '{other}'")),
        }
    }
}
