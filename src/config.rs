use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::datasets::{AttainmentRules, EmploymentRules};
use crate::loader::AnomalyPolicy;

/// Filtering and key-domain rules for both datasets, plus how rows with
/// invalid values are handled.
///
/// Stored as a JSON object on disk; any section or field left out keeps its
/// default:
/// ```json
/// {
///   "attainment": { "excluded": ["Asian"] },
///   "employment": {
///     "rate_type": "Employment-Population Ratio",
///     "races": ["White", "Black", "Hispanic"]
///   },
///   "anomaly_policy": "skip"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Rules {
    pub attainment: AttainmentRules,
    pub employment: EmploymentRules,
    /// `--strict` on the command line overrides this to `reject`.
    pub anomaly_policy: AnomalyPolicy,
}

impl Rules {
    /// Loads rules from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rules file '{path}'"))?;
        Self::from_json(&content).with_context(|| format!("invalid rules file '{path}'"))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Loads `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}
