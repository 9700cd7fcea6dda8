//! Educational attainment rates by sex, attainment level, year and race.
//!
//! Groups are discovered from the data; configured races are left out.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{Cleaned, Screen, load_and_group};
use crate::grouper::{Grouping, KeyDomain};
use crate::loader::{AnomalyPolicy, CoercionAnomaly, Coerce, parse_rate, parse_year};

/// One CSV row as text: `sex, educational_attainment, year, race_or_ethnicity, rate`.
#[derive(Debug, Deserialize)]
pub struct AttainmentRow {
    pub sex: String,
    pub educational_attainment: String,
    pub year: String,
    pub race_or_ethnicity: String,
    pub rate: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttainmentRecord {
    pub sex: String,
    pub educational_attainment: String,
    pub year: i32,
    pub race_or_ethnicity: String,
    pub rate: f64,
}

/// An attainment record without its race, as emitted per group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttainmentPoint {
    pub sex: String,
    pub attainment: String,
    pub year: i32,
    pub rate: f64,
}

impl Coerce for AttainmentRow {
    type Record = AttainmentRecord;

    fn coerce(self, line: u64) -> Result<AttainmentRecord, CoercionAnomaly> {
        Ok(AttainmentRecord {
            year: parse_year(&self.year, line)?,
            rate: parse_rate(&self.rate, line)?,
            sex: self.sex,
            educational_attainment: self.educational_attainment,
            race_or_ethnicity: self.race_or_ethnicity,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AttainmentRules {
    /// Races dropped before grouping.
    pub excluded: Vec<String>,
}

impl Default for AttainmentRules {
    fn default() -> Self {
        Self {
            excluded: vec!["Asian".to_string()],
        }
    }
}

impl AttainmentRules {
    fn admits(&self, race: &str) -> bool {
        !self.excluded.iter().any(|r| r == race)
    }
}

impl Screen<AttainmentRow> for AttainmentRules {
    fn screen(&self, row: &AttainmentRow) -> bool {
        self.admits(&row.race_or_ethnicity)
    }
}

impl Grouping for AttainmentRules {
    type Record = AttainmentRecord;
    type Output = AttainmentPoint;
    type Time = i32;

    fn include(&self, record: &AttainmentRecord) -> bool {
        self.admits(&record.race_or_ethnicity)
    }

    fn key<'r>(&self, record: &'r AttainmentRecord) -> &'r str {
        &record.race_or_ethnicity
    }

    fn project(&self, record: &AttainmentRecord) -> AttainmentPoint {
        AttainmentPoint {
            sex: record.sex.clone(),
            attainment: record.educational_attainment.clone(),
            year: record.year,
            rate: record.rate,
        }
    }

    fn time(&self, output: &AttainmentPoint) -> i32 {
        output.year
    }

    fn domain(&self) -> KeyDomain {
        KeyDomain::Dynamic
    }
}

/// Loads the attainment CSV at `source` and groups it by race, ascending by year.
#[tracing::instrument(skip(rules))]
pub async fn load_cleaned_attainment_data(
    source: &str,
    rules: &AttainmentRules,
    policy: AnomalyPolicy,
) -> Result<Cleaned<AttainmentPoint>> {
    load_and_group::<AttainmentRow, _>(source, rules, policy).await
}
