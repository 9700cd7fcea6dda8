//! Employment rates by date and race.
//!
//! Only one rate type is kept, and the race set is fixed: every configured
//! race has a group, even when no row matches it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cleaned, Screen, load_and_group};
use crate::grouper::{Grouping, KeyDomain};
use crate::loader::{AnomalyPolicy, CoercionAnomaly, Coerce, parse_date, parse_rate, parse_year};

pub const EMPLOYMENT_POPULATION_RATIO: &str = "Employment-Population Ratio";

/// One CSV row as text: `year, date, rate_type, rate, race_or_ethnicity`.
#[derive(Debug, Deserialize)]
pub struct EmploymentRow {
    pub year: String,
    pub date: String,
    pub rate_type: String,
    pub rate: String,
    pub race_or_ethnicity: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmploymentRecord {
    pub year: i32,
    pub date: DateTime<Utc>,
    pub rate_type: String,
    pub rate: f64,
    pub race_or_ethnicity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmploymentPoint {
    pub date: DateTime<Utc>,
    pub rate: f64,
}

impl Coerce for EmploymentRow {
    type Record = EmploymentRecord;

    fn coerce(self, line: u64) -> Result<EmploymentRecord, CoercionAnomaly> {
        Ok(EmploymentRecord {
            year: parse_year(&self.year, line)?,
            date: parse_date(&self.date, line)?,
            rate: parse_rate(&self.rate, line)?,
            rate_type: self.rate_type,
            race_or_ethnicity: self.race_or_ethnicity,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EmploymentRules {
    /// The only `rate_type` kept.
    pub rate_type: String,
    /// Fixed group set. Also filters on `race_or_ethnicity`.
    pub races: Vec<String>,
}

impl Default for EmploymentRules {
    fn default() -> Self {
        Self {
            rate_type: EMPLOYMENT_POPULATION_RATIO.to_string(),
            races: ["White", "Black", "Hispanic"].map(String::from).to_vec(),
        }
    }
}

impl EmploymentRules {
    fn admits(&self, rate_type: &str, race: &str) -> bool {
        rate_type == self.rate_type && self.races.iter().any(|r| r == race)
    }
}

impl Screen<EmploymentRow> for EmploymentRules {
    fn screen(&self, row: &EmploymentRow) -> bool {
        self.admits(&row.rate_type, &row.race_or_ethnicity)
    }
}

impl Grouping for EmploymentRules {
    type Record = EmploymentRecord;
    type Output = EmploymentPoint;
    type Time = DateTime<Utc>;

    fn include(&self, record: &EmploymentRecord) -> bool {
        self.admits(&record.rate_type, &record.race_or_ethnicity)
    }

    fn key<'r>(&self, record: &'r EmploymentRecord) -> &'r str {
        &record.race_or_ethnicity
    }

    fn project(&self, record: &EmploymentRecord) -> EmploymentPoint {
        EmploymentPoint {
            date: record.date,
            rate: record.rate,
        }
    }

    fn time(&self, output: &EmploymentPoint) -> DateTime<Utc> {
        output.date
    }

    fn domain(&self) -> KeyDomain {
        KeyDomain::Fixed(self.races.clone())
    }
}

/// Loads the employment CSV at `source` and groups it by race, ascending by date.
#[tracing::instrument(skip(rules))]
pub async fn load_cleaned_employment_data(
    source: &str,
    rules: &EmploymentRules,
    policy: AnomalyPolicy,
) -> Result<Cleaned<EmploymentPoint>> {
    load_and_group::<EmploymentRow, _>(source, rules, policy).await
}
