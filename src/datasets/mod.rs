//! The two concrete datasets and the shared load-then-group driver.

pub mod attainment;
pub mod employment;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::grouper::{GroupStats, Grouped, Grouping, group_with_stats};
use crate::loader::{AnomalyPolicy, CoercionAnomaly, Coerce, load_records};

pub use attainment::{AttainmentPoint, AttainmentRules, load_cleaned_attainment_data};
pub use employment::{EmploymentPoint, EmploymentRules, load_cleaned_employment_data};

/// Inclusion test on a text row, run before its fields are coerced.
///
/// Must agree with [`Grouping::include`] so that rows the grouper would drop
/// never raise a coercion anomaly.
pub trait Screen<Row> {
    fn screen(&self, row: &Row) -> bool;
}

/// Grouped output of one dataset, with what was dropped along the way.
#[derive(Debug, Serialize)]
pub struct Cleaned<O> {
    pub groups: Grouped<O>,
    pub anomalies: Vec<CoercionAnomaly>,
    pub stats: GroupStats,
}

/// Loads `source` as `Row`s and groups the coerced records under `rules`.
///
/// Load failures propagate unchanged; nothing is returned for a partial load.
pub async fn load_and_group<Row, G>(
    source: &str,
    rules: &G,
    policy: AnomalyPolicy,
) -> Result<Cleaned<G::Output>>
where
    Row: Coerce,
    G: Grouping<Record = Row::Record> + Screen<Row>,
{
    let loaded = load_records::<Row, _>(source, policy, |row| rules.screen(row)).await?;
    let (groups, mut stats) = group_with_stats(&loaded.records, rules);
    stats.input += loaded.screened_out;
    stats.excluded += loaded.screened_out;

    info!(
        source,
        records = stats.input,
        retained = stats.retained,
        groups = stats.groups,
        anomalies = loaded.anomalies.len(),
        "Dataset grouped"
    );

    Ok(Cleaned {
        groups,
        anomalies: loaded.anomalies,
        stats,
    })
}
