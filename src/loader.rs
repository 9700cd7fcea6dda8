//! Source loading: fetch bytes, tokenize CSV, coerce typed fields.
//!
//! Rows are first read as text, then converted by a dataset's [`Coerce`]
//! impl. Values that fail conversion become [`CoercionAnomaly`]s and are
//! handled according to the caller's [`AnomalyPolicy`].

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::fetch::{BasicClient, HttpClient, fetch_bytes};

/// A field that could not be converted to its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("line {line}: invalid {field} value '{value}'")]
pub struct CoercionAnomaly {
    pub line: u64,
    pub field: &'static str,
    pub value: String,
}

impl CoercionAnomaly {
    fn new(line: u64, field: &'static str, value: &str) -> Self {
        Self {
            line,
            field,
            value: value.to_string(),
        }
    }
}

/// What to do with a row that has a [`CoercionAnomaly`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyPolicy {
    /// Drop the row and report it.
    #[default]
    Skip,
    /// Fail the whole load on the first anomaly.
    Reject,
}

/// A text row as read from CSV that knows how to become a typed record.
pub trait Coerce: DeserializeOwned {
    type Record;

    /// `line` is the 1-based CSV line the row came from, used in anomalies.
    fn coerce(self, line: u64) -> Result<Self::Record, CoercionAnomaly>;
}

/// Coerced records plus the rows that were dropped on the way.
#[derive(Debug)]
pub struct Loaded<R> {
    pub records: Vec<R>,
    pub anomalies: Vec<CoercionAnomaly>,
    /// Rows dropped by the text-level screen before coercion.
    pub screened_out: usize,
}

/// Reads `source` from an `http(s)://` URL or a local path.
pub async fn read_source(source: &str) -> Result<Vec<u8>> {
    read_source_with(&BasicClient::new(), source).await
}

/// Like [`read_source`] with a caller-supplied HTTP client.
#[tracing::instrument(skip_all, fields(source = %source))]
pub async fn read_source_with<C: HttpClient>(client: &C, source: &str) -> Result<Vec<u8>> {
    let bytes = if is_remote(source) {
        fetch_bytes(client, source).await?
    } else {
        tokio::fs::read(source)
            .await
            .with_context(|| format!("failed to read '{source}'"))?
    };
    Ok(bytes)
}

fn is_remote(source: &str) -> bool {
    ["http://", "https://"].iter().any(|scheme| {
        source
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Tokenizes CSV with a header line into text rows, paired with their line numbers.
///
/// # Errors
///
/// Returns an error on malformed CSV or when a row lacks a column `Row` requires.
pub fn parse_rows<Row: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<(u64, Row)>> {
    let mut rdr = csv::Reader::from_reader(bytes);
    let headers = rdr.headers().context("failed to read CSV header")?.clone();

    let mut rows = Vec::new();
    let mut record = csv::StringRecord::new();
    while rdr.read_record(&mut record).context("malformed CSV")? {
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row: Row = record
            .deserialize(Some(&headers))
            .with_context(|| format!("line {line}: row does not match expected columns"))?;
        rows.push((line, row));
    }

    Ok(rows)
}

/// Converts text rows into typed records under `policy`.
///
/// Rows for which `keep` is false are dropped before coercion, so an invalid
/// value in a row that would be filtered out anyway is never an anomaly.
pub fn coerce_rows<Row, F>(
    rows: Vec<(u64, Row)>,
    policy: AnomalyPolicy,
    keep: F,
) -> Result<Loaded<Row::Record>>
where
    Row: Coerce,
    F: Fn(&Row) -> bool,
{
    let mut records = Vec::with_capacity(rows.len());
    let mut anomalies = Vec::new();
    let mut screened_out = 0;

    for (line, row) in rows {
        if !keep(&row) {
            screened_out += 1;
            continue;
        }

        match row.coerce(line) {
            Ok(record) => records.push(record),
            Err(anomaly) => match policy {
                AnomalyPolicy::Reject => return Err(anomaly.into()),
                AnomalyPolicy::Skip => {
                    warn!(
                        line = anomaly.line,
                        field = anomaly.field,
                        value = %anomaly.value,
                        "Skipping row with invalid value"
                    );
                    anomalies.push(anomaly);
                }
            },
        }
    }

    Ok(Loaded {
        records,
        anomalies,
        screened_out,
    })
}

/// Reads, tokenizes and coerces one CSV source, keeping only rows that pass `keep`.
pub async fn load_records<Row, F>(
    source: &str,
    policy: AnomalyPolicy,
    keep: F,
) -> Result<Loaded<Row::Record>>
where
    Row: Coerce,
    F: Fn(&Row) -> bool,
{
    let bytes = read_source(source).await?;
    let rows = parse_rows::<Row>(&bytes).with_context(|| format!("failed to parse '{source}'"))?;
    debug!(source, rows = rows.len(), "Parsed CSV rows");
    coerce_rows(rows, policy, keep).with_context(|| format!("failed to load '{source}'"))
}

pub fn parse_year(value: &str, line: u64) -> Result<i32, CoercionAnomaly> {
    value
        .trim()
        .parse()
        .map_err(|_| CoercionAnomaly::new(line, "year", value))
}

/// Parses a finite floating-point rate.
pub fn parse_rate(value: &str, line: u64) -> Result<f64, CoercionAnomaly> {
    match value.trim().parse::<f64>() {
        Ok(rate) if rate.is_finite() => Ok(rate),
        _ => Err(CoercionAnomaly::new(line, "rate", value)),
    }
}

/// Parses a calendar date or timestamp as a UTC instant.
///
/// Accepts RFC 3339, `YYYY-MM-DD[ HH:MM:SS]`, `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM`
/// and `MM/DD/YYYY`. Values without a time of day are midnight UTC.
pub fn parse_date(value: &str, line: u64) -> Result<DateTime<Utc>, CoercionAnomaly> {
    let s = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.and_utc());
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d"));

    date.ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| CoercionAnomaly::new(line, "date", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::test_support::LocalClient;
    use chrono::TimeZone;
    use std::env;
    use std::fs;

    #[derive(Debug, Deserialize)]
    struct Row {
        name: String,
        year: String,
    }

    #[derive(Debug, PartialEq)]
    struct Typed {
        name: String,
        year: i32,
    }

    impl Coerce for Row {
        type Record = Typed;

        fn coerce(self, line: u64) -> Result<Typed, CoercionAnomaly> {
            Ok(Typed {
                year: parse_year(&self.year, line)?,
                name: self.name,
            })
        }
    }

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    #[test]
    fn test_parse_rows_reads_by_header_name() {
        let csv = b"year,extra,name\n2001,x,a\n2002,y,b\n";
        let rows: Vec<(u64, Row)> = parse_rows(csv).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 2);
        assert_eq!(rows[0].1.name, "a");
        assert_eq!(rows[1].0, 3);
        assert_eq!(rows[1].1.year, "2002");
    }

    #[test]
    fn test_parse_rows_missing_column_fails() {
        let csv = b"name\na\n";
        let result = parse_rows::<Row>(csv);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rows_ragged_row_fails() {
        let csv = b"name,year\na,2001\nb\n";
        let result = parse_rows::<Row>(csv);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rows_header_only() {
        let rows = parse_rows::<Row>(b"name,year\n").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_coerce_rows_skip_reports_anomaly() {
        let rows = parse_rows::<Row>(b"name,year\na,2001\nb,soon\nc,2003\n").unwrap();
        let loaded = coerce_rows(rows, AnomalyPolicy::Skip, |_| true).unwrap();

        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.records[1].name, "c");
        assert_eq!(
            loaded.anomalies,
            vec![CoercionAnomaly::new(3, "year", "soon")]
        );
    }

    #[test]
    fn test_coerce_rows_reject_fails() {
        let rows = parse_rows::<Row>(b"name,year\na,2001\nb,soon\n").unwrap();
        let err = coerce_rows(rows, AnomalyPolicy::Reject, |_| true).unwrap_err();

        let anomaly = err.downcast_ref::<CoercionAnomaly>().unwrap();
        assert_eq!(anomaly.line, 3);
        assert_eq!(anomaly.field, "year");
    }

    #[test]
    fn test_coerce_rows_screened_rows_never_reject() {
        let rows = parse_rows::<Row>(b"name,year\na,2001\ndropped,soon\nc,2003\n").unwrap();
        let loaded = coerce_rows(rows, AnomalyPolicy::Reject, |row: &Row| row.name != "dropped")
            .unwrap();

        assert_eq!(loaded.records.len(), 2);
        assert!(loaded.anomalies.is_empty());
        assert_eq!(loaded.screened_out, 1);
    }

    #[test]
    fn test_coerce_rows_screened_rows_not_reported() {
        let rows = parse_rows::<Row>(b"name,year\ndropped,soon\nb,later\n").unwrap();
        let loaded = coerce_rows(rows, AnomalyPolicy::Skip, |row: &Row| row.name != "dropped")
            .unwrap();

        assert!(loaded.records.is_empty());
        assert_eq!(loaded.anomalies, vec![CoercionAnomaly::new(3, "year", "later")]);
        assert_eq!(loaded.screened_out, 1);
    }

    #[test]
    fn test_parse_year_trims_whitespace() {
        assert_eq!(parse_year(" 2019 ", 1), Ok(2019));
        assert!(parse_year("", 1).is_err());
        assert!(parse_year("2019.5", 1).is_err());
    }

    #[test]
    fn test_parse_rate_rejects_non_finite() {
        assert_eq!(parse_rate("4.25", 1), Ok(4.25));
        assert_eq!(parse_rate("-1", 1), Ok(-1.0));
        assert!(parse_rate("NaN", 1).is_err());
        assert!(parse_rate("inf", 1).is_err());
        assert!(parse_rate("n/a", 1).is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let midnight = Utc.with_ymd_and_hms(2020, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_date("2020-03-01", 1), Ok(midnight));
        assert_eq!(parse_date("03/01/2020", 1), Ok(midnight));
        assert_eq!(parse_date("2020-03", 1), Ok(midnight));
        assert_eq!(parse_date("2020-03-01T00:00:00Z", 1), Ok(midnight));

        let later = Utc.with_ymd_and_hms(2020, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_date("2020-03-01 12:30:00", 1), Ok(later));
        assert_eq!(parse_date("2020-03-01T07:30:00-05:00", 1), Ok(later));
    }

    #[test]
    fn test_parse_date_invalid() {
        let err = parse_date("March", 7).unwrap_err();
        assert_eq!(err.line, 7);
        assert_eq!(err.field, "date");
        assert!(parse_date("2020-13-01", 1).is_err());
    }

    #[tokio::test]
    async fn test_read_source_local_file() {
        let path = temp_path("rate_grouper_test_read_source.csv");
        fs::write(&path, "name,year\na,2001\n").unwrap();

        let bytes = read_source(&path).await.unwrap();
        assert_eq!(bytes, b"name,year\na,2001\n");

        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_read_source_missing_file() {
        let path = temp_path("rate_grouper_test_does_not_exist.csv");
        let _ = fs::remove_file(&path);

        let result = read_source(&path).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_records_from_file() {
        let path = temp_path("rate_grouper_test_load_records.csv");
        fs::write(&path, "name,year\na,2001\nb,x\n").unwrap();

        let loaded = load_records::<Row, _>(&path, AnomalyPolicy::Skip, |_| true)
            .await
            .unwrap();
        assert_eq!(
            loaded.records,
            vec![Typed {
                name: "a".into(),
                year: 2001
            }]
        );
        assert_eq!(loaded.anomalies.len(), 1);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.com/data.csv"));
        assert!(is_remote("http://example.com/data.csv"));
        assert!(!is_remote("data/http.csv"));
    }

    #[test]
    fn test_is_remote_ignores_scheme_case() {
        assert!(is_remote("HTTPS://example.com/data.csv"));
        assert!(is_remote("Http://example.com/data.csv"));
        assert!(!is_remote("http:/example.com"));
        assert!(!is_remote("htt"));
    }

    #[tokio::test]
    async fn test_read_source_with_remote_body() {
        let client = LocalClient::serve(200, "name,year\na,2001\n").await;
        let bytes = read_source_with(&client, "https://data.test/rates.csv")
            .await
            .unwrap();
        assert_eq!(bytes, b"name,year\na,2001\n");
    }

    #[tokio::test]
    async fn test_read_source_with_remote_not_found() {
        let client = LocalClient::serve(404, "missing").await;
        let err = read_source_with(&client, "HTTPS://data.test/rates.csv")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
