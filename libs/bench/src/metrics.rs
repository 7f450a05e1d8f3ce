//! Timing measurements and the benchmark report.
//!
//! A [`BenchmarkReport`] maps metric keys to measurements, iterating in
//! first-insertion order. It renders to a JSON object of
//! `key -> {"value": "<2 decimals>", "unit": "<unit>"}`:
//!
//! ```text
//! {
//!     "insert-speed": { "value": "51234.17", "unit": "vec/sec" },
//!     "flush-cost": { "value": "1.02", "unit": "s" },
//!     "create-index-cost": { "value": "8.40", "unit": "s" },
//!     "search-q1-k10-p10-cost": { "value": "0.01", "unit": "s" }
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::SearchRequest;

/// Key of the insert throughput measurement.
pub const INSERT_SPEED: &str = "insert-speed";
/// Key of the flush (plus row count check) duration.
pub const FLUSH_COST: &str = "flush-cost";
/// Key of the index build duration.
pub const CREATE_INDEX_COST: &str = "create-index-cost";

/// Unit label of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    VectorsPerSecond,
    Seconds,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::VectorsPerSecond => "vec/sec",
            Unit::Seconds => "s",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One completed phase (or search) measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseMeasurement {
    /// Wall time of the phase.
    pub elapsed: Duration,
    /// Reported value: the elapsed seconds, or a rate derived from them.
    pub value: f64,
    pub unit: Unit,
}

impl PhaseMeasurement {
    /// A duration reported in seconds.
    pub fn cost(elapsed: Duration) -> Self {
        Self {
            elapsed,
            value: elapsed.as_secs_f64(),
            unit: Unit::Seconds,
        }
    }

    /// A throughput of `count` vectors over `elapsed`.
    pub fn rate(count: usize, elapsed: Duration) -> Self {
        Self {
            elapsed,
            value: compute_rate(count, elapsed),
            unit: Unit::VectorsPerSecond,
        }
    }

    /// Serialized form as written to the report.
    pub fn entry(&self) -> ReportEntry {
        ReportEntry {
            value: format!("{:.2}", self.value),
            unit: self.unit.as_str().to_string(),
        }
    }
}

/// Items per second; zero when no time elapsed.
pub fn compute_rate(count: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    count as f64 / secs
}

/// Serialized measurement: value and unit as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub value: String,
    pub unit: String,
}

/// Report key of one search sweep point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchKey {
    pub nq: usize,
    pub topk: usize,
    pub nprobe: usize,
}

impl From<&SearchRequest> for SearchKey {
    fn from(req: &SearchRequest) -> Self {
        Self {
            nq: req.nq,
            topk: req.topk,
            nprobe: req.nprobe,
        }
    }
}

impl fmt::Display for SearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "search-q{}-k{}-p{}-cost", self.nq, self.topk, self.nprobe)
    }
}

impl std::str::FromStr for SearchKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .strip_prefix("search-")
            .and_then(|rest| rest.strip_suffix("-cost"))
            .ok_or_else(|| format!("not a search key: {}", s))?;
        let mut parts = inner.split('-');
        let mut field = |prefix: char| -> Result<usize, String> {
            parts
                .next()
                .and_then(|p| p.strip_prefix(prefix))
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| format!("malformed search key: {}", s))
        };
        let key = SearchKey {
            nq: field('q')?,
            topk: field('k')?,
            nprobe: field('p')?,
        };
        if parts.next().is_some() {
            return Err(format!("malformed search key: {}", s));
        }
        Ok(key)
    }
}

/// Ordered collection of measurements for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchmarkReport {
    entries: Vec<(String, PhaseMeasurement)>,
}

impl BenchmarkReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a measurement. Re-recording a key replaces its value but keeps
    /// the key's original position.
    pub fn record(&mut self, key: impl Into<String>, measurement: PhaseMeasurement) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = measurement,
            None => self.entries.push((key, measurement)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PhaseMeasurement> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, m)| m)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PhaseMeasurement)> {
        self.entries.iter().map(|(k, m)| (k.as_str(), m))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys from `expected` that this report lacks, in the given order.
    pub fn missing<'a>(&self, expected: &'a [String]) -> Vec<&'a str> {
        expected
            .iter()
            .filter(|k| !self.contains_key(k))
            .map(String::as_str)
            .collect()
    }

    /// Serialized entries in report order.
    pub fn entries(&self) -> Vec<(String, ReportEntry)> {
        self.entries
            .iter()
            .map(|(k, m)| (k.clone(), m.entry()))
            .collect()
    }

    fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (key, entry) in self.entries() {
            map.insert(
                key,
                serde_json::json!({ "value": entry.value, "unit": entry.unit }),
            );
        }
        Value::Object(map)
    }

    /// Pretty JSON with four-space indentation.
    pub fn render(&self) -> String {
        let value = self.to_json();
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        // Serializing a Value into memory cannot fail.
        if value.serialize(&mut ser).is_err() {
            return value.to_string();
        }
        String::from_utf8(buf).unwrap_or_else(|_| value.to_string())
    }

    /// Write the rendered report to `path`, replacing any existing content.
    pub fn persist(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render())
            .with_context(|| format!("Failed to write report to {}", path.display()))
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Parse a rendered report back into ordered entries.
pub fn parse_report(text: &str) -> Result<Vec<(String, ReportEntry)>> {
    let value: Value = serde_json::from_str(text).context("Failed to parse report JSON")?;
    let Value::Object(map) = value else {
        anyhow::bail!("report must be a JSON object");
    };
    map.into_iter()
        .map(|(key, v)| {
            let entry: ReportEntry = serde_json::from_value(v)
                .with_context(|| format!("Malformed report entry '{}'", key))?;
            Ok((key, entry))
        })
        .collect()
}

/// Load and parse a persisted report.
pub fn load_report(path: &Path) -> Result<Vec<(String, ReportEntry)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read report from {}", path.display()))?;
    parse_report(&text)
}

/// Every key a complete run records, in report order.
pub fn expected_keys(points: &[SearchRequest]) -> Vec<String> {
    let mut keys = vec![
        INSERT_SPEED.to_string(),
        FLUSH_COST.to_string(),
        CREATE_INDEX_COST.to_string(),
    ];
    keys.extend(points.iter().map(|p| SearchKey::from(p).to_string()));
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> BenchmarkReport {
        let mut report = BenchmarkReport::new();
        report.record(
            INSERT_SPEED,
            PhaseMeasurement::rate(5000, Duration::from_millis(250)),
        );
        report.record(FLUSH_COST, PhaseMeasurement::cost(Duration::from_millis(1500)));
        report.record(
            CREATE_INDEX_COST,
            PhaseMeasurement::cost(Duration::from_secs(3)),
        );
        report.record(
            SearchKey { nq: 1, topk: 10, nprobe: 10 }.to_string(),
            PhaseMeasurement::cost(Duration::from_millis(12)),
        );
        report
    }

    #[test]
    fn test_rate_and_cost_values() {
        let rate = PhaseMeasurement::rate(5000, Duration::from_millis(250));
        assert_eq!(rate.entry().value, "20000.00");
        assert_eq!(rate.entry().unit, "vec/sec");

        let cost = PhaseMeasurement::cost(Duration::from_millis(1504));
        assert_eq!(cost.entry().value, "1.50");
        assert_eq!(cost.entry().unit, "s");

        assert_eq!(compute_rate(10, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_record_preserves_first_insertion_order() {
        let mut report = sample_report();
        report.record(FLUSH_COST, PhaseMeasurement::cost(Duration::from_secs(9)));
        let keys: Vec<&str> = report.keys().collect();
        assert_eq!(
            keys,
            vec![INSERT_SPEED, FLUSH_COST, CREATE_INDEX_COST, "search-q1-k10-p10-cost"]
        );
        assert_eq!(report.get(FLUSH_COST).unwrap().entry().value, "9.00");
        assert_eq!(report.len(), 4);
    }

    #[test]
    fn test_render_parse_roundtrip() {
        let report = sample_report();
        let rendered = report.render();
        assert!(rendered.contains("    \"insert-speed\": {"));
        let parsed = parse_report(&rendered).unwrap();
        assert_eq!(parsed, report.entries());
    }

    #[test]
    fn test_empty_report_renders_empty_object() {
        let report = BenchmarkReport::new();
        assert_eq!(report.render(), "{}");
        assert!(parse_report("{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(parse_report("[1, 2]").is_err());
        assert!(parse_report("{\"a\": {\"value\": \"1\"}}").is_err());
    }

    #[test]
    fn test_persist_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        std::fs::write(&path, "stale content that is longer than the report itself ".repeat(20))
            .unwrap();

        let report = sample_report();
        report.persist(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), report.render());
        assert_eq!(load_report(&path).unwrap(), report.entries());
    }

    #[test]
    fn test_search_key_format_and_parse() {
        let key = SearchKey { nq: 100, topk: 1000, nprobe: 16 };
        assert_eq!(key.to_string(), "search-q100-k1000-p16-cost");
        assert_eq!("search-q100-k1000-p16-cost".parse::<SearchKey>().unwrap(), key);
        assert!("insert-speed".parse::<SearchKey>().is_err());
        assert!("search-q1-k2-cost".parse::<SearchKey>().is_err());
        assert!("search-q1-k2-p3-x4-cost".parse::<SearchKey>().is_err());
    }

    #[test]
    fn test_missing_keys() {
        let report = sample_report();
        let points = vec![
            SearchRequest::new(1, 10, 10).unwrap(),
            SearchRequest::new(10, 10, 10).unwrap(),
        ];
        let expected = expected_keys(&points);
        assert_eq!(expected.len(), 5);
        assert_eq!(report.missing(&expected), vec!["search-q10-k10-p10-cost"]);
    }
}
