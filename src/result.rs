//! Benchmark result types.

use crate::error::TestError;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

/// Outcome of measuring one test.
///
/// On failure every statistic is zero and `percentiles` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TestError>,
    /// Iterations actually recorded.
    pub size: u64,
    /// Smallest non-zero duration, in nanoseconds.
    pub min: u64,
    /// Largest duration, in nanoseconds.
    pub max: u64,
    pub mean: f64,
    pub stddev: f64,
    /// Percentile label (e.g. `"99.9"`) to duration in nanoseconds.
    pub percentiles: BTreeMap<String, u64>,
    pub standard_error: f64,
}

impl TestResult {
    /// Zero-valued failure carrying `error`.
    pub fn failure(error: TestError) -> Self {
        Self {
            success: false,
            error: Some(error),
            size: 0,
            min: 0,
            max: 0,
            mean: 0.0,
            stddev: 0.0,
            percentiles: BTreeMap::new(),
            standard_error: 0.0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Operations per second derived from the mean duration.
    pub fn ops_per_sec(&self) -> Option<f64> {
        if self.success && self.mean > 0.0 {
            Some(1e9 / self.mean)
        } else {
            None
        }
    }

    /// Standard error as a percentage of the mean.
    pub fn relative_error(&self) -> Option<f64> {
        if self.success && self.mean > 0.0 {
            Some(self.standard_error / self.mean * 100.0)
        } else {
            None
        }
    }

    /// How much faster this result is than `other`, in percent.
    ///
    /// Negative when this result is slower.
    pub fn faster_than(&self, other: &TestResult) -> f64 {
        if self.mean <= 0.0 {
            return 0.0;
        }
        (other.mean / self.mean - 1.0) * 100.0
    }
}

/// Results keyed by test name, in submission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Results {
    entries: Vec<(String, TestResult)>,
}

impl Results {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert or replace the result for `name`.
    pub fn insert(&mut self, name: impl Into<String>, result: TestResult) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = result,
            None => self.entries.push((name, result)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&TestResult> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Test names in submission order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TestResult)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    /// Names of the tests that failed.
    pub fn failures(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|(_, r)| !r.success).map(|(n, _)| n)
    }

    /// Load results previously written by [`JsonReporter`](crate::JsonReporter).
    pub fn load(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl Index<&str> for Results {
    type Output = TestResult;

    fn index(&self, name: &str) -> &TestResult {
        match self.get(name) {
            Some(r) => r,
            None => panic!("no result recorded for test '{}'", name),
        }
    }
}

impl IntoIterator for Results {
    type Item = (String, TestResult);
    type IntoIter = std::vec::IntoIter<(String, TestResult)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, TestResult)> for Results {
    fn from_iter<I: IntoIterator<Item = (String, TestResult)>>(iter: I) -> Self {
        let mut results = Results::new();
        for (name, result) in iter {
            results.insert(name, result);
        }
        results
    }
}

// Serialized as a JSON object whose key order follows submission order.
impl Serialize for Results {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.entries.len()))?;
        for (name, result) in &self.entries {
            map.serialize_entry(name, result)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Results {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct ResultsVisitor;

        impl<'de> Visitor<'de> for ResultsVisitor {
            type Value = Results;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of test name to result")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Results, A::Error> {
                let mut results = Results::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, result)) = access.next_entry::<String, TestResult>()? {
                    results.insert(name, result);
                }
                Ok(results)
            }
        }

        d.deserialize_map(ResultsVisitor)
    }
}
