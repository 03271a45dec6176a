// Named result series

use std::collections::BTreeMap;

/// Ordered integer samples of one named series, one per collection round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSeries {
    values: Vec<i64>,
    /// Prefix of `values` already reduced by `summarize`.
    summarized: usize,
}

impl ResultSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: i64) {
        self.values.push(value);
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<i64> {
        self.values.last().copied()
    }

    pub fn total(&self) -> i64 {
        self.values.iter().fold(0i64, |acc, v| acc.wrapping_add(*v))
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.summarized = 0;
    }

    /// Collapse every sample gathered since the previous call into one summed entry.
    pub fn summarize(&mut self) {
        if self.summarized >= self.values.len() {
            return;
        }
        let sum = self.values[self.summarized..]
            .iter()
            .fold(0i64, |acc, v| acc.wrapping_add(*v));
        self.values.truncate(self.summarized);
        self.values.push(sum);
        self.summarized = self.values.len();
    }
}

impl From<Vec<i64>> for ResultSeries {
    fn from(values: Vec<i64>) -> Self {
        Self {
            values,
            summarized: 0,
        }
    }
}

/// Result series keyed by series name, iterated in name order
pub type SeriesMap = BTreeMap<String, ResultSeries>;
