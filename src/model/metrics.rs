use std::{collections::BTreeMap, fmt, str::FromStr};

use ndarray::ArrayView2;

use crate::{CleanerError, Result};

/// Decision threshold on the sigmoid outputs.
pub const THRESHOLD: f32 = 0.5;

/// Whether a sigmoid output counts as the factor being set.
pub fn is_set(p: f32) -> bool {
    p >= THRESHOLD
}

/// Metrics the line classifier can be compiled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    /// Share of correct decisions over every factor of every line.
    Accuracy,
    Precision,
    Recall,
    F1,
    /// Accuracy of the message-start factor alone.
    StartAccuracy,
    /// Accuracy of the body factor alone.
    BodyAccuracy,
}

/// Every registered metric.
pub const METRICS: [Metric; 6] = [
    Metric::Accuracy,
    Metric::Precision,
    Metric::Recall,
    Metric::F1,
    Metric::StartAccuracy,
    Metric::BodyAccuracy,
];

impl Metric {
    pub fn name(self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
            Self::Precision => "precision",
            Self::Recall => "recall",
            Self::F1 => "f1",
            Self::StartAccuracy => "start_accuracy",
            Self::BodyAccuracy => "body_accuracy",
        }
    }

    /// Resolves a list of metric names, failing on the first unknown one.
    pub fn parse_all<S: AsRef<str>>(names: &[S]) -> Result<Vec<Metric>> {
        names.iter().map(|n| n.as_ref().parse()).collect()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = CleanerError;

    fn from_str(s: &str) -> Result<Self> {
        METRICS
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| CleanerError::UnknownMetric(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Confusion {
    tp: usize,
    fp: usize,
    tn: usize,
    fn_: usize,
}

impl Confusion {
    fn add(&mut self, predicted: bool, actual: bool) {
        match (predicted, actual) {
            (true, true) => self.tp += 1,
            (true, false) => self.fp += 1,
            (false, false) => self.tn += 1,
            (false, true) => self.fn_ += 1,
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            tp: self.tp + other.tp,
            fp: self.fp + other.fp,
            tn: self.tn + other.tn,
            fn_: self.fn_ + other.fn_,
        }
    }

    fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.tp + self.tn + self.fp + self.fn_)
    }

    fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0. {
            0.
        } else {
            2. * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.
    } else {
        num as f64 / den as f64
    }
}

/// Confusion counts accumulated over one epoch, one set per factor.
#[derive(Debug, Clone, Default)]
pub struct MetricState {
    factors: Vec<Confusion>,
}

impl MetricState {
    pub fn new(factors: usize) -> Self {
        Self {
            factors: vec![Confusion::default(); factors],
        }
    }

    /// Adds a batch of sigmoid outputs and their 0/1 targets.
    pub fn update(&mut self, probs: ArrayView2<f32>, targets: ArrayView2<f32>) {
        for ((i, k), &p) in probs.indexed_iter() {
            if let Some(confusion) = self.factors.get_mut(k) {
                confusion.add(is_set(p), is_set(targets[[i, k]]));
            }
        }
    }

    pub fn value(&self, metric: Metric) -> f64 {
        let total = self
            .factors
            .iter()
            .fold(Confusion::default(), |acc, c| acc.merge(*c));
        let factor = |k: usize| self.factors.get(k).copied().unwrap_or_default();

        match metric {
            Metric::Accuracy => total.accuracy(),
            Metric::Precision => total.precision(),
            Metric::Recall => total.recall(),
            Metric::F1 => total.f1(),
            Metric::StartAccuracy => factor(0).accuracy(),
            Metric::BodyAccuracy => factor(1).accuracy(),
        }
    }
}

/// Per-epoch values of the loss and every compiled metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    history: BTreeMap<String, Vec<f64>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, value: f64) {
        self.history.entry(name.to_string()).or_default().push(value);
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.history.get(name).map(Vec::as_slice)
    }

    /// The value of the last epoch.
    pub fn last(&self, name: &str) -> Option<f64> {
        self.get(name)?.last().copied()
    }

    pub fn epochs(&self) -> usize {
        self.history.values().map(Vec::len).max().unwrap_or(0)
    }
}
