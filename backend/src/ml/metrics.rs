//! Train/test splitting and classification metrics

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Row indices of a train/test split
#[derive(Debug, Clone, PartialEq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Stratified split preserving the rain/no-rain ratio in both halves
///
/// A class with fewer than two members cannot be represented on both sides
/// and goes entirely to training.
pub fn stratified_split(labels: &[bool], test_ratio: f64, seed: u64) -> SplitIndices {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for class in [false, true] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == class)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(&mut rng);

        if members.len() < 2 {
            train.extend(members);
            continue;
        }

        let n_test = ((members.len() as f64 * test_ratio).round() as usize).clamp(1, members.len() - 1);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    SplitIndices { train, test }
}

pub fn accuracy(y_true: &[bool], y_pred: &[bool]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class metrics on the held-out rows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationReport {
    pub no_rain: ClassMetrics,
    pub rain: ClassMetrics,
    pub accuracy: f64,
    /// Support-weighted mean of the per-class F1 scores
    pub weighted_f1: f64,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn class_metrics(y_true: &[bool], y_pred: &[bool], class: bool) -> ClassMetrics {
    let mut tp = 0;
    let mut predicted = 0;
    let mut support = 0;
    for (&t, &p) in y_true.iter().zip(y_pred) {
        if p == class {
            predicted += 1;
        }
        if t == class {
            support += 1;
            if p == class {
                tp += 1;
            }
        }
    }

    let precision = ratio(tp, predicted);
    let recall = ratio(tp, support);
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    ClassMetrics {
        precision,
        recall,
        f1_score,
        support,
    }
}

pub fn classification_report(y_true: &[bool], y_pred: &[bool]) -> ClassificationReport {
    let no_rain = class_metrics(y_true, y_pred, false);
    let rain = class_metrics(y_true, y_pred, true);
    let total = no_rain.support + rain.support;
    let weighted_f1 = if total == 0 {
        0.0
    } else {
        (no_rain.f1_score * no_rain.support as f64 + rain.f1_score * rain.support as f64) / total as f64
    };

    ClassificationReport {
        accuracy: accuracy(y_true, y_pred),
        weighted_f1,
        no_rain,
        rain,
    }
}
