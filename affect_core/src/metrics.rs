//! Classification metrics over integer labels and positive-class scores.
//!
//! Per-class statistics range over the union of labels seen in `y_true` and
//! `y_pred`. Precision, recall and F1 are zero when their denominator is zero.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Rows are true labels, columns predicted labels, both in `labels` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    labels: Vec<usize>,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(y_true: &[usize], y_pred: &[usize]) -> Self {
        let mut labels: Vec<usize> = y_true.iter().chain(y_pred).copied().collect();
        labels.sort_unstable();
        labels.dedup();
        Self::with_labels(y_true, y_pred, labels)
    }

    pub fn with_labels(y_true: &[usize], y_pred: &[usize], labels: Vec<usize>) -> Self {
        let mut counts = vec![vec![0; labels.len()]; labels.len()];
        for (t, p) in y_true.iter().zip(y_pred) {
            if let (Some(i), Some(j)) = (
                labels.iter().position(|l| l == t),
                labels.iter().position(|l| l == p),
            ) {
                counts[i][j] += 1;
            }
        }
        Self { labels, counts }
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn counts(&self) -> &[Vec<usize>] {
        &self.counts
    }

    fn index(&self, label: usize) -> Option<usize> {
        self.labels.iter().position(|&l| l == label)
    }

    pub fn get(&self, true_label: usize, predicted_label: usize) -> usize {
        match (self.index(true_label), self.index(predicted_label)) {
            (Some(i), Some(j)) => self.counts[i][j],
            _ => 0,
        }
    }

    pub fn support(&self, label: usize) -> usize {
        self.index(label)
            .map_or(0, |i| self.counts[i].iter().sum())
    }

    pub fn predicted(&self, label: usize) -> usize {
        self.index(label)
            .map_or(0, |j| self.counts.iter().map(|row| row[j]).sum())
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    ratio(correct, y_true.len())
}

/// Precision, recall and F1 for one label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub label: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

pub fn per_class_scores(y_true: &[usize], y_pred: &[usize]) -> Vec<ClassScores> {
    let cm = ConfusionMatrix::new(y_true, y_pred);
    cm.labels()
        .iter()
        .map(|&label| {
            let tp = cm.get(label, label);
            let precision = ratio(tp, cm.predicted(label));
            let recall = ratio(tp, cm.support(label));
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassScores {
                label,
                precision,
                recall,
                f1,
                support: cm.support(label),
            }
        })
        .collect()
}

pub fn macro_f1(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let scores = per_class_scores(y_true, y_pred);
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().map(|s| s.f1).sum::<f64>() / scores.len() as f64
}

/// F1 averaged with weights proportional to true-label support.
pub fn weighted_f1(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let scores = per_class_scores(y_true, y_pred);
    let total: usize = scores.iter().map(|s| s.support).sum();
    if total == 0 {
        return 0.0;
    }
    scores
        .iter()
        .map(|s| s.f1 * s.support as f64)
        .sum::<f64>()
        / total as f64
}

/// Mean recall over the labels present in `y_true`.
pub fn balanced_accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    let recalls: Vec<f64> = per_class_scores(y_true, y_pred)
        .into_iter()
        .filter(|s| s.support > 0)
        .map(|s| s.recall)
        .collect();
    if recalls.is_empty() {
        return 0.0;
    }
    recalls.iter().sum::<f64>() / recalls.len() as f64
}

fn class_counts(y_true: &[usize]) -> (usize, usize) {
    let positives = y_true.iter().filter(|&&y| y == 1).count();
    (positives, y_true.len() - positives)
}

/// Area under the ROC curve via the rank-sum statistic, ties sharing their mean rank.
///
/// `None` unless both classes occur in `y_true`.
pub fn roc_auc(y_true: &[usize], scores: &[f64]) -> Option<f64> {
    let (positives, negatives) = class_counts(y_true);
    if positives == 0 || negatives == 0 {
        return None;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        let mean_rank = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            ranks[idx] = mean_rank;
        }
        start = end + 1;
    }

    let positive_rank_sum: f64 = y_true
        .iter()
        .zip(&ranks)
        .filter(|&(&y, _)| y == 1)
        .map(|(_, r)| r)
        .sum();
    let p = positives as f64;
    let u = positive_rank_sum - p * (p + 1.0) / 2.0;
    Some(u / (p * negatives as f64))
}

/// Trapezoidal area under the precision-recall curve.
///
/// The curve has one point per distinct score (highest first) and starts at
/// recall 0, precision 1. `None` unless both classes occur in `y_true`.
pub fn pr_auc(y_true: &[usize], scores: &[f64]) -> Option<f64> {
    let (positives, negatives) = class_counts(y_true);
    if positives == 0 || negatives == 0 {
        return None;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut area = 0.0;
    let (mut prev_recall, mut prev_precision) = (0.0, 1.0);
    let (mut tp, mut fp) = (0usize, 0usize);
    for (pos, &idx) in order.iter().enumerate() {
        if y_true[idx] == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_tie = pos + 1 == order.len() || scores[order[pos + 1]] != scores[idx];
        if !last_of_tie {
            continue;
        }
        let recall = tp as f64 / positives as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        area += (recall - prev_recall) * (precision + prev_precision) / 2.0;
        prev_recall = recall;
        prev_precision = precision;
    }
    Some(area)
}

/// Objective maximised by the decision-threshold search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMetric {
    MacroF1,
    BalancedAccuracy,
    Accuracy,
}

impl ThresholdMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdMetric::MacroF1 => "f1_macro",
            ThresholdMetric::BalancedAccuracy => "balanced_accuracy",
            ThresholdMetric::Accuracy => "accuracy",
        }
    }

    pub fn score(&self, y_true: &[usize], y_pred: &[usize]) -> f64 {
        match self {
            ThresholdMetric::MacroF1 => macro_f1(y_true, y_pred),
            ThresholdMetric::BalancedAccuracy => balanced_accuracy(y_true, y_pred),
            ThresholdMetric::Accuracy => accuracy(y_true, y_pred),
        }
    }
}

impl FromStr for ThresholdMetric {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "f1_macro" | "macro_f1" | "f1" => Ok(ThresholdMetric::MacroF1),
            "balanced_accuracy" => Ok(ThresholdMetric::BalancedAccuracy),
            "accuracy" => Ok(ThresholdMetric::Accuracy),
            other => Err(format!("unknown threshold metric '{other}'")),
        }
    }
}

/// Averaged precision, recall and F1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragedScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Per-class and averaged scores, printable as a plain-text table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassScores>,
    pub accuracy: f64,
    pub macro_avg: AveragedScores,
    pub weighted_avg: AveragedScores,
    pub support: usize,
}

impl ClassificationReport {
    pub fn new(y_true: &[usize], y_pred: &[usize]) -> Self {
        let classes = per_class_scores(y_true, y_pred);
        let n = classes.len().max(1) as f64;
        let support: usize = classes.iter().map(|c| c.support).sum();
        let w = |c: &ClassScores| {
            if support == 0 {
                0.0
            } else {
                c.support as f64 / support as f64
            }
        };

        let macro_avg = AveragedScores {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / n,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / n,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / n,
        };
        let weighted_avg = AveragedScores {
            precision: classes.iter().map(|c| c.precision * w(c)).sum(),
            recall: classes.iter().map(|c| c.recall * w(c)).sum(),
            f1: classes.iter().map(|c| c.f1 * w(c)).sum(),
        };

        Self {
            accuracy: accuracy(y_true, y_pred),
            classes,
            macro_avg,
            weighted_avg,
            support,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.support
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, avg.precision, avg.recall, avg.f1, self.support
            )?;
        }
        Ok(())
    }
}
