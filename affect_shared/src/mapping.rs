//! Column mapping between two independently recorded datasets.
//!
//! The two datasets name their physiological features differently (e.g. an ECG
//! derived heart-rate column on one side, a wrist PPG heart-rate column on the
//! other). A [`FeatureMapping`] lists the equivalent pairs; [`build_domain_pair`]
//! keeps the pairs that are usable on both sides and turns the continuous
//! affect scores into binary labels.

use ndarray::{Array2, ArrayView1};

use crate::dimension::TargetDimension;
use crate::matrix::FeatureMatrix;
use crate::source::{DomainPair, SourceError};

/// Pairs with more missing cells than this fraction on either side are dropped.
pub const MAX_MISSING_FRACTION: f64 = 0.1;

/// Pairs whose sample standard deviation falls below this on either side are dropped.
pub const MIN_STD: f64 = 1e-6;

/// A dataset table as exported by the feature extractor. Missing cells are NaN.
#[derive(Debug, Clone)]
pub struct RawTable {
    dataset: String,
    columns: Vec<String>,
    data: Array2<f64>,
}

impl RawTable {
    pub fn new(
        dataset: impl Into<String>,
        columns: Vec<String>,
        data: Array2<f64>,
    ) -> Result<Self, SourceError> {
        let dataset = dataset.into();
        if columns.len() != data.ncols() {
            return Err(SourceError::MalformedTable {
                dataset,
                columns: columns.len(),
                width: data.ncols(),
            });
        }
        Ok(Self {
            dataset,
            columns,
            data,
        })
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|idx| self.data.column(idx))
    }

    fn require_column(&self, name: &str) -> Result<ArrayView1<'_, f64>, SourceError> {
        self.column(name).ok_or_else(|| SourceError::MissingColumn {
            dataset: self.dataset.clone(),
            column: name.to_string(),
        })
    }
}

/// Ordered list of (source column, target column) equivalences.
#[derive(Debug, Clone, Default)]
pub struct FeatureMapping {
    pairs: Vec<(String, String)>,
}

impl FeatureMapping {
    pub fn new<S: Into<String>, T: Into<String>>(pairs: impl IntoIterator<Item = (S, T)>) -> Self {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(s, t)| (s.into(), t.into()))
                .collect(),
        }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Pairs present in both tables that pass the missing-value and variance filters.
    pub fn qualified(&self, source: &RawTable, target: &RawTable) -> Vec<(String, String)> {
        self.pairs
            .iter()
            .filter(|(s, t)| match (source.column(s), target.column(t)) {
                (Some(sc), Some(tc)) => column_usable(sc) && column_usable(tc),
                _ => false,
            })
            .cloned()
            .collect()
    }
}

fn column_usable(column: ArrayView1<'_, f64>) -> bool {
    let n = column.len();
    if n == 0 {
        return false;
    }
    let present: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
    let missing = n - present.len();
    if missing as f64 > MAX_MISSING_FRACTION * n as f64 {
        return false;
    }
    sample_std(&present).map_or(false, |std| std >= MIN_STD)
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

/// Median of the finite values, averaging the two middle values for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Label 1 for scores strictly above the dataset median, 0 otherwise.
pub fn binarize_by_median(scores: &[f64]) -> Vec<usize> {
    match median(scores) {
        Some(threshold) => scores
            .iter()
            .map(|&s| usize::from(s > threshold))
            .collect(),
        None => vec![0; scores.len()],
    }
}

/// Restrict both tables to the qualified mapped columns and binarise `dimension`.
///
/// Rows with a missing value in any kept column (or in the score column) are
/// dropped before the median is taken.
pub fn build_domain_pair(
    source: &RawTable,
    target: &RawTable,
    mapping: &FeatureMapping,
    dimension: TargetDimension,
) -> Result<DomainPair, SourceError> {
    let pairs = mapping.qualified(source, target);
    if pairs.is_empty() {
        return Err(SourceError::NoCommonFeatures);
    }

    let source_names: Vec<String> = pairs.iter().map(|(s, _)| s.clone()).collect();
    let target_names: Vec<String> = pairs.iter().map(|(_, t)| t.clone()).collect();

    let source_matrix = mapped_matrix(source, source_names, dimension)?;
    let target_matrix = mapped_matrix(target, target_names, dimension)?;
    DomainPair::new(source_matrix, target_matrix)
}

fn mapped_matrix(
    table: &RawTable,
    names: Vec<String>,
    dimension: TargetDimension,
) -> Result<FeatureMatrix, SourceError> {
    let scores = table.require_column(dimension.as_str())?;
    let columns = names
        .iter()
        .map(|name| table.require_column(name))
        .collect::<Result<Vec<_>, _>>()?;

    let complete: Vec<usize> = (0..table.n_rows())
        .filter(|&row| scores[row].is_finite() && columns.iter().all(|c| c[row].is_finite()))
        .collect();

    let mut data = Array2::zeros((complete.len(), columns.len()));
    for (out_row, &row) in complete.iter().enumerate() {
        for (col_idx, column) in columns.iter().enumerate() {
            data[[out_row, col_idx]] = column[row];
        }
    }
    let kept_scores: Vec<f64> = complete.iter().map(|&row| scores[row]).collect();
    let labels = binarize_by_median(&kept_scores);

    Ok(FeatureMatrix::new(table.dataset(), names, data, labels)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn tables() -> (RawTable, RawTable) {
        let source = RawTable::new(
            "wesad",
            vec![
                "ECG_mean".into(),
                "EDA_mean".into(),
                "TEMP_mean".into(),
                "arousal".into(),
            ],
            array![
                [70.0, 1.0, 33.0, 2.5],
                [80.0, 2.0, 33.0, 4.5],
                [75.0, 1.5, 33.0, 4.2],
                [65.0, 0.5, 33.0, 1.6],
            ],
        )
        .unwrap();
        let target = RawTable::new(
            "kemocon",
            vec![
                "HR_mean".into(),
                "EDA_mean".into(),
                "TEMP_mean".into(),
                "arousal".into(),
            ],
            array![
                [60.0, 0.2, 31.0, 1.0],
                [62.0, f64::NAN, 31.5, 3.0],
                [64.0, 0.4, 32.0, 5.0],
                [66.0, 0.5, 32.5, 2.0],
            ],
        )
        .unwrap();
        (source, target)
    }

    fn mapping() -> FeatureMapping {
        FeatureMapping::new([
            ("ECG_mean", "HR_mean"),
            ("EDA_mean", "EDA_mean"),
            ("TEMP_mean", "TEMP_mean"),
            ("ECG_std", "HR_std"),
        ])
    }

    #[test]
    fn median_of_even_count_averages_middle() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn binarize_is_strictly_above_median() {
        assert_eq!(binarize_by_median(&[1.0, 2.0, 3.0]), vec![0, 0, 1]);
    }

    #[test]
    fn qualification_drops_constant_missing_and_absent_columns() {
        let (source, target) = tables();
        let kept = mapping().qualified(&source, &target);
        // TEMP is constant in the source; EDA misses 25% in the target; ECG_std is absent.
        assert_eq!(kept, vec![("ECG_mean".to_string(), "HR_mean".to_string())]);
    }

    #[test]
    fn builds_matched_pair() {
        let (source, target) = tables();
        let pair =
            build_domain_pair(&source, &target, &mapping(), TargetDimension::Arousal).unwrap();
        assert_eq!(pair.source().n_features(), 1);
        assert_eq!(pair.target().feature_names(), &["HR_mean".to_string()]);
        assert_eq!(pair.source().labels(), &[0, 1, 1, 0]);
    }

    #[test]
    fn missing_score_column_is_reported() {
        let (source, target) = tables();
        let err =
            build_domain_pair(&source, &target, &mapping(), TargetDimension::Valence).unwrap_err();
        assert!(matches!(err, SourceError::MissingColumn { .. }));
    }
}
