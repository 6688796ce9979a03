//! Synthetic minority oversampling and nearest-neighbour cleaning.
//!
//! All resamplers treat the data as binary: the least frequent label present is
//! the minority, the most frequent the majority. Synthetic rows are appended
//! after the original rows.

use ndarray::{concatenate, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use affect_shared::ClassDistribution;

use super::neighbors::{k_nearest, neighbor_table};
use crate::stats::select_rows;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResampleError {
    #[error("resampling needs two classes, found {present}")]
    SingleClass { present: usize },

    #[error("{available} minority samples cannot supply {needed} neighbours each")]
    InsufficientNeighbors { available: usize, needed: usize },

    #[error("no minority sample has a majority-class neighbour")]
    NoHardSamples,

    #[error("requested ratio generates no new samples")]
    NothingToGenerate,

    #[error("minority ratio fell from {before:.3} to {after:.3}")]
    RatioRegressed { before: f64, after: f64 },
}

pub type Resampled = (Array2<f64>, Vec<usize>);

/// A strategy that rewrites a labelled matrix to change its class balance.
pub trait Resampler {
    fn name(&self) -> &'static str;

    fn fit_resample(&self, x: ArrayView2<'_, f64>, y: &[usize]) -> Result<Resampled, ResampleError>;
}

struct Classes {
    minority: usize,
    n_minority: usize,
    n_majority: usize,
    minority_rows: Vec<usize>,
}

fn binary_classes(y: &[usize]) -> Result<Classes, ResampleError> {
    let dist = ClassDistribution::from_labels(y);
    let (Some(minority), Some(majority)) = (dist.minority_label(), dist.majority_label()) else {
        return Err(ResampleError::SingleClass { present: 0 });
    };
    if dist.n_present() < 2 {
        return Err(ResampleError::SingleClass {
            present: dist.n_present(),
        });
    }
    Ok(Classes {
        minority,
        n_minority: dist.count(minority),
        n_majority: dist.count(majority),
        minority_rows: (0..y.len()).filter(|&i| y[i] == minority).collect(),
    })
}

/// Minority samples needed so that minority/majority reaches `ratio`.
fn samples_to_generate(classes: &Classes, ratio: f64) -> usize {
    let target = (classes.n_majority as f64 * ratio).floor() as usize;
    target.saturating_sub(classes.n_minority)
}

fn interpolate(from: ArrayView1<'_, f64>, to: ArrayView1<'_, f64>, gap: f64) -> Vec<f64> {
    from.iter().zip(to.iter()).map(|(a, b)| a + gap * (b - a)).collect()
}

fn append(
    x: ArrayView2<'_, f64>,
    y: &[usize],
    synthetic: Vec<f64>,
    label: usize,
) -> Resampled {
    let n_new = synthetic.len() / x.ncols().max(1);
    let extra = Array2::from_shape_vec((n_new, x.ncols()), synthetic)
        .unwrap_or_else(|_| Array2::zeros((0, x.ncols())));
    let features =
        concatenate(Axis(0), &[x.reborrow(), extra.view()]).unwrap_or_else(|_| x.to_owned());
    let mut labels = y.to_vec();
    labels.extend(std::iter::repeat(label).take(extra.nrows()));
    (features, labels)
}

/// Synthetic Minority Over-sampling TEchnique.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smote {
    pub k_neighbors: usize,
    /// Desired minority/majority ratio after oversampling.
    pub sampling_strategy: f64,
    pub seed: u64,
}

impl Resampler for Smote {
    fn name(&self) -> &'static str {
        "smote"
    }

    fn fit_resample(&self, x: ArrayView2<'_, f64>, y: &[usize]) -> Result<Resampled, ResampleError> {
        let classes = binary_classes(y)?;
        let n_new = samples_to_generate(&classes, self.sampling_strategy);
        if n_new == 0 {
            return Ok((x.to_owned(), y.to_vec()));
        }
        let k = self.k_neighbors;
        if classes.n_minority <= k {
            return Err(ResampleError::InsufficientNeighbors {
                available: classes.n_minority,
                needed: k + 1,
            });
        }

        let minority = select_rows(x, &classes.minority_rows);
        let neighbors = neighbor_table(minority.view(), k);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut synthetic = Vec::with_capacity(n_new * x.ncols());
        for _ in 0..n_new {
            let pick = rng.gen_range(0..classes.n_minority * k);
            let (row, col) = (pick / k, pick % k);
            let gap: f64 = rng.gen();
            synthetic.extend(interpolate(
                minority.row(row),
                minority.row(neighbors[row][col]),
                gap,
            ));
        }
        Ok(append(x, y, synthetic, classes.minority))
    }
}

/// ADAptive SYNthetic sampling: more synthetic points around minority samples
/// surrounded by the majority class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adasyn {
    pub n_neighbors: usize,
    pub sampling_strategy: f64,
    pub seed: u64,
}

impl Resampler for Adasyn {
    fn name(&self) -> &'static str {
        "adasyn"
    }

    fn fit_resample(&self, x: ArrayView2<'_, f64>, y: &[usize]) -> Result<Resampled, ResampleError> {
        let classes = binary_classes(y)?;
        let n_new = samples_to_generate(&classes, self.sampling_strategy);
        if n_new == 0 {
            return Ok((x.to_owned(), y.to_vec()));
        }
        let k = self.n_neighbors;
        if classes.n_minority <= k {
            return Err(ResampleError::InsufficientNeighbors {
                available: classes.n_minority,
                needed: k + 1,
            });
        }

        let hardness: Vec<f64> = classes
            .minority_rows
            .iter()
            .map(|&i| {
                let around = k_nearest(x, x.row(i), k, Some(i));
                around.iter().filter(|&&j| y[j] != classes.minority).count() as f64 / k as f64
            })
            .collect();
        let total: f64 = hardness.iter().sum();
        if total <= 0.0 {
            return Err(ResampleError::NoHardSamples);
        }
        let per_sample: Vec<usize> = hardness
            .iter()
            .map(|h| (h / total * n_new as f64).round() as usize)
            .collect();
        if per_sample.iter().sum::<usize>() == 0 {
            return Err(ResampleError::NothingToGenerate);
        }

        let minority = select_rows(x, &classes.minority_rows);
        let neighbors = neighbor_table(minority.view(), k);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut synthetic = Vec::new();
        for (row, &count) in per_sample.iter().enumerate() {
            for _ in 0..count {
                let col = rng.gen_range(0..k);
                let gap: f64 = rng.gen();
                synthetic.extend(interpolate(
                    minority.row(row),
                    minority.row(neighbors[row][col]),
                    gap,
                ));
            }
        }
        Ok(append(x, y, synthetic, classes.minority))
    }
}

/// SMOTE to a full balance, then Edited Nearest Neighbours cleaning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoteEnn {
    pub k_neighbors: usize,
    pub enn_neighbors: usize,
    pub seed: u64,
}

impl SmoteEnn {
    /// Keep rows whose `enn_neighbors` nearest rows all share their label.
    ///
    /// A class that would lose every row is kept whole.
    pub fn clean(&self, x: ArrayView2<'_, f64>, y: &[usize]) -> Resampled {
        let k = self.enn_neighbors;
        let agrees: Vec<bool> = (0..y.len())
            .map(|i| {
                k_nearest(x, x.row(i), k, Some(i))
                    .iter()
                    .all(|&j| y[j] == y[i])
            })
            .collect();

        let survivors = ClassDistribution::from_labels(
            &y.iter()
                .zip(&agrees)
                .filter(|&(_, &keep)| keep)
                .map(|(&label, _)| label)
                .collect::<Vec<_>>(),
        );
        let keep: Vec<usize> = (0..y.len())
            .filter(|&i| agrees[i] || survivors.count(y[i]) == 0)
            .collect();

        let labels = keep.iter().map(|&i| y[i]).collect();
        (select_rows(x, &keep), labels)
    }
}

impl Resampler for SmoteEnn {
    fn name(&self) -> &'static str {
        "smoteenn"
    }

    fn fit_resample(&self, x: ArrayView2<'_, f64>, y: &[usize]) -> Result<Resampled, ResampleError> {
        let smote = Smote {
            k_neighbors: self.k_neighbors,
            sampling_strategy: 1.0,
            seed: self.seed,
        };
        let (oversampled, labels) = smote.fit_resample(x, y)?;
        Ok(self.clean(oversampled.view(), &labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn synthetic_rows_follow_the_originals() {
        let x = array![[0.0, 1.0], [2.0, 3.0]];
        let (features, labels) = append(x.view(), &[0, 1], vec![4.0, 5.0, 6.0, 7.0], 1);
        assert_eq!(features, array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.0], [6.0, 7.0]]);
        assert_eq!(labels, vec![0, 1, 1, 1]);
    }

    /// 40 majority rows around 0 and `n_min` minority rows around 5.
    fn imbalanced(n_min: usize) -> (Array2<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 40 + n_min;
        let mut x = Array2::zeros((n, 2));
        let mut y = vec![0; n];
        for i in 0..n {
            let centre = if i < 40 { 0.0 } else { 5.0 };
            if i >= 40 {
                y[i] = 1;
            }
            for j in 0..2 {
                x[[i, j]] = centre + rng.gen_range(-1.0..1.0);
            }
        }
        (x, y)
    }

    #[test]
    fn smote_reaches_requested_ratio() {
        let (x, y) = imbalanced(10);
        let smote = Smote {
            k_neighbors: 5,
            sampling_strategy: 0.8,
            seed: 42,
        };
        let (xr, yr) = smote.fit_resample(x.view(), &y).unwrap();
        let dist = ClassDistribution::from_labels(&yr);
        assert_eq!(dist.counts(), &[40, 32]);
        assert_eq!(xr.nrows(), 72);
        // Originals come first, untouched.
        assert_eq!(xr.slice(ndarray::s![..50, ..]), x);
        // Synthetic rows stay inside the minority cluster's bounding box.
        for row in xr.slice(ndarray::s![50.., ..]).outer_iter() {
            assert!(row.iter().all(|&v| (4.0..=6.0).contains(&v)));
        }
    }

    #[test]
    fn smote_needs_enough_minority_neighbours() {
        let (x, y) = imbalanced(5);
        let smote = Smote {
            k_neighbors: 5,
            sampling_strategy: 0.8,
            seed: 42,
        };
        assert_eq!(
            smote.fit_resample(x.view(), &y).unwrap_err(),
            ResampleError::InsufficientNeighbors {
                available: 5,
                needed: 6
            }
        );
    }

    #[test]
    fn adasyn_rejects_well_separated_minority() {
        let (x, y) = imbalanced(10);
        let adasyn = Adasyn {
            n_neighbors: 5,
            sampling_strategy: 0.8,
            seed: 42,
        };
        assert_eq!(
            adasyn.fit_resample(x.view(), &y).unwrap_err(),
            ResampleError::NoHardSamples
        );
    }

    #[test]
    fn adasyn_focuses_on_hard_samples() {
        let (mut x, y) = imbalanced(10);
        // Drop one minority row into the majority cluster.
        x[[40, 0]] = 0.1;
        x[[40, 1]] = 0.1;
        let adasyn = Adasyn {
            n_neighbors: 5,
            sampling_strategy: 0.8,
            seed: 42,
        };
        let (xr, yr) = adasyn.fit_resample(x.view(), &y).unwrap();
        let added = yr.len() - y.len();
        assert_eq!(added, 22);
        assert!(yr[y.len()..].iter().all(|&l| l == 1));
        assert_eq!(xr.nrows(), yr.len());
    }

    #[test]
    fn smote_enn_balances_then_cleans() {
        let (x, y) = imbalanced(10);
        let resampler = SmoteEnn {
            k_neighbors: 5,
            enn_neighbors: 3,
            seed: 42,
        };
        let (xr, yr) = resampler.fit_resample(x.view(), &y).unwrap();
        let dist = ClassDistribution::from_labels(&yr);
        // Clusters do not overlap, so cleaning removes nothing.
        assert_eq!(dist.counts(), &[40, 40]);
        assert_eq!(xr.nrows(), 80);
    }

    #[test]
    fn enn_drops_points_near_the_other_class() {
        let x = ndarray::array![
            [0.0], [1.0], [2.0], [3.0], [4.0], [5.0], [6.0],
            [3.05],
            [20.0], [20.1], [20.2], [20.3]
        ];
        let y = [0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
        let resampler = SmoteEnn {
            k_neighbors: 1,
            enn_neighbors: 3,
            seed: 0,
        };
        let (xr, labels) = resampler.clean(x.view(), &y);
        assert_eq!(labels, vec![0, 0, 1, 1, 1, 1]);
        assert_eq!(xr[[1, 0]], 1.0);
        assert_eq!(xr[[2, 0]], 20.0);
    }

    #[test]
    fn enn_never_empties_a_class() {
        let x = ndarray::array![[0.0], [0.1], [5.0], [5.1], [5.2], [5.3]];
        let y = [0, 0, 1, 1, 1, 1];
        let resampler = SmoteEnn {
            k_neighbors: 1,
            enn_neighbors: 3,
            seed: 0,
        };
        let (_, labels) = resampler.clean(x.view(), &y);
        assert_eq!(labels, y.to_vec());
    }
}
