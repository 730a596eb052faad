use serde::{Deserialize, Serialize};
use tabfit_core::{TabError, TabResult};
use tracing::warn;

fn check_lengths(a: usize, b: usize) -> TabResult<()> {
    if a != b {
        return Err(TabError::DimensionMismatch(format!(
            "{} truth values but {} predictions",
            a, b
        )));
    }
    Ok(())
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Fraction of correct predictions.
pub fn accuracy<S: AsRef<str>>(truth: &[S], predicted: &[S]) -> TabResult<f64> {
    check_lengths(truth.len(), predicted.len())?;
    let correct = truth
        .iter()
        .zip(predicted)
        .filter(|(t, p)| t.as_ref() == p.as_ref())
        .count();
    Ok(ratio(correct, truth.len()))
}

/// Counts of a binary confusion table relative to one positive class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BinaryCounts {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl BinaryCounts {
    pub fn new<S: AsRef<str>>(truth: &[S], predicted: &[S], positive: &str) -> TabResult<Self> {
        check_lengths(truth.len(), predicted.len())?;
        let mut counts = BinaryCounts::default();
        for (t, p) in truth.iter().zip(predicted) {
            match (t.as_ref() == positive, p.as_ref() == positive) {
                (true, true) => counts.tp += 1,
                (false, true) => counts.fp += 1,
                (false, false) => counts.tn += 1,
                (true, false) => counts.fn_ += 1,
            }
        }
        Ok(counts)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn specificity(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

pub fn precision<S: AsRef<str>>(truth: &[S], predicted: &[S], positive: &str) -> TabResult<f64> {
    Ok(BinaryCounts::new(truth, predicted, positive)?.precision())
}

pub fn recall<S: AsRef<str>>(truth: &[S], predicted: &[S], positive: &str) -> TabResult<f64> {
    Ok(BinaryCounts::new(truth, predicted, positive)?.recall())
}

pub fn specificity<S: AsRef<str>>(truth: &[S], predicted: &[S], positive: &str) -> TabResult<f64> {
    Ok(BinaryCounts::new(truth, predicted, positive)?.specificity())
}

pub fn f1<S: AsRef<str>>(truth: &[S], predicted: &[S], positive: &str) -> TabResult<f64> {
    Ok(BinaryCounts::new(truth, predicted, positive)?.f1())
}

/// Area under the ROC curve of `scores` (probability of `positive`).
///
/// Trapezoidal rule over thresholds in descending score order; rows with
/// equal scores enter the curve together. Returns 0.5 when only one class is
/// present.
pub fn roc_auc<S: AsRef<str>>(truth: &[S], scores: &[f64], positive: &str) -> TabResult<f64> {
    check_lengths(truth.len(), scores.len())?;
    if scores.iter().any(|s| s.is_nan()) {
        return Err(TabError::invalid_argument("scores", "probabilities must not be NaN"));
    }
    let mut pairs: Vec<(f64, bool)> = scores
        .iter()
        .zip(truth)
        .map(|(&s, t)| (s, t.as_ref() == positive))
        .collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let total_pos = pairs.iter().filter(|(_, p)| *p).count() as f64;
    let total_neg = pairs.len() as f64 - total_pos;
    if total_pos == 0.0 || total_neg == 0.0 {
        warn!(positive, "roc_auc undefined with a single class present, reporting 0.5");
        return Ok(0.5);
    }

    let (mut tp, mut fp) = (0.0, 0.0);
    let (mut prev_tpr, mut prev_fpr) = (0.0, 0.0);
    let mut auc = 0.0;
    let mut i = 0;
    while i < pairs.len() {
        let score = pairs[i].0;
        while i < pairs.len() && pairs[i].0 == score {
            if pairs[i].1 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            i += 1;
        }
        let tpr = tp / total_pos;
        let fpr = fp / total_neg;
        auc += (fpr - prev_fpr) * (tpr + prev_tpr) / 2.0;
        prev_tpr = tpr;
        prev_fpr = fpr;
    }
    Ok(auc)
}

/// Counts of truth (rows) against prediction (columns) over a fixed label order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Build over `labels`, which must contain every truth and predicted value.
    pub fn new<S: AsRef<str>>(truth: &[S], predicted: &[S], labels: &[String]) -> TabResult<Self> {
        check_lengths(truth.len(), predicted.len())?;
        let index = |s: &str| {
            labels.iter().position(|l| l == s).ok_or_else(|| {
                TabError::invalid_argument("labels", format!("`{}` is not a confusion matrix label", s))
            })
        };
        let mut counts = vec![vec![0usize; labels.len()]; labels.len()];
        for (t, p) in truth.iter().zip(predicted) {
            counts[index(t.as_ref())?][index(p.as_ref())?] += 1;
        }
        Ok(ConfusionMatrix {
            labels: labels.to_vec(),
            counts,
        })
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Count of rows with truth `actual` predicted as `predicted`.
    pub fn get(&self, actual: &str, predicted: &str) -> usize {
        let index = |s: &str| self.labels.iter().position(|l| l == s);
        match (index(actual), index(predicted)) {
            (Some(a), Some(p)) => self.counts[a][p],
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn labels() -> (Vec<&'static str>, Vec<&'static str>) {
        let truth = vec!["yes", "yes", "yes", "no", "no", "no", "no", "yes"];
        let pred = vec!["yes", "no", "yes", "no", "yes", "no", "no", "yes"];
        (truth, pred)
    }

    #[test]
    fn test_accuracy() {
        let (t, p) = labels();
        assert_abs_diff_eq!(accuracy(&t, &p).unwrap(), 6.0 / 8.0);
    }

    #[test]
    fn test_binary_metrics() {
        let (t, p) = labels();
        let c = BinaryCounts::new(&t, &p, "yes").unwrap();
        assert_eq!(c, BinaryCounts { tp: 3, fp: 1, tn: 3, fn_: 1 });
        assert_abs_diff_eq!(precision(&t, &p, "yes").unwrap(), 0.75);
        assert_abs_diff_eq!(recall(&t, &p, "yes").unwrap(), 0.75);
        assert_abs_diff_eq!(specificity(&t, &p, "yes").unwrap(), 0.75);
        assert_abs_diff_eq!(f1(&t, &p, "yes").unwrap(), 0.75);
    }

    #[test]
    fn test_undefined_ratio_is_zero() {
        let t = ["no", "no"];
        let p = ["no", "no"];
        assert_eq!(precision(&t, &p, "yes").unwrap(), 0.0);
        assert_eq!(f1(&t, &p, "yes").unwrap(), 0.0);
    }

    #[test]
    fn test_roc_auc_perfect_and_inverted() {
        let t = ["no", "no", "yes", "yes"];
        assert_abs_diff_eq!(roc_auc(&t, &[0.1, 0.2, 0.8, 0.9], "yes").unwrap(), 1.0);
        assert_abs_diff_eq!(roc_auc(&t, &[0.9, 0.8, 0.2, 0.1], "yes").unwrap(), 0.0);
    }

    #[test]
    fn test_roc_auc_ties_grouped() {
        // all scores tied: the curve is the diagonal
        let t = ["no", "yes", "no", "yes"];
        assert_abs_diff_eq!(roc_auc(&t, &[0.5; 4], "yes").unwrap(), 0.5);
        // one positive tied with one negative above the rest
        let t = ["yes", "no", "no", "yes"];
        let s = [0.9, 0.9, 0.1, 0.2];
        assert_abs_diff_eq!(roc_auc(&t, &s, "yes").unwrap(), 0.625);
    }

    #[test]
    fn test_roc_auc_single_class() {
        assert_eq!(roc_auc(&["yes", "yes"], &[0.2, 0.4], "yes").unwrap(), 0.5);
    }

    #[test]
    fn test_confusion_matrix() {
        let (t, p) = labels();
        let cm = ConfusionMatrix::new(&t, &p, &["no".to_string(), "yes".to_string()]).unwrap();
        assert_eq!(cm.counts, vec![vec![3, 1], vec![1, 3]]);
        assert_eq!(cm.get("yes", "no"), 1);
        assert_eq!(cm.total(), 8);
    }

    #[test]
    fn test_confusion_matrix_rejects_unlisted_label() {
        assert!(matches!(
            ConfusionMatrix::new(&["a", "c"], &["a", "a"], &["a".to_string(), "b".to_string()]),
            Err(TabError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            accuracy(&["a"], &["a", "b"]),
            Err(TabError::DimensionMismatch(_))
        ));
    }
}
