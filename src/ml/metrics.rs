//! Classification metrics: accuracy, support-weighted precision/recall/F1,
//! confusion matrix and a plain-text report.

use crate::ml::models::{ClassMetrics, ModelMetrics};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Compute metrics for class codes `0..class_names.len()`.
///
/// Averages are weighted by per-class support, matching the model selection
/// score. Classes with no predictions get precision 0.
pub fn calculate_metrics(y_true: &[usize], y_pred: &[usize], class_names: &[String]) -> ModelMetrics {
    let n_samples = y_true.len();
    let n_classes = class_names.len();
    if n_samples == 0 || n_classes == 0 {
        return ModelMetrics::new();
    }

    let confusion = confusion_matrix(y_true, y_pred, n_classes);

    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();
    let accuracy = correct as f64 / n_samples as f64;

    let mut per_class = BTreeMap::new();
    let mut weighted = (0.0, 0.0, 0.0);

    for (class_idx, name) in class_names.iter().enumerate() {
        let tp = confusion[[class_idx, class_idx]];
        let predicted: usize = confusion.column(class_idx).sum();
        let support: usize = confusion.row(class_idx).sum();

        let precision = ratio(tp, predicted);
        let recall = ratio(tp, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let share = support as f64 / n_samples as f64;
        weighted.0 += precision * share;
        weighted.1 += recall * share;
        weighted.2 += f1 * share;

        per_class.insert(
            name.clone(),
            ClassMetrics {
                precision,
                recall,
                f1_score: f1,
                support,
            },
        );
    }

    ModelMetrics {
        accuracy,
        precision: weighted.0,
        recall: weighted.1,
        f1_score: weighted.2,
        confusion_matrix: Some(confusion),
        per_class_metrics: per_class,
    }
}

/// Support-weighted F1 score over `n_classes` class codes
pub fn weighted_f1(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> f64 {
    let names: Vec<String> = (0..n_classes).map(|c| c.to_string()).collect();
    calculate_metrics(y_true, y_pred, &names).f1_score
}

/// Rows are true classes, columns predicted classes. Codes outside
/// `0..n_classes` are ignored.
pub fn confusion_matrix(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Array2<usize> {
    let mut matrix = Array2::<usize>::zeros((n_classes, n_classes));
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        if t < n_classes && p < n_classes {
            matrix[[t, p]] += 1;
        }
    }
    matrix
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

/// Per-class precision/recall/F1 table followed by accuracy and weighted averages
pub fn classification_report(metrics: &ModelMetrics) -> String {
    let mut report = String::new();
    let width = metrics
        .per_class_metrics
        .keys()
        .map(|k| k.len())
        .chain(std::iter::once("weighted avg".len()))
        .max()
        .unwrap_or(12);
    let total: usize = metrics.per_class_metrics.values().map(|m| m.support).sum();

    let _ = writeln!(
        report,
        "{:>width$} {:>9} {:>9} {:>9} {:>9}",
        "",
        "precision",
        "recall",
        "f1-score",
        "support",
        width = width
    );
    for (name, m) in &metrics.per_class_metrics {
        let _ = writeln!(
            report,
            "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            name,
            m.precision,
            m.recall,
            m.f1_score,
            m.support,
            width = width
        );
    }
    let _ = writeln!(report);
    let _ = writeln!(
        report,
        "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
        "accuracy",
        "",
        "",
        metrics.accuracy,
        total,
        width = width
    );
    let _ = writeln!(
        report,
        "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
        "weighted avg",
        metrics.precision,
        metrics.recall,
        metrics.f1_score,
        total,
        width = width
    );

    report
}
