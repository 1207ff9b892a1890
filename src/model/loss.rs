//! Loss and metric helpers over batched class scores.

use crate::core::error::{Error, Result};
use ndarray::Array2;

/// Row-wise softmax, numerically stabilized by max subtraction.
pub fn softmax(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max_val = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum_exp = 0.0f32;
        for v in row.iter_mut() {
            *v = (*v - max_val).exp();
            sum_exp += *v;
        }
        if sum_exp > 0.0 {
            row.mapv_inplace(|v| v / sum_exp);
        }
    }
    out
}

/// Mean negative log-likelihood of the target classes.
pub fn cross_entropy(logits: &Array2<f32>, targets: &[usize]) -> Result<f32> {
    let (rows, cols) = logits.dim();
    if rows == 0 {
        return Err(Error::ShapeMismatch("empty batch".into()));
    }
    if targets.len() != rows {
        return Err(Error::ShapeMismatch(format!(
            "{} logit rows vs {} targets",
            rows,
            targets.len()
        )));
    }
    let mut total = 0.0f64;
    for (row, &target) in logits.rows().into_iter().zip(targets) {
        if target >= cols {
            return Err(Error::ShapeMismatch(format!(
                "target {target} out of range for {cols} classes"
            )));
        }
        let max_val = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum_exp = 0.0f64;
        for &v in row.iter() {
            sum_exp += f64::from(v - max_val).exp();
        }
        let log_sum = f64::from(max_val) + sum_exp.ln();
        total += log_sum - f64::from(row[target]);
    }
    Ok((total / rows as f64) as f32)
}

/// Fraction of rows whose highest score matches the target class.
pub fn accuracy(logits: &Array2<f32>, targets: &[usize]) -> Result<f32> {
    let rows = logits.nrows();
    if rows == 0 {
        return Err(Error::ShapeMismatch("empty batch".into()));
    }
    if targets.len() != rows {
        return Err(Error::ShapeMismatch(format!(
            "{} logit rows vs {} targets",
            rows,
            targets.len()
        )));
    }
    let mut correct = 0usize;
    for (row, &target) in logits.rows().into_iter().zip(targets) {
        let mut best = 0usize;
        let mut best_val = f32::NEG_INFINITY;
        for (idx, &v) in row.iter().enumerate() {
            if v > best_val {
                best_val = v;
                best = idx;
            }
        }
        if best == target {
            correct += 1;
        }
    }
    Ok(correct as f32 / rows as f32)
}
