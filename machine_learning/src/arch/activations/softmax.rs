use ndarray::{Array2, ArrayView2, Axis};

/// Row-wise softmax, shifted by each row's maximum so large logits don't overflow.
///
/// # Arguments
/// * `x` - The logits, one sample per row.
///
/// # Returns
/// A matrix of the same shape whose rows are probability distributions.
pub fn softmax(x: ArrayView2<f32>) -> Array2<f32> {
    let mut out = x.to_owned();

    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }

    out
}
