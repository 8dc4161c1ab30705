use ndarray::{Array2, ArrayView2, Zip};

use crate::{EnsembleErr, Result};

/// Generates fast gradient sign adversarial samples: every input moves `epsilon` in the
/// direction that increases the loss and is then clamped back into `[0, 1]`.
///
/// # Arguments
/// * `x` - The input batch, with every value in `[0, 1]`.
/// * `epsilon` - The step size of the perturbation.
/// * `grad` - The gradient of the loss with respect to `x`.
///
/// # Returns
/// The perturbed batch, or an error if `x` isn't normalized or `grad` has another shape.
pub fn fgsm_samples(
    x: ArrayView2<f32>,
    epsilon: f32,
    grad: ArrayView2<f32>,
) -> Result<Array2<f32>> {
    // NaN sticks to both extrema so that it fails the range check.
    let (min, max) = x.fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &v| {
        (
            if v.is_nan() || v < min { v } else { min },
            if v.is_nan() || v > max { v } else { max },
        )
    });

    if !(min >= 0. && max <= 1.) {
        return Err(EnsembleErr::OutOfRangeInput { min, max });
    }

    if grad.dim() != x.dim() {
        return Err(EnsembleErr::SizeMismatch {
            what: "input gradient",
            got: grad.len(),
            expected: x.len(),
        });
    }

    Ok(Zip::from(&x)
        .and(&grad)
        .map_collect(|&v, &g| (v + epsilon * sign(g)).clamp(0., 1.)))
}

/// Like `f32::signum` but zero for zero.
fn sign(v: f32) -> f32 {
    if v > 0. {
        1.
    } else if v < 0. {
        -1.
    } else {
        0.
    }
}
