use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::{MlErr, Result};

/// Fills `out` with samples of a uniform distribution in `[-range, range)`.
///
/// # Arguments
/// * `rng` - A random number generator.
/// * `range` - The limit of the distribution.
/// * `out` - The buffer to fill.
///
/// # Returns
/// An error if the range is invalid (not finite or not positive).
pub fn uniform<R: Rng + ?Sized>(rng: &mut R, range: f32, out: &mut [f32]) -> Result<()> {
    let distribution =
        Uniform::new(-range, range).map_err(|e| MlErr::InvalidInit(e.to_string()))?;

    for w in out.iter_mut() {
        *w = distribution.sample(rng);
    }

    Ok(())
}

/// Fills `out` using Xavier uniform initialization.
///
/// # Arguments
/// * `rng` - A random number generator.
/// * `fan_in` - The number of input units in the weight tensor.
/// * `fan_out` - The number of output units in the weight tensor.
/// * `out` - The buffer to fill.
///
/// # Returns
/// An error if the calculated range is invalid.
pub fn xavier_uniform<R: Rng + ?Sized>(
    rng: &mut R,
    fan_in: usize,
    fan_out: usize,
    out: &mut [f32],
) -> Result<()> {
    let range = (6. / (fan_in + fan_out) as f32).sqrt();
    uniform(rng, range, out)
}
