use machine_learning::arch::Model;
use rayon::{ThreadPool, prelude::*};

use super::{EpochContext, fit_estimator_epoch};
use crate::{Result, data::DataLoader};

/// Trains every estimator for one epoch on the given pool.
///
/// # Returns
/// The trained estimators in the same order they were given, or the first error any of them
/// failed with.
pub fn fit_parallel<M, L>(
    pool: &ThreadPool,
    estimators: Vec<M>,
    ctx: &EpochContext<L>,
) -> Result<Vec<M>>
where
    M: Model + Send,
    L: DataLoader,
{
    par_map_estimators(pool, estimators, |idx, estimator| {
        fit_estimator_epoch(idx, estimator, ctx)
    })
}

/// Runs `train` once per estimator on the given pool, passing along each estimator's index.
///
/// The output keeps the input order. A single failure fails the whole call and no partial
/// result is returned.
pub fn par_map_estimators<M, F>(
    pool: &ThreadPool,
    estimators: Vec<M>,
    train: F,
) -> Result<Vec<M>>
where
    M: Send,
    F: Fn(usize, M) -> Result<M> + Sync,
{
    pool.install(|| {
        estimators
            .into_par_iter()
            .enumerate()
            .map(|(idx, estimator)| train(idx, estimator))
            .collect()
    })
}
