mod epoch;
mod parallel;

pub use epoch::{EpochContext, fit_estimator_epoch};
pub use parallel::{fit_parallel, par_map_estimators};
