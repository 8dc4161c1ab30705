use std::{error::Error, fmt, io};

use machine_learning::MlErr;

use crate::task::Task;

/// The ensemble's result type.
pub type Result<T> = std::result::Result<T, EnsembleErr>;

/// Everything that can go wrong while configuring, training, evaluating or persisting an ensemble.
#[derive(Debug)]
pub enum EnsembleErr {
    InvalidHyperparameter {
        name: &'static str,
        value: f64,
        constraint: &'static str,
    },
    OutOfRangeInput {
        min: f32,
        max: f32,
    },
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    TargetKind {
        task: Task,
        got: &'static str,
    },
    LabelOutOfRange {
        label: usize,
        n_outputs: usize,
    },
    EmptyLoader {
        what: &'static str,
    },
    TaskMismatch {
        got: Task,
        expected: Task,
    },
    NotFitted,
    Model(MlErr),
    WorkerPool(rayon::ThreadPoolBuildError),
    Io(io::Error),
    Serialization(serde_json::Error),
}

impl fmt::Display for EnsembleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnsembleErr::InvalidHyperparameter {
                name,
                value,
                constraint,
            } => write!(f, "invalid {name} = {value}: expected {constraint}"),
            EnsembleErr::OutOfRangeInput { min, max } => write!(
                f,
                "input range [{min}, {max}] is not within [0, 1], inputs must be normalized"
            ),
            EnsembleErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(f, "{what} size mismatch: got {got}, expected {expected}"),
            EnsembleErr::TargetKind { task, got } => {
                write!(f, "{task} can't be trained on {got} targets")
            }
            EnsembleErr::LabelOutOfRange { label, n_outputs } => {
                write!(f, "label {label} is out of range for {n_outputs} outputs")
            }
            EnsembleErr::EmptyLoader { what } => write!(f, "the {what} loader yields no batches"),
            EnsembleErr::TaskMismatch { got, expected } => {
                write!(f, "task mismatch: got {got}, expected {expected}")
            }
            EnsembleErr::NotFitted => write!(f, "the ensemble has not been fitted yet"),
            EnsembleErr::Model(e) => write!(f, "model error: {e}"),
            EnsembleErr::WorkerPool(e) => write!(f, "failed to build the worker pool: {e}"),
            EnsembleErr::Io(e) => write!(f, "io error: {e}"),
            EnsembleErr::Serialization(e) => write!(f, "serialization error: {e}"),
        }
    }
}

impl Error for EnsembleErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EnsembleErr::Model(e) => Some(e),
            EnsembleErr::WorkerPool(e) => Some(e),
            EnsembleErr::Io(e) => Some(e),
            EnsembleErr::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for EnsembleErr {
    fn from(value: MlErr) -> Self {
        Self::Model(value)
    }
}

impl From<rayon::ThreadPoolBuildError> for EnsembleErr {
    fn from(value: rayon::ThreadPoolBuildError) -> Self {
        Self::WorkerPool(value)
    }
}

impl From<io::Error> for EnsembleErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for EnsembleErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}
