pub mod adversarial;
pub mod aggregate;
pub mod config;
pub mod data;
pub mod ensemble;
mod error;
pub mod persist;
pub mod report;
pub mod selection;
pub mod task;
pub mod training;

pub use config::{Device, EnsembleConfig, OptimizerKind, TrainConfig};
pub use data::{Batch, DataLoader, InMemoryLoader, Targets, TargetsView};
pub use ensemble::{AdversarialTraining, Ensemble, FitState};
pub use error::{EnsembleErr, Result};
pub use persist::{EnsembleState, JsonPersister, Persister};
pub use report::{LogReporter, Reporter};
pub use task::Task;
