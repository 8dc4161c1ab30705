use log::info;

use crate::task::Task;

/// The progress of one estimator over one training batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    pub estimator: usize,
    pub epoch: usize,
    pub batch: usize,
    /// The clean loss plus the adversarial loss.
    pub loss: f32,
    pub batch_size: usize,
    /// The amount of correct clean predictions, only for classification.
    pub correct: Option<usize>,
}

/// The validation result of the ensemble after one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochRecord {
    pub epoch: usize,
    pub task: Task,
    /// Accuracy in percent for classification, mean squared error for regression.
    pub metric: f32,
    pub best: f32,
}

/// Receives the progress of a training run.
///
/// Batch records arrive concurrently from every training worker.
pub trait Reporter: Send + Sync {
    fn batch(&self, record: &BatchRecord);

    fn epoch(&self, record: &EpochRecord);
}

/// A `Reporter` that forwards every record to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn batch(&self, record: &BatchRecord) {
        let BatchRecord {
            estimator,
            epoch,
            batch,
            loss,
            batch_size,
            correct,
        } = *record;

        match correct {
            Some(correct) => info!(
                estimator = estimator, epoch = epoch, batch = batch;
                "loss: {loss:.5} | correct: {correct}/{batch_size}"
            ),
            None => info!(
                estimator = estimator, epoch = epoch, batch = batch;
                "loss: {loss:.5} | batch size: {batch_size}"
            ),
        }
    }

    fn epoch(&self, record: &EpochRecord) {
        let EpochRecord {
            epoch,
            task,
            metric,
            best,
        } = *record;

        match task {
            Task::Classification => info!(
                epoch = epoch;
                "validation accuracy: {metric:.3} % | historical best: {best:.3} %"
            ),
            Task::Regression => info!(
                epoch = epoch;
                "validation mse: {metric:.5} | historical best: {best:.5}"
            ),
        }
    }
}
