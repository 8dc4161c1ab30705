use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use machine_learning::{MlErr, arch::Model};
use ndarray::{Array2, ArrayView2};
use rayon::ThreadPoolBuilder;

use crate::{
    EnsembleErr, Result,
    aggregate::aggregate,
    config::{Device, EnsembleConfig, TrainConfig},
    data::DataLoader,
    persist::{EnsembleState, JsonPersister, Persister},
    report::{EpochRecord, LogReporter, Reporter},
    selection::{BestSnapshot, evaluate},
    task::Task,
    training::{EpochContext, fit_parallel},
};

/// The lifecycle of an ensemble. Only a `Committed` ensemble can make predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitState {
    Uninitialized,
    Validated,
    Training { epoch: usize },
    Committed,
}

/// The operations every ensemble provides.
pub trait Ensemble {
    /// Computes the ensemble's output for one batch.
    ///
    /// # Arguments
    /// * `x` - The input batch.
    ///
    /// # Returns
    /// The averaged class probabilities or outputs, or `NotFitted` if the ensemble was never
    /// committed.
    fn forward(&self, x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Trains a fresh set of estimators, discarding the previous ones.
    ///
    /// # Arguments
    /// * `train` - The training data.
    /// * `valid` - The validation data used to select the best epoch, if any.
    /// * `config` - The hyperparameters of this run.
    fn fit<L: DataLoader>(
        &mut self,
        train: &L,
        valid: Option<&L>,
        config: &TrainConfig,
    ) -> Result<()>;

    /// Evaluates the ensemble over a full pass of `loader`.
    ///
    /// # Returns
    /// The accuracy in percent for classification or the mean per batch squared error for
    /// regression.
    fn predict<L: DataLoader>(&self, loader: &L) -> Result<f32>;
}

/// An ensemble whose estimators are trained in parallel on clean and fast gradient sign
/// adversarial samples.
///
/// Every estimator is built by the same factory, so they all share one architecture but start
/// from independent parameters.
pub struct AdversarialTraining<M, F> {
    factory: F,
    task: Task,
    config: EnsembleConfig,
    n_outputs: usize,
    estimators: Vec<M>,
    state: FitState,
    persister: Box<dyn Persister>,
    reporter: Box<dyn Reporter>,
}

impl<M, F> AdversarialTraining<M, F>
where
    M: Model + Clone + Send,
    F: Fn() -> machine_learning::Result<M>,
{
    /// Creates a new untrained ensemble that saves its states as JSON and reports through `log`.
    ///
    /// # Arguments
    /// * `task` - What the ensemble learns.
    /// * `factory` - Builds one freshly initialized estimator per call.
    /// * `config` - The amount of estimators and where they run.
    pub fn new(task: Task, factory: F, config: EnsembleConfig) -> Self {
        Self {
            factory,
            task,
            config,
            n_outputs: 0,
            estimators: Vec::new(),
            state: FitState::Uninitialized,
            persister: Box::new(JsonPersister),
            reporter: Box::new(LogReporter),
        }
    }

    pub fn classifier(factory: F, config: EnsembleConfig) -> Self {
        Self::new(Task::Classification, factory, config)
    }

    pub fn regressor(factory: F, config: EnsembleConfig) -> Self {
        Self::new(Task::Regression, factory, config)
    }

    pub fn with_persister<P: Persister + 'static>(mut self, persister: P) -> Self {
        self.persister = Box::new(persister);
        self
    }

    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Returns the amount of committed estimators.
    pub fn len(&self) -> usize {
        self.estimators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimators.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&M> {
        self.estimators.get(idx)
    }

    pub fn estimators(&self) -> &[M] {
        &self.estimators
    }

    /// Returns the width of the ensemble's output, decided by the last `fit`.
    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn state(&self) -> FitState {
        self.state
    }

    pub fn device(&self) -> Device {
        self.config.device
    }

    /// Returns the persisted form of the committed ensemble.
    pub fn state_snapshot(&self) -> Result<EnsembleState> {
        self.ensure_committed()?;
        Ok(self.snapshot_of(&self.estimators))
    }

    /// Rebuilds a committed ensemble from a persisted state, building every estimator with the
    /// factory and loading its parameters.
    ///
    /// # Arguments
    /// * `state` - A state with this ensemble's task and amount of estimators.
    ///
    /// # Returns
    /// An error if the state doesn't fit this ensemble, in which case nothing changes.
    pub fn restore(&mut self, state: EnsembleState) -> Result<()> {
        if state.task != self.task {
            return Err(EnsembleErr::TaskMismatch {
                got: state.task,
                expected: self.task,
            });
        }

        let n_estimators = self.config.n_estimators.get();
        if state.n_estimators != n_estimators || state.estimators.len() != n_estimators {
            return Err(EnsembleErr::SizeMismatch {
                what: "estimators",
                got: state.estimators.len(),
                expected: n_estimators,
            });
        }

        let estimators = state
            .estimators
            .iter()
            .map(|params| {
                let mut estimator = (self.factory)()?;
                estimator.load_params(params)?;
                Ok(estimator)
            })
            .collect::<std::result::Result<Vec<_>, MlErr>>()?;

        self.estimators = estimators;
        self.n_outputs = state.n_outputs;
        self.config.device = state.device;
        self.state = FitState::Committed;
        Ok(())
    }

    fn ensure_committed(&self) -> Result<()> {
        match self.state {
            FitState::Committed => Ok(()),
            _ => Err(EnsembleErr::NotFitted),
        }
    }

    fn snapshot_of(&self, estimators: &[M]) -> EnsembleState {
        EnsembleState {
            task: self.task,
            device: self.config.device,
            n_estimators: estimators.len(),
            n_outputs: self.n_outputs,
            estimators: estimators.iter().map(|e| e.params().to_vec()).collect(),
        }
    }

    fn save(&self, dir: &Path) -> Result<()> {
        self.persister.save(&self.snapshot_of(&self.estimators), dir)
    }
}

impl<M, F> Ensemble for AdversarialTraining<M, F>
where
    M: Model + Clone + Send,
    F: Fn() -> machine_learning::Result<M>,
{
    fn forward(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.ensure_committed()?;
        aggregate(self.task, &self.estimators, x, self.n_outputs)
    }

    fn fit<L: DataLoader>(
        &mut self,
        train: &L,
        valid: Option<&L>,
        config: &TrainConfig,
    ) -> Result<()> {
        self.state = FitState::Uninitialized;
        self.estimators.clear();

        config.validate()?;

        let n_estimators = self.config.n_estimators.get();
        let mut estimators = (0..n_estimators)
            .map(|_| (self.factory)())
            .collect::<std::result::Result<Vec<_>, MlErr>>()?;
        self.n_outputs = self.task.n_outputs(train)?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.n_jobs.unwrap_or(0))
            .build()?;
        let save_dir = config.save_dir.clone().unwrap_or_else(|| PathBuf::from("."));

        debug!(
            n_estimators = n_estimators, n_outputs = self.n_outputs,
            threads = pool.current_num_threads();
            "starting {} adversarial training", self.task
        );
        self.state = FitState::Validated;

        let mut best = BestSnapshot::new(self.task);

        for epoch in 0..config.epochs {
            let ctx = EpochContext {
                task: self.task,
                epoch,
                n_outputs: self.n_outputs,
                config,
                train,
                reporter: self.reporter.as_ref(),
            };

            self.state = FitState::Training { epoch };
            estimators = fit_parallel(&pool, estimators, &ctx)?;

            let Some(valid) = valid else {
                continue;
            };

            let metric = evaluate(self.task, &estimators, valid, self.n_outputs)?;
            if best.observe(epoch, metric) {
                self.estimators = estimators.clone();
                if config.save_model {
                    self.save(&save_dir)?;
                }
            }

            self.reporter.epoch(&EpochRecord {
                epoch,
                task: self.task,
                metric,
                best: best.best(),
            });
        }

        match (valid, best.epoch()) {
            (Some(_), Some(epoch)) => {
                info!(epoch = epoch; "committing the estimators of the best epoch");
            }
            (Some(_), None) => {
                warn!("validation never improved, committing the estimators of the last epoch");
                self.estimators = estimators;
            }
            (None, _) => {
                self.estimators = estimators;
                if config.save_model {
                    self.save(&save_dir)?;
                }
            }
        }

        self.state = FitState::Committed;
        Ok(())
    }

    fn predict<L: DataLoader>(&self, loader: &L) -> Result<f32> {
        self.ensure_committed()?;
        evaluate(self.task, &self.estimators, loader, self.n_outputs)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        num::NonZeroUsize,
        sync::{Arc, Mutex},
    };

    use machine_learning::arch::{Sequential, activations::ActFn, layers::Layer};
    use ndarray::{Array, Array1, array};

    use super::*;
    use crate::{
        config::OptimizerKind,
        data::{InMemoryLoader, Targets},
    };

    #[derive(Clone, Default)]
    struct Saves(Arc<Mutex<Vec<EnsembleState>>>);

    impl Persister for Saves {
        fn save(&self, state: &EnsembleState, _: &Path) -> Result<()> {
            self.0.lock().unwrap().push(state.clone());
            Ok(())
        }
    }

    fn factory() -> impl Fn() -> machine_learning::Result<Sequential> {
        || {
            Sequential::random(
                [
                    Layer::dense((2, 3), Some(ActFn::relu())),
                    Layer::dense((3, 2), None),
                ],
                &mut rand::rng(),
            )
        }
    }

    fn loader(n: usize) -> InMemoryLoader {
        let x = Array::from_shape_fn((n, 2), |(i, j)| ((i * 3 + j) % 7) as f32 / 6.);
        let y = Array1::from_shape_fn(n, |i| i % 2);
        InMemoryLoader::new(x, Targets::Classes(y), NonZeroUsize::new(4).unwrap()).unwrap()
    }

    fn config(epochs: usize) -> TrainConfig {
        TrainConfig {
            lr: 0.05,
            epochs,
            optimizer: OptimizerKind::Sgd,
            log_interval: 1,
            ..Default::default()
        }
    }

    fn ensemble(
        n: usize,
    ) -> AdversarialTraining<Sequential, impl Fn() -> machine_learning::Result<Sequential>> {
        let config = EnsembleConfig::new(NonZeroUsize::new(n).unwrap()).with_jobs(2);
        AdversarialTraining::classifier(factory(), config).with_persister(Saves::default())
    }

    #[test]
    fn unfitted_ensembles_cannot_predict() {
        let ensemble = ensemble(2);
        let x = array![[0.1, 0.2]];

        assert_eq!(ensemble.state(), FitState::Uninitialized);
        assert!(matches!(ensemble.forward(x.view()), Err(EnsembleErr::NotFitted)));
        assert!(matches!(ensemble.predict(&loader(4)), Err(EnsembleErr::NotFitted)));
        assert!(matches!(ensemble.state_snapshot(), Err(EnsembleErr::NotFitted)));
    }

    #[test]
    fn invalid_hyperparameters_fail_before_training() {
        let mut ensemble = ensemble(2);
        let config = TrainConfig {
            epsilon: 0.,
            ..config(1)
        };

        let result = ensemble.fit(&loader(8), None, &config);

        assert!(matches!(
            result,
            Err(EnsembleErr::InvalidHyperparameter { name: "epsilon", .. })
        ));
        assert_eq!(ensemble.state(), FitState::Uninitialized);
        assert!(ensemble.is_empty());
    }

    #[test]
    fn fitting_without_validation_commits_and_saves_once() {
        let saves = Saves::default();
        let ensemble_config = EnsembleConfig::new(NonZeroUsize::new(3).unwrap());
        let mut ensemble = AdversarialTraining::classifier(factory(), ensemble_config)
            .with_persister(saves.clone());

        ensemble.fit(&loader(8), None, &config(2)).unwrap();

        assert_eq!(ensemble.state(), FitState::Committed);
        assert_eq!(ensemble.len(), 3);
        assert_eq!(ensemble.n_outputs(), 2);

        let saved = saves.0.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0], ensemble.state_snapshot().unwrap());
    }

    #[test]
    fn snapshots_restore_into_identical_ensembles() {
        let mut trained = ensemble(2);
        trained.fit(&loader(8), None, &config(1)).unwrap();
        let snapshot = trained.state_snapshot().unwrap();

        let mut restored = ensemble(2);
        restored.restore(snapshot.clone()).unwrap();

        let x = array![[0.1, 0.9], [0.4, 0.4]];
        assert_eq!(restored.state(), FitState::Committed);
        assert_eq!(
            restored.forward(x.view()).unwrap(),
            trained.forward(x.view()).unwrap()
        );

        let mut wrong_size = ensemble(3);
        assert!(wrong_size.restore(snapshot.clone()).is_err());
        assert_eq!(wrong_size.state(), FitState::Uninitialized);

        let mut wrong_task = AdversarialTraining::regressor(
            factory(),
            EnsembleConfig::new(NonZeroUsize::new(2).unwrap()),
        );
        assert!(matches!(
            wrong_task.restore(snapshot),
            Err(EnsembleErr::TaskMismatch { .. })
        ));
    }

    struct ReadOnly;

    impl Persister for ReadOnly {
        fn save(&self, _: &EnsembleState, _: &Path) -> Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read only").into())
        }
    }

    #[test]
    fn failed_saves_keep_the_selected_estimators() {
        let x = Array::from_shape_fn((8, 2), |(i, j)| ((i + j) % 4) as f32 / 3.);
        let y = Targets::Scalars(Array1::from_shape_fn(8, |i| i as f32 / 8.));
        let data = InMemoryLoader::new(x, y, NonZeroUsize::new(4).unwrap()).unwrap();
        let layers = || Sequential::random([Layer::dense((2, 1), None)], &mut rand::rng());

        let mut ensemble = AdversarialTraining::regressor(
            layers,
            EnsembleConfig::new(NonZeroUsize::new(2).unwrap()),
        )
        .with_persister(ReadOnly);
        let result = ensemble.fit(&data, Some(&data), &config(3));

        assert!(matches!(result, Err(EnsembleErr::Io(_))));
        assert_eq!(ensemble.len(), 2);
        assert_eq!(ensemble.state(), FitState::Training { epoch: 0 });
        assert!(matches!(
            ensemble.forward(array![[0.5, 0.5]].view()),
            Err(EnsembleErr::NotFitted)
        ));
    }

    #[test]
    fn refitting_discards_the_previous_estimators() {
        let mut ensemble = ensemble(2);
        ensemble.fit(&loader(8), None, &config(1)).unwrap();

        let bad = TrainConfig {
            lr: -1.,
            ..config(1)
        };
        assert!(ensemble.fit(&loader(8), None, &bad).is_err());

        assert!(ensemble.is_empty());
        assert_eq!(ensemble.state(), FitState::Uninitialized);
    }
}
