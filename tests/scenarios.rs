use std::{
    cell::RefCell,
    num::NonZeroUsize,
    path::Path,
    sync::{Arc, Mutex},
};

use adversarial_ensemble::{
    AdversarialTraining, Ensemble, EnsembleConfig, EnsembleErr, EnsembleState, FitState,
    InMemoryLoader, JsonPersister, OptimizerKind, Persister, Result, Targets, Task, TrainConfig,
    report::{BatchRecord, EpochRecord, Reporter},
};
use machine_learning::{
    MlErr,
    arch::{Model, Sequential, activations::ActFn, layers::Layer},
};
use ndarray::{Array, Array1, Array2, ArrayView2, array};
use rand::{SeedableRng, rngs::StdRng};

#[derive(Clone, Default)]
struct Saves(Arc<Mutex<Vec<EnsembleState>>>);

impl Persister for Saves {
    fn save(&self, state: &EnsembleState, _dir: &Path) -> Result<()> {
        self.0.lock().unwrap().push(state.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Epochs(Arc<Mutex<Vec<EpochRecord>>>);

impl Reporter for Epochs {
    fn batch(&self, _record: &BatchRecord) {}

    fn epoch(&self, record: &EpochRecord) {
        self.0.lock().unwrap().push(record.clone());
    }
}

/// A model whose only parameter counts the optimizer steps it took. Every backward pass adds
/// `-0.5` to its gradient, so one step of plain gradient descent with a unit learning rate per
/// clean and adversarial pair moves the parameter by exactly one.
///
/// It classifies the sample `id / 100` as class 0 iff `id` is below 12 after at most two steps
/// and below 11 afterwards.
#[derive(Clone)]
struct Scripted {
    params: Vec<f32>,
    grad: Vec<f32>,
}

impl Scripted {
    fn new() -> Self {
        Self {
            params: vec![0.],
            grad: vec![0.],
        }
    }
}

impl Model for Scripted {
    fn size(&self) -> usize {
        1
    }

    fn forward(&mut self, x: ArrayView2<f32>) -> machine_learning::Result<Array2<f32>> {
        self.infer(x)
    }

    fn infer(&self, x: ArrayView2<f32>) -> machine_learning::Result<Array2<f32>> {
        let threshold = if self.params[0] <= 2.5 { 12 } else { 11 };

        let mut out = Array2::zeros((x.nrows(), 2));
        for (mut row, sample) in out.rows_mut().into_iter().zip(x.rows()) {
            let id = (sample[0] * 100.).round() as usize;
            let class = usize::from(id >= threshold);
            row[class] = 5.;
        }

        Ok(out)
    }

    fn backward(&mut self, d: Array2<f32>) -> machine_learning::Result<Array2<f32>> {
        self.grad[0] -= 0.5;
        Ok(Array2::zeros((d.nrows(), 1)))
    }

    fn zero_grad(&mut self) {
        self.grad.fill(0.);
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn params_and_grad(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.params, &self.grad)
    }

    fn load_params(&mut self, params: &[f32]) -> machine_learning::Result<()> {
        if params.len() != 1 {
            return Err(MlErr::SizeMismatch {
                what: "model parameters",
                got: params.len(),
                expected: 1,
            });
        }

        self.params.copy_from_slice(params);
        Ok(())
    }
}

fn seeded_factory(
    seed: u64,
    dims: &[(usize, usize)],
) -> impl Fn() -> machine_learning::Result<Sequential> {
    let rng = RefCell::new(StdRng::seed_from_u64(seed));

    move || {
        let layers = dims.iter().enumerate().map(|(i, &dim)| {
            let act_fn = (i + 1 < dims.len()).then(ActFn::relu);
            Layer::dense(dim, act_fn)
        });
        Sequential::random(layers, &mut *rng.borrow_mut())
    }
}

fn two_class_batches(x: Array2<f32>) -> InMemoryLoader {
    let y = Array1::from_shape_fn(x.nrows(), |i| i % 2);
    InMemoryLoader::new(x, Targets::Classes(y), NonZeroUsize::new(4).unwrap()).unwrap()
}

fn quiet(epochs: usize) -> TrainConfig {
    TrainConfig {
        lr: 0.01,
        epochs,
        optimizer: OptimizerKind::Adam,
        epsilon: 0.1,
        log_interval: 1,
        save_model: false,
        ..Default::default()
    }
}

fn three_estimators() -> EnsembleConfig {
    EnsembleConfig::new(NonZeroUsize::new(3).unwrap()).with_jobs(2)
}

#[test]
fn a_single_epoch_commits_every_estimator() {
    let dims = [(2, 4), (4, 2)];
    let x = Array::from_shape_fn((8, 2), |(i, j)| ((i + j) % 4) as f32 / 3.);
    let train = two_class_batches(x);

    let mut ensemble =
        AdversarialTraining::classifier(seeded_factory(1, &dims), three_estimators());
    ensemble.fit(&train, None, &quiet(1)).unwrap();

    assert_eq!(ensemble.state(), FitState::Committed);
    assert_eq!(ensemble.len(), 3);
    assert_eq!(ensemble.n_outputs(), 2);

    let out = ensemble.forward(array![[0.2, 0.8]].view()).unwrap();
    assert!((out.sum() - 1.).abs() < 1e-6);
}

#[test]
fn unnormalized_inputs_abort_the_fit() {
    let dims = [(2, 4), (4, 2)];
    let mut x = Array::from_shape_fn((8, 2), |(i, j)| ((i + j) % 4) as f32 / 3.);
    x[[5, 1]] = 1.5;
    let train = two_class_batches(x);

    let mut ensemble =
        AdversarialTraining::classifier(seeded_factory(1, &dims), three_estimators());
    let result = ensemble.fit(&train, None, &quiet(1));

    let Err(EnsembleErr::OutOfRangeInput { min, max }) = &result else {
        panic!("expected an out of range input, got {result:?}");
    };
    assert_eq!((*min, *max), (0.0, 1.5));
    assert_eq!(ensemble.state(), FitState::Training { epoch: 0 });
    assert!(matches!(
        ensemble.forward(array![[0.2, 0.8]].view()),
        Err(EnsembleErr::NotFitted)
    ));
}

#[test]
fn the_best_epoch_is_committed_and_saved_once() {
    let train = two_class_batches(Array::from_shape_fn((8, 1), |(i, _)| i as f32 / 10.));
    let valid = InMemoryLoader::new(
        Array::from_shape_fn((20, 1), |(i, _)| i as f32 / 100.),
        Targets::Classes(Array1::zeros(20)),
        NonZeroUsize::new(5).unwrap(),
    )
    .unwrap();

    let saves = Saves::default();
    let epochs = Epochs::default();
    let config = TrainConfig {
        lr: 1.,
        weight_decay: 0.,
        epochs: 2,
        optimizer: OptimizerKind::Sgd,
        epsilon: 0.5,
        log_interval: 1,
        save_model: true,
        save_dir: None,
    };

    let mut ensemble = AdversarialTraining::classifier(|| Ok(Scripted::new()), three_estimators())
        .with_persister(saves.clone())
        .with_reporter(epochs.clone());
    ensemble.fit(&train, Some(&valid), &config).unwrap();

    let records = epochs.0.lock().unwrap();
    let metrics: Vec<_> = records.iter().map(|r| (r.metric, r.best)).collect();
    assert_eq!(metrics, [(60., 60.), (55., 60.)]);

    let saved = saves.0.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].estimators, vec![vec![2.]; 3]);

    assert_eq!(ensemble.state(), FitState::Committed);
    assert!(ensemble.estimators().iter().all(|e| e.params() == [2.]));
    assert_eq!(ensemble.predict(&valid).unwrap(), 60.);
}

#[test]
fn regression_learns_a_linear_target() {
    let samples = 64;
    let x = Array::from_shape_fn((samples, 2), |(i, j)| match j {
        0 => (i % 8) as f32 / 7.,
        _ => (i / 8) as f32 / 7.,
    });
    let y = x.rows().into_iter().map(|row| 0.5 * row[0] + 0.5 * row[1]).collect();
    let train =
        InMemoryLoader::new(x.clone(), Targets::Scalars(y), NonZeroUsize::new(8).unwrap()).unwrap();

    let config = TrainConfig {
        lr: 0.05,
        epochs: 30,
        epsilon: 0.05,
        log_interval: 100,
        save_model: false,
        ..Default::default()
    };

    let mut ensemble =
        AdversarialTraining::regressor(seeded_factory(7, &[(2, 1)]), three_estimators());
    ensemble.fit(&train, Some(&train), &config).unwrap();

    assert_eq!(ensemble.task(), Task::Regression);
    assert_eq!(ensemble.n_outputs(), 1);
    assert_eq!(ensemble.forward(x.view()).unwrap().dim(), (samples, 1));

    let mse = ensemble.predict(&train).unwrap();
    assert!(mse < 0.01, "mse: {mse}");
}

#[test]
fn saved_ensembles_restore_from_json() {
    let dims = [(2, 3), (3, 2)];
    let dir = tempfile::tempdir().unwrap();
    let x = Array::from_shape_fn((8, 2), |(i, j)| ((i * 2 + j) % 5) as f32 / 4.);
    let train = two_class_batches(x);
    let config = TrainConfig {
        save_model: true,
        save_dir: Some(dir.path().join("ckpt")),
        ..quiet(2)
    };

    let mut trained =
        AdversarialTraining::classifier(seeded_factory(5, &dims), three_estimators());
    trained.fit(&train, None, &config).unwrap();

    let path = JsonPersister::path(&dir.path().join("ckpt"), Task::Classification, 3);
    let state = JsonPersister::load(&path).unwrap();
    assert_eq!(state, trained.state_snapshot().unwrap());

    let mut restored =
        AdversarialTraining::classifier(seeded_factory(9, &dims), three_estimators());
    restored.restore(state).unwrap();

    assert_eq!(restored.predict(&train).unwrap(), trained.predict(&train).unwrap());
}
