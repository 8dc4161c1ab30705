use std::{cell::RefCell, env, fs, num::NonZeroUsize};

use adversarial_ensemble::{
    AdversarialTraining, Ensemble, EnsembleConfig, InMemoryLoader, Targets, TrainConfig,
};
use anyhow::Context;
use log::info;
use machine_learning::arch::{Sequential, activations::ActFn, layers::Layer};
use ndarray::{Array1, Array2, s};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Deserialize;

/// The demo's settings, read from the JSON file given as the first argument if any.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RunConfig {
    ensemble: EnsembleConfig,
    training: TrainConfig,
    hidden: Vec<usize>,
    samples: usize,
    batch_size: NonZeroUsize,
    seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ensemble: EnsembleConfig::new(NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN)),
            training: TrainConfig {
                lr: 1e-2,
                epochs: 10,
                epsilon: 0.05,
                log_interval: 10,
                ..Default::default()
            },
            hidden: vec![16],
            samples: 1000,
            batch_size: NonZeroUsize::new(32).unwrap_or(NonZeroUsize::MIN),
            seed: 42,
        }
    }
}

/// Samples points of the unit square, labelled by the side of the anti-diagonal they fall on.
fn dataset(rng: &mut StdRng, samples: usize) -> (Array2<f32>, Array1<usize>) {
    let x = Array2::from_shape_simple_fn((samples, 2), || rng.random::<f32>());
    let y = x
        .rows()
        .into_iter()
        .map(|row| usize::from(row[0] + row[1] > 1.))
        .collect();

    (x, y)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let run: RunConfig = match env::args().nth(1) {
        Some(path) => {
            let content =
                fs::read_to_string(&path).with_context(|| format!("cannot read '{path}'"))?;
            serde_json::from_str(&content)
                .with_context(|| format!("invalid run file '{path}'"))?
        }
        None => RunConfig::default(),
    };
    info!("running with {run:?}");

    let mut rng = StdRng::seed_from_u64(run.seed);
    let (x, y) = dataset(&mut rng, run.samples);
    let split = run.samples * 4 / 5;

    let train = InMemoryLoader::new(
        x.slice(s![..split, ..]).to_owned(),
        Targets::Classes(y.slice(s![..split]).to_owned()),
        run.batch_size,
    )?
    .with_classes(2);
    let valid = InMemoryLoader::new(
        x.slice(s![split.., ..]).to_owned(),
        Targets::Classes(y.slice(s![split..]).to_owned()),
        run.batch_size,
    )?;

    let mut dims = vec![2];
    dims.extend(&run.hidden);
    dims.push(2);

    let rng = RefCell::new(rng);
    let factory = || {
        let layers = dims.windows(2).enumerate().map(|(i, pair)| {
            let act_fn = (i + 2 < dims.len()).then(ActFn::relu);
            Layer::dense((pair[0], pair[1]), act_fn)
        });
        Sequential::random(layers, &mut *rng.borrow_mut())
    };

    let mut ensemble = AdversarialTraining::classifier(factory, run.ensemble);
    ensemble.fit(&train, Some(&valid), &run.training)?;

    let accuracy = ensemble.predict(&valid)?;
    println!(
        "validation accuracy of {} estimators: {accuracy:.2} %",
        ensemble.len()
    );

    Ok(())
}
