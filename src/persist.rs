use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{Result, config::Device, task::Task};

/// The persisted form of a committed ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleState {
    pub task: Task,
    pub device: Device,
    pub n_estimators: usize,
    pub n_outputs: usize,
    /// The flat parameters of every estimator, in order.
    pub estimators: Vec<Vec<f32>>,
}

/// Saves ensemble states somewhere under a directory.
pub trait Persister: Send + Sync {
    fn save(&self, state: &EnsembleState, dir: &Path) -> Result<()>;
}

/// Persists ensembles as JSON files named after their task and size.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPersister;

impl JsonPersister {
    /// Returns where an ensemble with the given task and size is saved within `dir`.
    pub fn path(dir: &Path, task: Task, n_estimators: usize) -> PathBuf {
        dir.join(format!("adversarial_training_{task}_{n_estimators}_ckpt.json"))
    }

    /// Reads back a state written by `save`.
    ///
    /// # Arguments
    /// * `path` - The path of the file.
    ///
    /// # Returns
    /// The ensemble state, or an error if the file can't be read or parsed.
    pub fn load(path: &Path) -> Result<EnsembleState> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl Persister for JsonPersister {
    fn save(&self, state: &EnsembleState, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let path = Self::path(dir, state.task, state.n_estimators);
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, state)?;
        writer.flush()?;

        debug!("saved ensemble state to {}", path.display());
        Ok(())
    }
}
