use std::{num::NonZeroUsize, ops::Range};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};

use crate::{EnsembleErr, Result};

/// The targets of a dataset, one entry (or row) per sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// Class labels, for classification.
    Classes(Array1<usize>),
    /// One scalar per sample, for regression.
    Scalars(Array1<f32>),
    /// One vector per sample, for multi-output regression.
    Vectors(Array2<f32>),
}

impl Targets {
    pub(crate) fn len(&self) -> usize {
        match self {
            Targets::Classes(y) => y.len(),
            Targets::Scalars(y) => y.len(),
            Targets::Vectors(y) => y.nrows(),
        }
    }

    /// Borrows the targets of the samples in `range`.
    pub fn slice(&self, range: Range<usize>) -> TargetsView<'_> {
        match self {
            Targets::Classes(y) => TargetsView::Classes(y.slice(s![range])),
            Targets::Scalars(y) => TargetsView::Scalars(y.slice(s![range])),
            Targets::Vectors(y) => TargetsView::Vectors(y.slice(s![range, ..])),
        }
    }
}

/// A borrowed slice of `Targets`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetsView<'a> {
    Classes(ArrayView1<'a, usize>),
    Scalars(ArrayView1<'a, f32>),
    Vectors(ArrayView2<'a, f32>),
}

impl TargetsView<'_> {
    pub fn len(&self) -> usize {
        match self {
            TargetsView::Classes(y) => y.len(),
            TargetsView::Scalars(y) => y.len(),
            TargetsView::Vectors(y) => y.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A short name of the kind of targets, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            TargetsView::Classes(_) => "class label",
            TargetsView::Scalars(_) => "scalar",
            TargetsView::Vectors(_) => "vector",
        }
    }
}

/// A borrowed batch of samples, the batch size being the leading dimension of both fields.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub x: ArrayView2<'a, f32>,
    pub y: TargetsView<'a>,
}

impl Batch<'_> {
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A source of batches that can be iterated any number of times, always in the same order.
///
/// Loaders are shared by reference between the training workers, hence the `Sync` bound.
pub trait DataLoader: Sync {
    /// Returns an iterator over one full pass of the data.
    fn batches(&self) -> impl Iterator<Item = Batch<'_>>;

    /// Returns the amount of classes of the data, if the loader knows it.
    fn classes(&self) -> Option<usize> {
        None
    }
}

/// A `DataLoader` over owned arrays, producing borrowed batches without copying.
#[derive(Debug, Clone)]
pub struct InMemoryLoader {
    x: Array2<f32>,
    y: Targets,
    batch_size: NonZeroUsize,
    classes: Option<usize>,
}

impl InMemoryLoader {
    /// Creates a new `InMemoryLoader`.
    ///
    /// # Arguments
    /// * `x` - The samples, one per row.
    /// * `y` - The targets, one per sample.
    /// * `batch_size` - The maximum amount of samples per batch, the last one may be smaller.
    ///
    /// # Returns
    /// A new loader or an error if the amount of samples and targets differ.
    pub fn new(x: Array2<f32>, y: Targets, batch_size: NonZeroUsize) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(EnsembleErr::SizeMismatch {
                what: "targets",
                got: y.len(),
                expected: x.nrows(),
            });
        }

        Ok(Self {
            x,
            y,
            batch_size,
            classes: None,
        })
    }

    /// Declares the amount of classes explicitly, instead of letting it be counted from the
    /// labels.
    pub fn with_classes(mut self, classes: usize) -> Self {
        self.classes = Some(classes);
        self
    }
}

impl DataLoader for InMemoryLoader {
    fn batches(&self) -> impl Iterator<Item = Batch<'_>> {
        let n = self.x.nrows();
        let batch_size = self.batch_size.get();

        (0..n).step_by(batch_size).map(move |start| {
            let end = (start + batch_size).min(n);

            Batch {
                x: self.x.slice(s![start..end, ..]),
                y: self.y.slice(start..end),
            }
        })
    }

    fn classes(&self) -> Option<usize> {
        self.classes
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array, array};

    use super::*;

    #[test]
    fn batches_cover_the_data_in_order() {
        let x = Array::from_shape_fn((5, 2), |(i, j)| (i * 2 + j) as f32);
        let y = Targets::Classes(array![0, 1, 2, 3, 4]);
        let loader = InMemoryLoader::new(x, y, NonZeroUsize::new(2).unwrap()).unwrap();

        let batches: Vec<_> = loader.batches().collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].x, array![[0., 1.], [2., 3.]]);
        assert_eq!(batches[2].len(), 1);
        assert_eq!(batches[2].y, TargetsView::Classes(array![4].view()));
    }

    #[test]
    fn passes_repeat_identically() {
        let x = Array::from_shape_fn((3, 1), |(i, _)| i as f32);
        let y = Targets::Scalars(array![0.5, 1.5, 2.5]);
        let loader = InMemoryLoader::new(x, y, NonZeroUsize::new(2).unwrap()).unwrap();

        let first: Vec<_> = loader.batches().map(|b| b.x.to_owned()).collect();
        let second: Vec<_> = loader.batches().map(|b| b.x.to_owned()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn mismatched_targets_are_rejected() {
        let x = Array2::zeros((3, 2));
        let y = Targets::Vectors(Array2::zeros((2, 2)));

        assert!(matches!(
            InMemoryLoader::new(x, y, NonZeroUsize::MIN),
            Err(EnsembleErr::SizeMismatch { got: 2, expected: 3, .. })
        ));
    }
}
