//! The container ("dataset store") abstraction.
//!
//! Containers are addressed by file path and hold named datasets addressed by
//! absolute, slash separated paths such as `/raw_data_1/good_frames`.

use crate::Result;
use std::path::Path;

/// Read access to one open container.
pub trait DatasetReader {
    /// Path of the container on disk (or its key in memory).
    fn path(&self) -> &Path;

    /// Returns true if the dataset exists.
    fn contains(&self, dataset: &str) -> bool;

    /// Reads a text dataset. Multi-element datasets return their first element.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingDataset`] if the dataset is absent, or a
    /// format error if it does not hold text.
    fn read_string(&self, dataset: &str) -> Result<String>;

    /// Reads an integer dataset, flattened row-major.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingDataset`] if the dataset is absent.
    fn read_i32(&self, dataset: &str) -> Result<Vec<i32>>;

    /// Reads a floating point dataset, flattened row-major.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingDataset`] if the dataset is absent.
    fn read_f64(&self, dataset: &str) -> Result<Vec<f64>>;

    /// Reads the first element of an integer dataset.
    ///
    /// # Errors
    /// Returns an error if the dataset is absent or empty.
    fn read_i32_scalar(&self, dataset: &str) -> Result<i32> {
        self.read_i32(dataset)?.first().copied().ok_or_else(|| {
            crate::Error::InvalidFormat(format!(
                "dataset {dataset} in {} is empty",
                self.path().display()
            ))
        })
    }
}

/// A backend able to open, template and update containers.
pub trait ContainerStore {
    /// Handle to an open container.
    type Handle: DatasetReader;

    /// Opens an existing container for reading.
    ///
    /// # Errors
    /// Returns [`crate::Error::ContainerNotFound`] if it does not exist.
    fn open(&self, path: &Path) -> Result<Self::Handle>;

    /// Creates `dest` holding copies of the listed datasets from `source`.
    ///
    /// An existing `dest` is replaced.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingDataset`] if a listed dataset is absent
    /// from `source`.
    fn template_to(&self, source: &Path, dest: &Path, datasets: &[String]) -> Result<()>;

    /// Overwrites an existing integer dataset with `data` (flattened row-major).
    ///
    /// # Errors
    /// Returns an error if the dataset is absent or its size differs from `data`.
    fn write_i32(&self, container: &Path, dataset: &str, data: &[i32]) -> Result<()>;

    /// Creates a new container holding one-dimensional float datasets.
    ///
    /// # Errors
    /// Returns an error if the container cannot be created.
    fn create_f64_datasets(&self, container: &Path, datasets: &[(String, Vec<f64>)]) -> Result<()>;
}
