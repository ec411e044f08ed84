//! In-memory container store.
//!
//! Containers live in a map keyed by path. Opening a container takes a
//! snapshot, so later writes are only visible to handles opened afterwards.

use crate::store::{ContainerStore, DatasetReader};
use crate::{Error, Result};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A dataset value held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetValue {
    Int(Vec<i32>),
    Float(Vec<f64>),
    Text(String),
}

type Datasets = BTreeMap<String, DatasetValue>;

/// Container store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    containers: RefCell<BTreeMap<PathBuf, Datasets>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a dataset, creating the container if needed.
    pub fn insert(&self, container: impl AsRef<Path>, dataset: &str, value: DatasetValue) {
        self.containers
            .borrow_mut()
            .entry(container.as_ref().to_path_buf())
            .or_default()
            .insert(dataset.to_string(), value);
    }

    /// Returns a copy of a dataset, if present.
    #[must_use]
    pub fn dataset(&self, container: impl AsRef<Path>, dataset: &str) -> Option<DatasetValue> {
        self.containers
            .borrow()
            .get(container.as_ref())
            .and_then(|datasets| datasets.get(dataset).cloned())
    }

    /// Returns true if the container exists.
    #[must_use]
    pub fn exists(&self, container: impl AsRef<Path>) -> bool {
        self.containers.borrow().contains_key(container.as_ref())
    }

    /// Names of every dataset in a container, sorted.
    #[must_use]
    pub fn dataset_names(&self, container: impl AsRef<Path>) -> Vec<String> {
        self.containers
            .borrow()
            .get(container.as_ref())
            .map(|datasets| datasets.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Snapshot of one in-memory container.
#[derive(Debug, Clone)]
pub struct MemoryContainer {
    path: PathBuf,
    datasets: Datasets,
}

impl MemoryContainer {
    fn get(&self, dataset: &str) -> Result<&DatasetValue> {
        self.datasets.get(dataset).ok_or_else(|| Error::MissingDataset {
            container: self.path.clone(),
            path: dataset.to_string(),
        })
    }

    fn wrong_type(&self, dataset: &str, expected: &str) -> Error {
        Error::InvalidFormat(format!(
            "dataset {dataset} in {} does not hold {expected} data",
            self.path.display()
        ))
    }
}

impl DatasetReader for MemoryContainer {
    fn path(&self) -> &Path {
        &self.path
    }

    fn contains(&self, dataset: &str) -> bool {
        self.datasets.contains_key(dataset)
    }

    fn read_string(&self, dataset: &str) -> Result<String> {
        match self.get(dataset)? {
            DatasetValue::Text(text) => Ok(text.clone()),
            _ => Err(self.wrong_type(dataset, "text")),
        }
    }

    fn read_i32(&self, dataset: &str) -> Result<Vec<i32>> {
        match self.get(dataset)? {
            DatasetValue::Int(values) => Ok(values.clone()),
            _ => Err(self.wrong_type(dataset, "integer")),
        }
    }

    fn read_f64(&self, dataset: &str) -> Result<Vec<f64>> {
        match self.get(dataset)? {
            DatasetValue::Float(values) => Ok(values.clone()),
            DatasetValue::Int(values) => Ok(values.iter().map(|&v| f64::from(v)).collect()),
            DatasetValue::Text(_) => Err(self.wrong_type(dataset, "numeric")),
        }
    }
}

impl ContainerStore for MemoryStore {
    type Handle = MemoryContainer;

    fn open(&self, path: &Path) -> Result<MemoryContainer> {
        let containers = self.containers.borrow();
        let datasets = containers
            .get(path)
            .ok_or_else(|| Error::ContainerNotFound(path.to_path_buf()))?;
        Ok(MemoryContainer {
            path: path.to_path_buf(),
            datasets: datasets.clone(),
        })
    }

    fn template_to(&self, source: &Path, dest: &Path, datasets: &[String]) -> Result<()> {
        let source = self.open(source)?;
        let mut copied = Datasets::new();
        for name in datasets {
            copied.insert(name.clone(), source.get(name)?.clone());
        }
        self.containers
            .borrow_mut()
            .insert(dest.to_path_buf(), copied);
        Ok(())
    }

    fn write_i32(&self, container: &Path, dataset: &str, data: &[i32]) -> Result<()> {
        let mut containers = self.containers.borrow_mut();
        let datasets = containers
            .get_mut(container)
            .ok_or_else(|| Error::ContainerNotFound(container.to_path_buf()))?;
        match datasets.get_mut(dataset) {
            Some(DatasetValue::Int(values)) if values.len() == data.len() => {
                values.copy_from_slice(data);
                Ok(())
            }
            Some(DatasetValue::Int(values)) => Err(Error::InvalidFormat(format!(
                "dataset {dataset} in {} holds {} values, cannot write {}",
                container.display(),
                values.len(),
                data.len()
            ))),
            Some(_) => Err(Error::InvalidFormat(format!(
                "dataset {dataset} in {} does not hold integer data",
                container.display()
            ))),
            None => Err(Error::MissingDataset {
                container: container.to_path_buf(),
                path: dataset.to_string(),
            }),
        }
    }

    fn create_f64_datasets(&self, container: &Path, datasets: &[(String, Vec<f64>)]) -> Result<()> {
        let created = datasets
            .iter()
            .map(|(name, values)| (name.clone(), DatasetValue::Float(values.clone())))
            .collect();
        self.containers
            .borrow_mut()
            .insert(container.to_path_buf(), created);
        Ok(())
    }
}
