//! I/O error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Container I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Container does not exist or cannot be opened.
    #[error("container not found: {}", .0.display())]
    ContainerNotFound(PathBuf),

    /// A required dataset is absent from a container.
    #[error("missing dataset {path} in {}", container.display())]
    MissingDataset { container: PathBuf, path: String },

    /// Dataset contents violate the expected layout.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] modex_core::Error),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Core(modex_core::Error::config(message))
    }

    /// Returns true for configuration errors.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Core(modex_core::Error::Config(_) | modex_core::Error::InvalidPulseDefinition { .. })
        )
    }
}
