//! modex-io: NeXus container access for modex.
//!
//! This crate provides the container store abstraction with in-memory and
//! HDF5 backends, the ISIS NeXus layout, run loading and the diagnostic log.
//!

mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod memory;
pub mod nexus;
pub mod store;
mod writer;

pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use crate::hdf5::{Hdf5Container, Hdf5Store};
pub use memory::{DatasetValue, MemoryContainer, MemoryStore};
pub use nexus::{ContainerLayout, RunFile, RunSpan};
pub use store::{ContainerStore, DatasetReader};
pub use writer::DiagnosticLog;
