//! HDF5/NeXus container store.

use crate::store::{ContainerStore, DatasetReader};
use crate::{Error, Result};
use hdf5::types::{
    FixedAscii, FixedUnicode, FloatSize, H5Type, IntSize, TypeDescriptor, VarLenAscii,
    VarLenUnicode,
};
use hdf5::{Container, Dataset, File, Group, Location};
use log::{debug, warn};
use ndarray::ArrayView1;
use std::path::{Path, PathBuf};

/// Longest fixed-length string read from a container.
const MAX_FIXED_STRING: usize = 1024;

/// Container store backed by HDF5 files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct Hdf5Store;

impl Hdf5Store {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// An HDF5 file opened read-only.
pub struct Hdf5Container {
    path: PathBuf,
    file: File,
}

impl Hdf5Container {
    fn dataset(&self, name: &str) -> Result<Dataset> {
        self.file.dataset(name).map_err(|_| Error::MissingDataset {
            container: self.path.clone(),
            path: name.to_string(),
        })
    }
}

impl DatasetReader for Hdf5Container {
    fn path(&self) -> &Path {
        &self.path
    }

    fn contains(&self, dataset: &str) -> bool {
        self.file.dataset(dataset).is_ok()
    }

    fn read_string(&self, dataset: &str) -> Result<String> {
        read_strings(&self.dataset(dataset)?)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "dataset {dataset} in {} is empty",
                    self.path.display()
                ))
            })
    }

    fn read_i32(&self, dataset: &str) -> Result<Vec<i32>> {
        Ok(self.dataset(dataset)?.read_raw::<i32>()?)
    }

    fn read_f64(&self, dataset: &str) -> Result<Vec<f64>> {
        Ok(self.dataset(dataset)?.read_raw::<f64>()?)
    }
}

impl ContainerStore for Hdf5Store {
    type Handle = Hdf5Container;

    fn open(&self, path: &Path) -> Result<Hdf5Container> {
        if !path.is_file() {
            return Err(Error::ContainerNotFound(path.to_path_buf()));
        }
        Ok(Hdf5Container {
            path: path.to_path_buf(),
            file: File::open(path)?,
        })
    }

    fn template_to(&self, source: &Path, dest: &Path, datasets: &[String]) -> Result<()> {
        let source = self.open(source)?;
        let sources = datasets
            .iter()
            .map(|name| Ok((name, source.dataset(name)?)))
            .collect::<Result<Vec<_>>>()?;

        let file = File::create(dest)?;
        copy_attributes(&source.file, &file)?;
        for (name, dataset) in sources {
            let (parent, leaf) = split_path(name);
            let group = template_group(&source.file, &file, parent)?;
            copy_dataset(&dataset, &group, leaf)?;
        }
        debug!(
            "Templated {} datasets from {} into {}",
            datasets.len(),
            source.path.display(),
            dest.display()
        );
        Ok(())
    }

    fn write_i32(&self, container: &Path, dataset: &str, data: &[i32]) -> Result<()> {
        if !container.is_file() {
            return Err(Error::ContainerNotFound(container.to_path_buf()));
        }
        let file = File::open_rw(container)?;
        let target = file.dataset(dataset).map_err(|_| Error::MissingDataset {
            container: container.to_path_buf(),
            path: dataset.to_string(),
        })?;
        if target.size() != data.len() {
            return Err(Error::InvalidFormat(format!(
                "dataset {dataset} in {} holds {} values, cannot write {}",
                container.display(),
                target.size(),
                data.len()
            )));
        }
        target.write_raw(data)?;
        Ok(())
    }

    fn create_f64_datasets(&self, container: &Path, datasets: &[(String, Vec<f64>)]) -> Result<()> {
        let file = File::create(container)?;
        for (name, values) in datasets {
            let (parent, leaf) = split_path(name);
            let group = ensure_group(&file, parent)?;
            let dataset = group
                .new_dataset::<f64>()
                .shape((values.len(),))
                .create(leaf)?;
            dataset.write(ArrayView1::from(values.as_slice()))?;
        }
        Ok(())
    }
}

fn split_path(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

fn ensure_group(file: &File, path: &str) -> Result<Group> {
    let mut group = file.group("/")?;
    for part in path.split('/').filter(|part| !part.is_empty()) {
        group = match group.group(part) {
            Ok(existing) => existing,
            Err(_) => group.create_group(part)?,
        };
    }
    Ok(group)
}

fn read_strings(dataset: &Dataset) -> Result<Vec<String>> {
    let strings = match dataset.dtype()?.to_descriptor()? {
        TypeDescriptor::VarLenUnicode => dataset
            .read_raw::<VarLenUnicode>()?
            .iter()
            .map(|s| s.as_str().to_string())
            .collect(),
        TypeDescriptor::VarLenAscii => dataset
            .read_raw::<VarLenAscii>()?
            .iter()
            .map(|s| s.as_str().to_string())
            .collect(),
        TypeDescriptor::FixedAscii(_) => dataset
            .read_raw::<FixedAscii<MAX_FIXED_STRING>>()?
            .iter()
            .map(|s| s.as_str().to_string())
            .collect(),
        TypeDescriptor::FixedUnicode(_) => dataset
            .read_raw::<FixedUnicode<MAX_FIXED_STRING>>()?
            .iter()
            .map(|s| s.as_str().to_string())
            .collect(),
        other => {
            return Err(Error::InvalidFormat(format!(
                "dataset {} holds {other:?}, not text",
                dataset.name()
            )))
        }
    };
    Ok(strings)
}

/// Creates the groups along `path` in `dest`, giving each new group the
/// attributes of its counterpart in `source`.
fn template_group(source: &File, dest: &File, path: &str) -> Result<Group> {
    let mut group = dest.group("/")?;
    let mut current = String::new();
    for part in path.split('/').filter(|part| !part.is_empty()) {
        current.push('/');
        current.push_str(part);
        group = match group.group(part) {
            Ok(existing) => existing,
            Err(_) => {
                let created = group.create_group(part)?;
                copy_attributes(&source.group(&current)?, &created)?;
                created
            }
        };
    }
    Ok(group)
}

fn is_copyable(descriptor: &TypeDescriptor) -> bool {
    matches!(
        descriptor,
        TypeDescriptor::Integer(_)
            | TypeDescriptor::Unsigned(_)
            | TypeDescriptor::Float(FloatSize::U4 | FloatSize::U8)
            | TypeDescriptor::VarLenUnicode
            | TypeDescriptor::VarLenAscii
            | TypeDescriptor::FixedAscii(_)
            | TypeDescriptor::FixedUnicode(_)
    )
}

fn transfer_typed<T: H5Type>(source: &Container, target: &Container) -> Result<()> {
    let values = source.read_raw::<T>()?;
    target.write_raw(values.as_slice())?;
    Ok(())
}

/// Moves the values of `source` into `target`, which was created with the
/// same type. Fixed-length strings pass through a wide buffer and are
/// converted back to the target's length on write.
fn transfer(source: &Container, target: &Container, descriptor: &TypeDescriptor) -> Result<()> {
    match descriptor {
        TypeDescriptor::Integer(IntSize::U1) => transfer_typed::<i8>(source, target),
        TypeDescriptor::Integer(IntSize::U2) => transfer_typed::<i16>(source, target),
        TypeDescriptor::Integer(IntSize::U4) => transfer_typed::<i32>(source, target),
        TypeDescriptor::Integer(IntSize::U8) => transfer_typed::<i64>(source, target),
        TypeDescriptor::Unsigned(IntSize::U1) => transfer_typed::<u8>(source, target),
        TypeDescriptor::Unsigned(IntSize::U2) => transfer_typed::<u16>(source, target),
        TypeDescriptor::Unsigned(IntSize::U4) => transfer_typed::<u32>(source, target),
        TypeDescriptor::Unsigned(IntSize::U8) => transfer_typed::<u64>(source, target),
        TypeDescriptor::Float(FloatSize::U4) => transfer_typed::<f32>(source, target),
        TypeDescriptor::Float(FloatSize::U8) => transfer_typed::<f64>(source, target),
        TypeDescriptor::VarLenUnicode => transfer_typed::<VarLenUnicode>(source, target),
        TypeDescriptor::VarLenAscii => transfer_typed::<VarLenAscii>(source, target),
        TypeDescriptor::FixedAscii(_) => {
            transfer_typed::<FixedAscii<MAX_FIXED_STRING>>(source, target)
        }
        TypeDescriptor::FixedUnicode(_) => {
            transfer_typed::<FixedUnicode<MAX_FIXED_STRING>>(source, target)
        }
        other => Err(Error::InvalidFormat(format!("cannot copy values of type {other:?}"))),
    }
}

/// Copies every attribute of `source` onto `target` with its stored type
/// and shape. Attributes of types that cannot be copied are dropped.
fn copy_attributes(source: &Location, target: &Location) -> Result<()> {
    for name in source.attr_names()? {
        let attr = source.attr(&name)?;
        let descriptor = attr.dtype()?.to_descriptor()?;
        if !is_copyable(&descriptor) {
            warn!(
                "Attribute {name} of {} has type {descriptor:?} and is not copied",
                source.name()
            );
            continue;
        }
        let builder = target.new_attr_builder().empty_as(&descriptor);
        let copy = if attr.is_scalar() {
            builder.shape(()).create(name.as_str())?
        } else {
            builder.shape(attr.shape()).create(name.as_str())?
        };
        transfer(&attr, &copy, &descriptor)?;
    }
    Ok(())
}

/// Copies a dataset with its stored type, shape and attributes.
fn copy_dataset(source: &Dataset, group: &Group, name: &str) -> Result<()> {
    let descriptor = source.dtype()?.to_descriptor()?;
    if !is_copyable(&descriptor) {
        return Err(Error::InvalidFormat(format!(
            "cannot copy dataset {} of type {descriptor:?}",
            source.name()
        )));
    }
    let builder = group.new_dataset_builder().empty_as(&descriptor);
    let target = if source.is_scalar() {
        builder.shape(()).create(name)?
    } else {
        builder.shape(source.shape()).create(name)?
    };
    transfer(source, &target, &descriptor)?;
    copy_attributes(source, &target)
}
